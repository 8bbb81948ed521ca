//! Built-in frequency presets and timer choices.

use std::{fmt, time::Duration};

use serde::Serialize;

use crate::config::EngineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    /// Two slightly different tones, one per ear.
    Binaural,
    /// A single pure tone in both ears.
    Solfeggio,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub id: &'static str,
    pub name: &'static str,
    pub category: Category,
    pub carrier_hz: f64,
    pub beat_hz: f64,
    pub description: &'static str,
}

/// A sleep timer option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimerOption {
    pub label: &'static str,
    /// `None` plays until stopped.
    pub minutes: Option<u64>,
}

pub const PRESETS: &[Preset] = &[
    Preset {
        id: "delta",
        name: "Delta (1-4 Hz)",
        category: Category::Binaural,
        carrier_hz: 100.0,
        beat_hz: 2.0,
        description: "Deep dreamless sleep and recovery.",
    },
    Preset {
        id: "theta",
        name: "Theta (4-8 Hz)",
        category: Category::Binaural,
        carrier_hz: 120.0,
        beat_hz: 6.0,
        description: "Deep meditation, creativity and REM sleep.",
    },
    Preset {
        id: "alpha",
        name: "Alpha (8-13 Hz)",
        category: Category::Binaural,
        carrier_hz: 150.0,
        beat_hz: 10.0,
        description: "Calm, relaxed awareness. Good for lowering stress and learning.",
    },
    Preset {
        id: "beta",
        name: "Beta (13-30 Hz)",
        category: Category::Binaural,
        carrier_hz: 180.0,
        beat_hz: 20.0,
        description: "Alertness, focus and logical thinking. Useful for work or study.",
    },
    Preset {
        id: "gamma",
        name: "Gamma (30-100 Hz)",
        category: Category::Binaural,
        carrier_hz: 200.0,
        beat_hz: 40.0,
        description: "High level cognitive processing, memory and perception.",
    },
    Preset {
        id: "174",
        name: "174 Hz",
        category: Category::Solfeggio,
        carrier_hz: 174.0,
        beat_hz: 0.0,
        description: "Said to ease physical pain and give a sense of safety.",
    },
    Preset {
        id: "285",
        name: "285 Hz",
        category: Category::Solfeggio,
        carrier_hz: 285.0,
        beat_hz: 0.0,
        description: "Associated with healing of tissue and energy fields.",
    },
    Preset {
        id: "396",
        name: "396 Hz",
        category: Category::Solfeggio,
        carrier_hz: 396.0,
        beat_hz: 0.0,
        description: "Associated with letting go of fear and guilt.",
    },
    Preset {
        id: "417",
        name: "417 Hz",
        category: Category::Solfeggio,
        carrier_hz: 417.0,
        beat_hz: 0.0,
        description: "Associated with change and clearing past experiences.",
    },
    Preset {
        id: "528",
        name: "528 Hz",
        category: Category::Solfeggio,
        carrier_hz: 528.0,
        beat_hz: 0.0,
        description: "The so called love frequency, linked to clarity and inner peace.",
    },
    Preset {
        id: "639",
        name: "639 Hz",
        category: Category::Solfeggio,
        carrier_hz: 639.0,
        beat_hz: 0.0,
        description: "Associated with connection, relationships and communication.",
    },
];

pub const TIMER_OPTIONS: &[TimerOption] = &[
    TimerOption {
        label: "No limit",
        minutes: None,
    },
    TimerOption {
        label: "5 minutes",
        minutes: Some(5),
    },
    TimerOption {
        label: "10 minutes",
        minutes: Some(10),
    },
    TimerOption {
        label: "30 minutes",
        minutes: Some(30),
    },
    TimerOption {
        label: "1 hour",
        minutes: Some(60),
    },
];

impl Preset {
    pub fn config(&self) -> EngineConfig {
        EngineConfig::new(self.carrier_hz, self.beat_hz)
    }
}

impl TimerOption {
    pub fn duration(&self) -> Option<Duration> {
        self.minutes.map(|x| Duration::from_secs(x * 60))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Category::Binaural => "Binaural",
            Category::Solfeggio => "Solfeggio",
        })
    }
}

/// Finds a preset by id or display name, ignoring case.
pub fn find(name: &str) -> Option<&'static Preset> {
    let name = name.trim();
    PRESETS
        .iter()
        .find(|x| x.id.eq_ignore_ascii_case(name) || x.name.eq_ignore_ascii_case(name))
}

pub fn by_category(category: Category) -> impl Iterator<Item = &'static Preset> {
    PRESETS.iter().filter(move |x| x.category == category)
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::{by_category, find, Category, PRESETS, TIMER_OPTIONS};

    #[test]
    fn test_find() {
        assert_eq!(find("alpha").unwrap().carrier_hz, 150.0);
        assert_eq!(find(" ALPHA ").unwrap().beat_hz, 10.0);
        assert_eq!(find("528 Hz").unwrap().id, "528");
        assert!(find("epsilon").is_none());
    }

    #[test]
    fn test_every_preset_is_playable() {
        for preset in PRESETS {
            assert!(preset.config().validate().is_ok(), "{}", preset.id);
        }
    }

    #[test]
    fn test_solfeggio_are_pure_tones() {
        assert_eq!(by_category(Category::Solfeggio).count(), 6);
        assert!(by_category(Category::Solfeggio).all(|x| !x.config().is_binaural()));
        assert!(by_category(Category::Binaural).all(|x| x.config().is_binaural()));
    }

    #[test]
    fn test_timer_options() {
        assert_eq!(TIMER_OPTIONS[0].duration(), None);
        assert_eq!(
            TIMER_OPTIONS.last().unwrap().duration(),
            Some(Duration::from_secs(3600))
        );
    }

    #[test]
    fn test_serializes_to_json() {
        let json = serde_json::to_value(find("gamma").unwrap()).unwrap();
        assert_eq!(json["carrierHz"], 200.0);
        assert_eq!(json["category"], "binaural");
    }
}
