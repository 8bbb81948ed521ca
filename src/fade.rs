//! Linear fade-out driver.
//! Ramps every channel from the volume it had when the fade started down to
//! zero, then calls a completion callback (usually a stop).

use std::{io, sync::Arc, time::Duration};

use log::debug;

use crate::{config::FadeConfig, timer::Countdown, volume::VolumeControl};

/// Fraction of the starting volume left with `remaining` of a `total` long fade.
pub fn fade_multiplier(remaining: Duration, total: Duration) -> f32 {
    if total.is_zero() {
        return 0.0;
    }

    (remaining.as_secs_f64() / total.as_secs_f64()).clamp(0.0, 1.0) as f32
}

/// A fade in progress. Dropping or cancelling it leaves the volumes where they are.
pub struct FadeOut {
    countdown: Countdown,
}

impl FadeOut {
    pub fn start<F>(
        config: FadeConfig,
        channels: Vec<Arc<dyn VolumeControl>>,
        on_complete: F,
    ) -> io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let channels = Arc::new(
            channels
                .into_iter()
                .map(|x| {
                    let initial = x.volume();
                    (x, initial)
                })
                .collect::<Vec<_>>(),
        );
        debug!("fading out {} channels over {:?}", channels.len(), config.duration);

        let ticking = channels.clone();
        let total = config.duration;
        let countdown = Countdown::start(
            config.duration,
            config.interval,
            move |remaining| {
                let multiplier = fade_multiplier(remaining, total);
                for (channel, initial) in ticking.iter() {
                    channel.set_volume(initial * multiplier);
                }
            },
            move || {
                for (channel, _) in channels.iter() {
                    channel.set_volume(0.0);
                }
                on_complete();
            },
        )?;

        Ok(Self { countdown })
    }

    pub fn is_finished(&self) -> bool {
        self.countdown.is_finished()
    }

    pub fn cancel(self) {
        self.countdown.cancel();
    }
}

#[cfg(test)]
mod test {
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        thread,
        time::Duration,
    };

    use crossbeam::channel;

    use super::{fade_multiplier, FadeOut};
    use crate::{
        audio::sink::MemorySinkFactory,
        config::{EngineConfig, FadeConfig},
        engine::{EngineStatus, SignalEngine},
        volume::{AtomicVolume, VolumeControl},
    };

    #[test]
    fn test_multiplier_is_linear() {
        let total = Duration::from_millis(5000);
        assert_eq!(fade_multiplier(Duration::from_millis(5000), total), 1.0);
        assert_eq!(fade_multiplier(Duration::from_millis(2500), total), 0.5);
        assert_eq!(fade_multiplier(Duration::ZERO, total), 0.0);
        assert!((fade_multiplier(Duration::from_millis(50), total) - 0.01).abs() < 1e-6);
        assert_eq!(fade_multiplier(Duration::from_secs(9), total), 1.0);
        assert_eq!(fade_multiplier(Duration::from_secs(1), Duration::ZERO), 0.0);
    }

    #[test]
    fn test_fade_ramps_all_channels() {
        let tone = Arc::new(AtomicVolume::new(1.0));
        let ambient = Arc::new(AtomicVolume::new(0.5));
        let (done_tx, done_rx) = channel::bounded(1);

        let fade = FadeOut::start(
            FadeConfig::new(Duration::from_millis(400), Duration::from_millis(10)),
            vec![tone.clone() as Arc<dyn VolumeControl>, ambient.clone()],
            move || done_tx.send(()).unwrap(),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(200));
        let (mid_tone, mid_ambient) = (tone.volume(), ambient.volume());
        assert!((mid_tone - 0.5).abs() < 0.2, "{mid_tone}");
        assert!((mid_ambient - 0.25).abs() < 0.1, "{mid_ambient}");
        // Both channels follow the same ramp
        assert!((mid_ambient / mid_tone - 0.5).abs() < 0.1);

        done_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(tone.volume(), 0.0);
        assert_eq!(ambient.volume(), 0.0);
        thread::sleep(Duration::from_millis(10));
        assert!(fade.is_finished());
    }

    #[test]
    fn test_cancelled_fade_leaves_volume() {
        let tone = Arc::new(AtomicVolume::new(1.0));
        let completed = Arc::new(AtomicBool::new(false));

        let completed_ref = completed.clone();
        let fade = FadeOut::start(
            FadeConfig::new(Duration::from_millis(300), Duration::from_millis(10)),
            vec![tone.clone() as Arc<dyn VolumeControl>],
            move || completed_ref.store(true, Ordering::SeqCst),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(100));
        fade.cancel();
        let left = tone.volume();

        thread::sleep(Duration::from_millis(300));
        assert!(!completed.load(Ordering::SeqCst));
        assert_eq!(tone.volume(), left);
        assert!(left > 0.0 && left < 1.0);
    }

    #[test]
    fn test_fade_stops_engine() {
        let factory = MemorySinkFactory::new(64).realtime();
        let engine = Arc::new(SignalEngine::new(factory.clone()));
        engine.start(EngineConfig::new(100.0, 10.0), 1.0).unwrap();

        let (done_tx, done_rx) = channel::bounded(1);
        let stopping = engine.clone();
        let _fade = FadeOut::start(
            FadeConfig::new(Duration::from_millis(200), Duration::from_millis(10)),
            vec![engine.clone() as Arc<dyn VolumeControl>],
            move || {
                stopping.stop();
                done_tx.send(()).unwrap();
            },
        )
        .unwrap();

        thread::sleep(Duration::from_millis(100));
        let mid = engine.volume().unwrap();
        assert!(mid < 0.9 && mid > 0.1, "{mid}");

        done_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(engine.status(), EngineStatus::Idle);
        assert_eq!(factory.open_sinks(), 0);
    }
}
