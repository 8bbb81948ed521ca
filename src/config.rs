//! Run parameters for the engine and the fade-out driver.

use std::time::Duration;

use serde::Serialize;

use crate::error::EngineError;

/// Sample rate used when none is given.
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;
/// The engine always produces interleaved 16-bit stereo.
pub const CHANNELS: usize = 2;

/// Immutable parameters of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EngineConfig {
    /// Frequency of the left channel.
    pub carrier_hz: f64,
    /// Added to the carrier to get the right channel frequency.
    /// Zero gives identical channels (pure tone).
    pub beat_hz: f64,
    pub sample_rate: u32,
}

impl EngineConfig {
    pub fn new(carrier_hz: f64, beat_hz: f64) -> Self {
        Self {
            carrier_hz,
            beat_hz,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Frequency of the right channel.
    pub fn right_hz(&self) -> f64 {
        self.carrier_hz + self.beat_hz
    }

    pub fn is_binaural(&self) -> bool {
        self.beat_hz > 0.0
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.carrier_hz.is_finite() || self.carrier_hz <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "carrier frequency must be positive, got {}",
                self.carrier_hz
            )));
        }

        if !self.beat_hz.is_finite() || self.beat_hz < 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "beat frequency must not be negative, got {}",
                self.beat_hz
            )));
        }

        if self.sample_rate == 0 {
            return Err(EngineError::InvalidConfig(
                "sample rate must be greater than zero".to_owned(),
            ));
        }

        // Anything at or above nyquist aliases back down into a different tone
        let nyquist = self.sample_rate as f64 / 2.0;
        if self.right_hz() >= nyquist {
            return Err(EngineError::InvalidConfig(format!(
                "right channel frequency {} Hz is not below nyquist ({nyquist} Hz)",
                self.right_hz()
            )));
        }

        Ok(())
    }
}

/// Timing of the linear fade-out ramp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadeConfig {
    /// Total length of the ramp.
    pub duration: Duration,
    /// How often the volume is updated during the ramp.
    pub interval: Duration,
}

impl FadeConfig {
    pub fn new(duration: Duration, interval: Duration) -> Self {
        Self { duration, interval }
    }
}

impl Default for FadeConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_millis(5000),
            interval: Duration::from_millis(50),
        }
    }
}

#[cfg(test)]
mod test {
    use super::EngineConfig;
    use crate::error::EngineError;

    #[test]
    fn test_right_channel_frequency() {
        let config = EngineConfig::new(150.0, 10.0);
        assert_eq!(config.right_hz(), 160.0);
        assert!(config.is_binaural());
        assert!(!EngineConfig::new(528.0, 0.0).is_binaural());
    }

    #[test]
    fn test_validate() {
        assert!(EngineConfig::new(100.0, 10.0).validate().is_ok());
        assert!(EngineConfig::new(528.0, 0.0).validate().is_ok());

        for bad in [
            EngineConfig::new(0.0, 10.0),
            EngineConfig::new(-5.0, 0.0),
            EngineConfig::new(f64::NAN, 0.0),
            EngineConfig::new(100.0, -1.0),
            EngineConfig::new(100.0, f64::INFINITY),
            EngineConfig::new(100.0, 0.0).with_sample_rate(0),
            EngineConfig::new(22000.0, 100.0),
        ] {
            assert!(matches!(
                bad.validate(),
                Err(EngineError::InvalidConfig(_))
            ));
        }
    }
}
