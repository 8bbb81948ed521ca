use std::f64::consts::TAU;

use crate::config::{EngineConfig, CHANNELS};

/// Largest magnitude a sample is allowed to reach.
/// Symmetric so that `sin = -1` never lands on `i16::MIN`.
pub const FULL_SCALE: f64 = i16::MAX as f64;

/// A sine oscillator driven by a phase accumulator.
/// The phase is kept in `[0, 2π)` so it never loses precision on long runs.
#[derive(Clone, Copy, Debug)]
pub struct Oscillator {
    phase: f64,
    increment: f64,
    sample_rate: f64,
}

/// Two independent oscillators, one per ear.
/// Left plays the carrier, right plays carrier + beat.
#[derive(Clone, Copy, Debug)]
pub struct DualTone {
    left: Oscillator,
    right: Oscillator,
}

impl Oscillator {
    pub fn new(freq: f64, sample_rate: u32) -> Self {
        let sample_rate = sample_rate as f64;
        Self {
            phase: 0.0,
            increment: TAU * freq / sample_rate,
            sample_rate,
        }
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Phase advance per sample in radians.
    pub fn increment(&self) -> f64 {
        self.increment
    }

    pub fn frequency(&self) -> f64 {
        self.increment * self.sample_rate / TAU
    }

    fn advance(&mut self) {
        self.phase += self.increment;
        if self.phase >= TAU {
            self.phase -= TAU;
        }
    }
}

impl Iterator for Oscillator {
    type Item = f64;

    fn next(&mut self) -> Option<Self::Item> {
        let out = self.phase.sin();
        self.advance();
        Some(out)
    }
}

impl DualTone {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            left: Oscillator::new(config.carrier_hz, config.sample_rate),
            right: Oscillator::new(config.right_hz(), config.sample_rate),
        }
    }

    pub fn left(&self) -> &Oscillator {
        &self.left
    }

    pub fn right(&self) -> &Oscillator {
        &self.right
    }

    /// Produces one stereo frame and advances both phases by one sample.
    pub fn next_frame(&mut self, volume: f32) -> [i16; CHANNELS] {
        let left = self.left.next().unwrap_or_default();
        let right = self.right.next().unwrap_or_default();
        [to_sample(left, volume), to_sample(right, volume)]
    }

    /// Fills an interleaved stereo block.
    /// `volume` is applied to every frame of the block.
    pub fn fill(&mut self, block: &mut [i16], volume: f32) {
        debug_assert!(block.len() % CHANNELS == 0);
        for frame in block.chunks_exact_mut(CHANNELS) {
            frame.copy_from_slice(&self.next_frame(volume));
        }
    }
}

/// Scales a raw sine value by `volume` and converts it to a 16-bit sample.
pub fn to_sample(value: f64, volume: f32) -> i16 {
    (value * volume as f64 * FULL_SCALE)
        .round()
        .clamp(-FULL_SCALE, FULL_SCALE) as i16
}

#[cfg(test)]
mod test {
    use std::f64::consts::{PI, TAU};

    use super::{to_sample, DualTone, Oscillator};
    use crate::config::EngineConfig;

    /// Smallest angle between two phases.
    fn angle_between(a: f64, b: f64) -> f64 {
        ((a - b + PI).rem_euclid(TAU) - PI).abs()
    }

    #[test]
    fn test_full_scale_mapping() {
        assert_eq!(to_sample(1.0, 1.0), 32767);
        assert_eq!(to_sample(-1.0, 1.0), -32767);
        assert_eq!(to_sample(0.0, 1.0), 0);
        assert_eq!(to_sample(1.0, 0.0), 0);
        assert_eq!(to_sample(1.0, 0.5), 16384);
    }

    #[test]
    fn test_oscillator_starts_at_zero() {
        let mut osc = Oscillator::new(441.0, 44100);
        assert_eq!(osc.next(), Some(0.0));

        // 441 Hz at 44.1 kHz is exactly 100 samples per cycle
        let quarter = osc.nth(24).unwrap();
        assert!((quarter - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_phase_stays_wrapped() {
        let mut osc = Oscillator::new(997.0, 44100);
        for _ in 0..1_000_000 {
            osc.next();
            assert!((0.0..TAU).contains(&osc.phase()));
        }
    }

    #[test]
    fn test_channel_frequencies_hold_over_long_runs() {
        let config = EngineConfig::new(100.0, 10.0);
        let mut tone = DualTone::new(&config);
        let left_step = TAU * config.carrier_hz / config.sample_rate as f64;
        let right_step = TAU * config.right_hz() / config.sample_rate as f64;

        assert!((tone.left().frequency() - 100.0).abs() < 1e-9);
        assert!((tone.right().frequency() - 110.0).abs() < 1e-9);

        let mut block = vec![0_i16; 2];
        for _ in 0..1000 {
            for _ in 0..256 {
                let (l0, r0) = (tone.left().phase(), tone.right().phase());
                tone.fill(&mut block, 1.0);
                let (l1, r1) = (tone.left().phase(), tone.right().phase());

                assert!(angle_between(l1 - l0, left_step) < 1e-9);
                assert!(angle_between(r1 - r0, right_step) < 1e-9);
            }
        }
    }

    #[test]
    fn test_pure_tone_channels_match() {
        let mut tone = DualTone::new(&EngineConfig::new(528.0, 0.0));
        let mut block = vec![0_i16; 1024];
        tone.fill(&mut block, 0.8);

        for frame in block.chunks_exact(2) {
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn test_samples_never_exceed_range() {
        let mut tone = DualTone::new(&EngineConfig::new(11025.0, 0.0));
        let mut block = vec![0_i16; 4096];

        for volume in [0.0, 0.25, 1.0] {
            tone.fill(&mut block, volume);
            assert!(block.iter().all(|&x| x >= -32767));
        }

        // 11025 Hz hits the sine peaks exactly
        assert!(block.contains(&32767));
        assert!(block.contains(&-32767));
    }

    #[test]
    fn test_amplitude_scales_with_volume() {
        let config = EngineConfig::new(200.0, 20.0);
        let mut last_peak = -1;

        for volume in [0.0, 0.1, 0.3, 0.5, 0.9, 1.0] {
            let mut tone = DualTone::new(&config);
            let mut block = vec![0_i16; 8192];
            tone.fill(&mut block, volume);

            let peak = block.iter().map(|x| x.unsigned_abs() as i32).max().unwrap();
            assert!(peak > last_peak || (volume == 0.0 && peak == 0));
            last_peak = peak;
        }
    }
}
