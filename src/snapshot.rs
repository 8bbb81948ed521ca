//! Waveform telemetry published by the producer loop.

use std::sync::Arc;

use crate::audio::algorithms;

/// Copy of one block that was just written to the sink.
/// Samples are interleaved, `channels` values per frame.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformSnapshot {
    /// Index of the block within its run, starting at 0.
    pub sequence: u64,
    pub channels: usize,
    pub sample_rate: u32,
    /// Volume the block was produced with.
    pub volume: f32,
    samples: Arc<[i16]>,
}

impl WaveformSnapshot {
    pub fn new(sequence: u64, channels: usize, sample_rate: u32, volume: f32, block: &[i16]) -> Self {
        Self {
            sequence,
            channels: channels.max(1),
            sample_rate,
            volume,
            samples: Arc::from(block),
        }
    }

    /// The interleaved samples.
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    /// Iterates over the samples of a single channel.
    pub fn channel(&self, channel: usize) -> impl Iterator<Item = i16> + '_ {
        self.samples
            .iter()
            .skip(channel)
            .step_by(self.channels)
            .copied()
    }

    pub fn rms(&self) -> f32 {
        algorithms::rms(&self.samples)
    }

    pub fn peak(&self) -> f32 {
        algorithms::peak(&self.samples)
    }

    /// Magnitude of `freq` in one channel of this block.
    pub fn magnitude_at(&self, freq: f32, channel: usize) -> f32 {
        let samples = algorithms::to_float(self.channel(channel));
        algorithms::goertzel_mag(freq, &samples, self.sample_rate)
    }
}
