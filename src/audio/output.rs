//! [`AudioSink`] backed by a cpal output stream.
//!
//! cpal pulls audio from a callback, while the producer loop pushes blocks.
//! The two are joined by a small bounded channel of blocks: `write` blocks
//! while the channel is full, which paces the producer at the rate the device
//! drains its buffer.

use std::{sync::Arc, time::Duration};

use cpal::{
    traits::{DeviceTrait, StreamTrait},
    FromSample, Sample, SampleFormat, SizedSample, Stream,
};
use crossbeam::channel::{self, Receiver, SendTimeoutError, Sender};
use log::{debug, warn};
use parking_lot::Mutex;

use super::{
    devices::{self, OutputTarget},
    sink::{AudioSink, SinkFactory},
};
use crate::{
    config::{EngineConfig, CHANNELS},
    error::SinkError,
};

/// Blocks that can be queued in front of the device.
const QUEUED_BLOCKS: usize = 2;
/// Lower bound for how long a write may wait before the device is considered stuck.
const MIN_WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// Opens [`CpalSink`]s on a device picked by name.
#[derive(Debug, Clone)]
pub struct CpalSinkFactory {
    device: String,
}

pub struct CpalSink {
    device: String,
    sample_rate: u32,
    block_frames: usize,
    write_timeout: Duration,
    stream: Stream,
    tx: Sender<Vec<i16>>,
    error: Arc<Mutex<Option<String>>>,
}

/// Audio callback state: the block currently being played and where we are in it.
struct Feeder {
    rx: Receiver<Vec<i16>>,
    block: Vec<i16>,
    pos: usize,
}

impl CpalSinkFactory {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }
}

impl Default for CpalSinkFactory {
    fn default() -> Self {
        Self::new(devices::DEFAULT_DEVICE)
    }
}

impl SinkFactory for CpalSinkFactory {
    fn open(&self, config: &EngineConfig) -> Result<Box<dyn AudioSink>, SinkError> {
        Ok(Box::new(CpalSink::open(&self.device, config.sample_rate)?))
    }
}

impl CpalSink {
    pub fn open(device: &str, sample_rate: u32) -> Result<Self, SinkError> {
        let target = devices::output_target(device, sample_rate)?;
        let (stream, tx, error) = start_stream(&target)?;
        debug!("opened output stream on `{}`", target.name);

        Ok(Self {
            device: device.to_owned(),
            sample_rate,
            block_frames: target.block_frames,
            write_timeout: write_timeout(target.block_frames, sample_rate),
            stream,
            tx,
            error,
        })
    }
}

impl AudioSink for CpalSink {
    fn block_frames(&self) -> usize {
        self.block_frames
    }

    fn write(&mut self, block: &[i16]) -> Result<(), SinkError> {
        if let Some(err) = self.error.lock().take() {
            return Err(SinkError::Transient(err));
        }

        match self.tx.send_timeout(block.to_vec(), self.write_timeout) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(SinkError::Transient(
                "device stopped consuming audio".to_owned(),
            )),
            Err(SendTimeoutError::Disconnected(_)) => Err(SinkError::Transient(
                "audio callback went away".to_owned(),
            )),
        }
    }

    fn reopen(&mut self) -> Result<(), SinkError> {
        let _ = self.stream.pause();
        let target = devices::output_target(&self.device, self.sample_rate)?;
        let (stream, tx, error) = start_stream(&target)?;
        warn!("reopened output stream on `{}`", target.name);

        self.stream = stream;
        self.tx = tx;
        self.error = error;
        self.block_frames = target.block_frames;
        self.write_timeout = write_timeout(target.block_frames, self.sample_rate);
        Ok(())
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        let _ = self.stream.pause();
        debug!("released output stream on `{}`", self.device);
    }
}

/// How long a write may wait for room before the device counts as stuck:
/// a few times what the queued blocks take to play.
fn write_timeout(block_frames: usize, sample_rate: u32) -> Duration {
    let block_time = Duration::from_secs_f64(block_frames as f64 / sample_rate.max(1) as f64);
    MIN_WRITE_TIMEOUT.max(block_time * 4 * QUEUED_BLOCKS as u32)
}

type Started = (Stream, Sender<Vec<i16>>, Arc<Mutex<Option<String>>>);

fn start_stream(target: &OutputTarget) -> Result<Started, SinkError> {
    let (tx, rx) = channel::bounded(QUEUED_BLOCKS);
    let error = Arc::new(Mutex::new(None));

    let stream = match target.sample_format {
        SampleFormat::I16 => build_stream::<i16>(target, rx, error.clone()),
        SampleFormat::U16 => build_stream::<u16>(target, rx, error.clone()),
        SampleFormat::F32 => build_stream::<f32>(target, rx, error.clone()),
        other => Err(SinkError::Unavailable(format!(
            "unsupported sample format {other:?}"
        ))),
    }?;

    stream
        .play()
        .map_err(|e| SinkError::Unavailable(format!("failed to start output stream: {e}")))?;
    Ok((stream, tx, error))
}

fn build_stream<T>(
    target: &OutputTarget,
    rx: Receiver<Vec<i16>>,
    error: Arc<Mutex<Option<String>>>,
) -> Result<Stream, SinkError>
where
    T: SizedSample + FromSample<i16> + Send + 'static,
{
    let channels = target.config.channels as usize;
    let mut feeder = Feeder::new(rx);

    target
        .device
        .build_output_stream(
            &target.config,
            move |data: &mut [T], _info: &cpal::OutputCallbackInfo| feeder.fill(data, channels),
            move |err| {
                warn!("Output stream error: {err}");
                *error.lock() = Some(err.to_string());
            },
            None,
        )
        .map_err(|e| SinkError::Unavailable(format!("failed to build output stream: {e}")))
}

impl Feeder {
    fn new(rx: Receiver<Vec<i16>>) -> Self {
        Self {
            rx,
            block: Vec::new(),
            pos: 0,
        }
    }

    /// Next stereo frame, or `None` on underrun.
    fn next_frame(&mut self) -> Option<[i16; CHANNELS]> {
        while self.pos + CHANNELS > self.block.len() {
            self.block = self.rx.try_recv().ok()?;
            self.pos = 0;
        }

        let frame = [self.block[self.pos], self.block[self.pos + 1]];
        self.pos += CHANNELS;
        Some(frame)
    }

    /// Maps stereo frames onto the device layout.
    /// Mono devices get the average of both channels, channels past the second get silence.
    fn fill<T: Sample + FromSample<i16>>(&mut self, data: &mut [T], channels: usize) {
        for frame in data.chunks_mut(channels.max(1)) {
            let [left, right] = self.next_frame().unwrap_or([0, 0]);

            if frame.len() == 1 {
                let mono = ((left as i32 + right as i32) / 2) as i16;
                frame[0] = T::from_sample(mono);
                continue;
            }

            for (i, e) in frame.iter_mut().enumerate() {
                *e = match i {
                    0 => T::from_sample(left),
                    1 => T::from_sample(right),
                    _ => T::EQUILIBRIUM,
                };
            }
        }
    }
}

#[cfg(test)]
mod test {
    use crossbeam::channel;

    use std::time::Duration;

    use super::{write_timeout, Feeder, MIN_WRITE_TIMEOUT};

    #[test]
    fn test_feeder_plays_blocks_in_order() {
        let (tx, rx) = channel::bounded(4);
        let mut feeder = Feeder::new(rx);
        tx.send(vec![1, 2, 3, 4]).unwrap();
        tx.send(vec![5, 6]).unwrap();

        let mut out = [0_i16; 8];
        feeder.fill(&mut out, 2);
        // Last frame underruns into silence
        assert_eq!(out, [1, 2, 3, 4, 5, 6, 0, 0]);
    }

    #[test]
    fn test_feeder_maps_channel_layouts() {
        let (tx, rx) = channel::bounded(4);
        let mut feeder = Feeder::new(rx);
        tx.send(vec![100, 300, 10, 20]).unwrap();

        let mut mono = [0_i16; 1];
        feeder.fill(&mut mono, 1);
        assert_eq!(mono, [200]);

        let mut quad = [9_i16; 4];
        feeder.fill(&mut quad, 4);
        assert_eq!(quad, [10, 20, 0, 0]);
    }

    #[test]
    fn test_feeder_converts_to_float() {
        let (tx, rx) = channel::bounded(1);
        let mut feeder = Feeder::new(rx);
        tx.send(vec![i16::MAX, 0]).unwrap();

        let mut out = [1.0_f32; 2];
        feeder.fill(&mut out, 2);
        assert!((out[0] - 1.0).abs() < 1e-3);
        assert_eq!(out[1], 0.0);
    }

    #[test]
    fn test_write_timeout_follows_block_size() {
        assert_eq!(write_timeout(256, 44100), MIN_WRITE_TIMEOUT);

        // 4096 frames at 8 kHz is about half a second per block
        let long = write_timeout(4096, 8000);
        assert!(long > MIN_WRITE_TIMEOUT);
        assert!(long >= Duration::from_secs(4));
        assert!(write_timeout(4096, 8000) > write_timeout(1024, 8000));
    }
}
