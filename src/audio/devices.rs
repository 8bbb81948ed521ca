//! Output device lookup and stream configuration.

use cpal::{
    traits::{DeviceTrait, HostTrait},
    Device, SampleFormat, StreamConfig, SupportedBufferSize, SupportedStreamConfig,
};
use log::debug;

use crate::{config::CHANNELS, error::SinkError, misc::Similarity};

/// Smallest block the producer will write, in frames.
/// Some hosts report tiny minimums that would make the loop spin.
pub const MIN_BLOCK_FRAMES: u32 = 256;
pub const MAX_BLOCK_FRAMES: u32 = 4096;
/// Used when the device does not report its buffer size range.
pub const DEFAULT_BLOCK_FRAMES: u32 = 1024;

/// Name that selects the host's default output device.
pub const DEFAULT_DEVICE: &str = "default";

/// A device together with the stream config the sink will open on it.
pub struct OutputTarget {
    pub device: Device,
    pub name: String,
    pub config: StreamConfig,
    pub sample_format: SampleFormat,
    pub block_frames: usize,
}

/// Lists the names of all output devices on the default host.
pub fn output_device_names() -> Result<Vec<String>, SinkError> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| SinkError::Unavailable(format!("failed to enumerate devices: {e}")))?;

    Ok(devices.filter_map(|x| x.name().ok()).collect())
}

/// Picks an output device.
/// `"default"` gives the host default, anything else picks the device with the
/// highest string similarity (dice coefficient) to the given name.
pub fn output_device(wanted: &str) -> Result<Device, SinkError> {
    let host = cpal::default_host();
    let wanted = wanted.to_lowercase();

    if wanted == DEFAULT_DEVICE {
        return host
            .default_output_device()
            .ok_or_else(|| SinkError::Unavailable("no default output device".to_owned()));
    }

    host.output_devices()
        .map_err(|e| SinkError::Unavailable(format!("failed to enumerate devices: {e}")))?
        .filter_map(|x| {
            let name = x.name().ok()?.to_lowercase();
            Some((name.similarity(&wanted), x))
        })
        .reduce(|a, b| if a.0 >= b.0 { a } else { b })
        .map(|x| x.1)
        .ok_or_else(|| SinkError::Unavailable(format!("no output device matching `{wanted}`")))
}

/// Resolves the device and finds a stream config running at `sample_rate`.
/// Stereo is preferred, but any channel count is accepted and mapped by the sink.
pub fn output_target(wanted: &str, sample_rate: u32) -> Result<OutputTarget, SinkError> {
    let device = output_device(wanted)?;
    let name = device.name().unwrap_or_else(|_| wanted.to_owned());

    let supported = device
        .supported_output_configs()
        .map_err(|e| SinkError::Unavailable(format!("failed to query configs of `{name}`: {e}")))?
        .filter(|x| {
            (x.min_sample_rate().0..=x.max_sample_rate().0).contains(&sample_rate)
                && is_usable_format(x.sample_format())
        })
        // Exact stereo first, then the one closest to it
        .min_by_key(|x| (x.channels() as i32 - CHANNELS as i32).abs())
        .map(|x| x.with_sample_rate(cpal::SampleRate(sample_rate)))
        .ok_or_else(|| {
            SinkError::Unavailable(format!("`{name}` cannot play at {sample_rate} Hz"))
        })?;

    let block_frames = block_frames(&supported);
    debug!(
        "output `{name}`: {} ch, {:?}, {block_frames} frames per block",
        supported.channels(),
        supported.sample_format()
    );

    Ok(OutputTarget {
        sample_format: supported.sample_format(),
        config: StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        },
        block_frames: block_frames as usize,
        device,
        name,
    })
}

/// The device's minimum buffer, kept within sane bounds.
fn block_frames(config: &SupportedStreamConfig) -> u32 {
    match config.buffer_size() {
        SupportedBufferSize::Range { min, .. } => (*min).clamp(MIN_BLOCK_FRAMES, MAX_BLOCK_FRAMES),
        SupportedBufferSize::Unknown => DEFAULT_BLOCK_FRAMES,
    }
}

fn is_usable_format(format: SampleFormat) -> bool {
    matches!(
        format,
        SampleFormat::I16 | SampleFormat::U16 | SampleFormat::F32
    )
}
