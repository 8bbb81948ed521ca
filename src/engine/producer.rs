//! The producer loop: synthesize a block, write it, publish a snapshot, repeat.

use std::sync::Arc;

use log::{debug, error, warn};

use super::{state::EngineState, EngineEvent};
use crate::{
    audio::{sink::AudioSink, tone::DualTone},
    bus::Bus,
    config::{EngineConfig, CHANNELS},
    error::SinkError,
    snapshot::WaveformSnapshot,
};

/// Writes attempted on a sink before trying to reopen it.
const WRITE_ATTEMPTS: usize = 3;
/// Reopens attempted for a single block before giving up on the run.
const REOPEN_ATTEMPTS: usize = 2;

pub(super) struct Producer {
    pub run: u64,
    pub config: EngineConfig,
    pub state: Arc<EngineState>,
    pub snapshots: Bus<WaveformSnapshot>,
    pub events: Bus<EngineEvent>,
}

impl Producer {
    /// Runs until a stop is requested or the sink fails for good.
    /// The sink is dropped (and with it the device released) before this returns.
    pub fn run(self, mut sink: Box<dyn AudioSink>) {
        let mut tone = DualTone::new(&self.config);
        let mut block = Vec::new();
        let mut sequence = 0;

        while self.state.is_running() {
            block.resize(sink.block_frames() * CHANNELS, 0);

            // Read once so the whole block and its snapshot agree on the volume
            let volume = self.state.volume();
            tone.fill(&mut block, volume);

            if let Err(err) = write_block(sink.as_mut(), &block) {
                error!("Run {} failed: {err}", self.run);
                self.state.request_stop();
                self.events.publish(&EngineEvent::PlaybackFailed {
                    run: self.run,
                    reason: err.to_string(),
                });
                break;
            }
            self.state.block_written();

            if self.snapshots.subscriber_count() > 0 {
                self.snapshots.publish(&WaveformSnapshot::new(
                    sequence,
                    CHANNELS,
                    self.config.sample_rate,
                    volume,
                    &block,
                ));
            }
            sequence += 1;
        }

        drop(sink);
        debug!("run {} exited after {sequence} blocks", self.run);
    }
}

/// Writes a block, retrying transient failures and reopening the sink between rounds of retries.
fn write_block(sink: &mut dyn AudioSink, block: &[i16]) -> Result<(), SinkError> {
    let mut reopens = 0;

    loop {
        let mut last = String::new();
        for _ in 0..WRITE_ATTEMPTS {
            match sink.write(block) {
                Ok(()) => return Ok(()),
                Err(SinkError::Transient(err)) => {
                    warn!("Sink write failed: {err}");
                    last = err;
                }
                Err(err) => return Err(err),
            }
        }

        if reopens == REOPEN_ATTEMPTS {
            return Err(SinkError::Transient(format!(
                "giving up after {reopens} reopens: {last}"
            )));
        }

        reopens += 1;
        warn!("Reopening sink ({reopens}/{REOPEN_ATTEMPTS})");
        sink.reopen()?;
    }
}
