//! The dual-tone signal engine.
//!
//! A run starts with [`SignalEngine::start`], which opens the sink on a
//! dedicated producer thread and returns once the sink is open. From then on the
//! producer fills blocks with the two sine waves, writes them to the sink (the
//! blocking write is what paces the loop) and publishes a [`WaveformSnapshot`]
//! of every block. Volume can be changed from any thread at any time and is
//! picked up on the next block. [`SignalEngine::stop`] clears the running flag
//! and joins the producer, so when it returns the sink has been released.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use crossbeam::channel::{self, Receiver};
use log::{error, info};
use parking_lot::Mutex;

use crate::{
    audio::sink::{AudioSink, SinkFactory},
    bus::Bus,
    config::EngineConfig,
    error::EngineError,
    snapshot::WaveformSnapshot,
    volume::VolumeControl,
};

mod producer;
mod state;

use producer::Producer;
pub use state::{EngineState, EngineStatus};

/// Lifecycle notifications published by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Started { run: u64, config: EngineConfig },
    Stopped { run: u64 },
    /// The sink failed and could not be recovered; the run ended on its own.
    PlaybackFailed { run: u64, reason: String },
}

/// Handle to one run of the engine.
/// Stays valid after the run ends, it just reports that it is no longer running.
#[derive(Debug, Clone)]
pub struct RunHandle {
    id: u64,
    config: EngineConfig,
    block_frames: usize,
    state: Arc<EngineState>,
}

pub struct SignalEngine {
    factory: Arc<dyn SinkFactory>,
    active: Mutex<Option<ActiveRun>>,
    next_run: AtomicU64,
    snapshots: Bus<WaveformSnapshot>,
    events: Bus<EngineEvent>,
}

struct ActiveRun {
    handle: RunHandle,
    thread: JoinHandle<()>,
}

impl RunHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Frames per block reported by the sink when the run started.
    pub fn block_frames(&self) -> usize {
        self.block_frames
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn volume(&self) -> f32 {
        self.state.volume()
    }

    pub fn blocks_written(&self) -> u64 {
        self.state.blocks_written()
    }
}

impl SignalEngine {
    pub fn new(factory: impl SinkFactory + 'static) -> Self {
        Self::with_factory(Arc::new(factory))
    }

    pub fn with_factory(factory: Arc<dyn SinkFactory>) -> Self {
        Self {
            factory,
            active: Mutex::new(None),
            next_run: AtomicU64::new(0),
            snapshots: Bus::new(),
            events: Bus::new(),
        }
    }

    /// Opens a sink and starts a new producer loop.
    /// Fails with [`EngineError::AlreadyRunning`] if the previous run was not stopped,
    /// and with [`EngineError::DeviceUnavailable`] if the sink cannot be opened.
    pub fn start(&self, config: EngineConfig, initial_volume: f32) -> Result<RunHandle, EngineError> {
        config.validate()?;

        let mut active = self.active.lock();
        if let Some(run) = active.take() {
            if run.handle.is_running() {
                *active = Some(run);
                return Err(EngineError::AlreadyRunning);
            }

            // The previous run ended on its own, finish cleaning it up
            if run.thread.join().is_err() {
                error!("Producer of run {} panicked", run.handle.id);
            }
        }

        let id = self.next_run.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(EngineState::new(initial_volume));
        let (ready_tx, ready_rx) = channel::bounded(1);

        let factory = self.factory.clone();
        let producer = Producer {
            run: id,
            config,
            state: state.clone(),
            snapshots: self.snapshots.clone(),
            events: self.events.clone(),
        };

        let thread = thread::Builder::new()
            .name(format!("signal-engine-{id}"))
            .spawn(move || {
                // Opened here so the sink never has to cross threads
                let sink = match factory.open(&config) {
                    Ok(sink) => sink,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                let _ = ready_tx.send(Ok(sink.block_frames()));
                producer.run(sink);
            })
            .map_err(EngineError::Spawn)?;

        let block_frames = match ready_rx.recv() {
            Ok(Ok(frames)) => frames,
            Ok(Err(err)) => {
                let _ = thread.join();
                return Err(err.into());
            }
            Err(_) => {
                let _ = thread.join();
                return Err(EngineError::DeviceUnavailable(
                    "producer exited before opening the sink".to_owned(),
                ));
            }
        };

        info!(
            "Run {id} started: {} Hz / {} Hz at {} Hz, {block_frames} frames per block",
            config.carrier_hz,
            config.right_hz(),
            config.sample_rate
        );

        let handle = RunHandle {
            id,
            config,
            block_frames,
            state,
        };
        *active = Some(ActiveRun {
            handle: handle.clone(),
            thread,
        });
        drop(active);

        self.events.publish(&EngineEvent::Started { run: id, config });
        Ok(handle)
    }

    /// Stops the current run and waits for the producer to exit.
    /// Does nothing if the engine is idle.
    pub fn stop(&self) {
        // Held until the producer has exited, so a concurrent stop or start
        // waits for the sink to be released. The producer never takes it.
        let mut active = self.active.lock();
        let Some(run) = active.take() else {
            return;
        };

        run.handle.state.request_stop();
        if run.thread.join().is_err() {
            error!("Producer of run {} panicked", run.handle.id);
        }
        drop(active);

        info!("Run {} stopped", run.handle.id);
        self.events.publish(&EngineEvent::Stopped { run: run.handle.id });
    }

    /// Sets the volume of the current run, clamped to `[0, 1]`.
    /// Returns the stored value, or `None` if the engine is idle.
    pub fn set_volume(&self, volume: f32) -> Option<f32> {
        self.active
            .lock()
            .as_ref()
            .map(|run| run.handle.state.set_volume(volume))
    }

    /// Volume of the current run.
    pub fn volume(&self) -> Option<f32> {
        self.active.lock().as_ref().map(|run| run.handle.volume())
    }

    pub fn status(&self) -> EngineStatus {
        if self.is_running() {
            EngineStatus::Running
        } else {
            EngineStatus::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .map_or(false, |run| run.handle.is_running())
    }

    /// Handle to the active run, if any.
    pub fn current(&self) -> Option<RunHandle> {
        self.active.lock().as_ref().map(|run| run.handle.clone())
    }

    /// Receives a copy of every produced block.
    /// At most `capacity` snapshots are buffered; further ones are dropped until the receiver catches up.
    pub fn subscribe_snapshots(&self, capacity: usize) -> Receiver<WaveformSnapshot> {
        self.snapshots.subscribe(capacity)
    }

    pub fn subscribe_events(&self, capacity: usize) -> Receiver<EngineEvent> {
        self.events.subscribe(capacity)
    }
}

impl VolumeControl for SignalEngine {
    fn volume(&self) -> f32 {
        SignalEngine::volume(self).unwrap_or(0.0)
    }

    fn set_volume(&self, volume: f32) {
        SignalEngine::set_volume(self, volume);
    }
}

impl Drop for SignalEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
