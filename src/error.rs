//! Error types for the engine and the audio output layer.

use std::io;

use thiserror::Error;

/// Errors returned by [`crate::engine::SignalEngine::start`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// The audio sink could not be opened (device busy, missing, unsupported format...).
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),
    /// A previous run has not been stopped yet.
    #[error("a run is already active on this engine")]
    AlreadyRunning,
    #[error("invalid engine config: {0}")]
    InvalidConfig(String),
    #[error("failed to spawn producer thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Errors reported by an [`crate::audio::sink::AudioSink`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The sink could not be opened at all.
    #[error("sink unavailable: {0}")]
    Unavailable(String),
    /// A write failed but the sink may recover (underrun, device reconfiguration).
    #[error("transient sink failure: {0}")]
    Transient(String),
    /// The sink is gone and cannot be written to again.
    #[error("sink closed")]
    Closed,
}

impl From<SinkError> for EngineError {
    fn from(err: SinkError) -> Self {
        match err {
            SinkError::Unavailable(msg) | SinkError::Transient(msg) => {
                EngineError::DeviceUnavailable(msg)
            }
            SinkError::Closed => EngineError::DeviceUnavailable("sink closed".to_owned()),
        }
    }
}
