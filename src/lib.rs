//! Real-time binaural beat and pure tone generator.
//!
//! [`SignalEngine`] runs the synthesis loop, [`Player`] wraps it into a
//! session with a sleep timer, fade-out and interruption handling.

pub mod audio;
pub mod bus;
pub mod config;
pub mod engine;
pub mod error;
pub mod fade;
pub mod misc;
pub mod presets;
pub mod session;
pub mod snapshot;
pub mod timer;
pub mod volume;

pub use config::{EngineConfig, FadeConfig};
pub use engine::{EngineEvent, EngineStatus, RunHandle, SignalEngine};
pub use error::{EngineError, SinkError};
pub use session::{FocusChange, Player, PlayerStatus, SessionEvent};
pub use snapshot::WaveformSnapshot;
pub use volume::VolumeControl;
