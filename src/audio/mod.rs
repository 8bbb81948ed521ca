//! Audio utilities.
//! Tone synthesis, analysis and the output sinks the engine writes to.

pub mod algorithms;
pub mod devices;
pub mod output;
pub mod sink;
pub mod tone;
