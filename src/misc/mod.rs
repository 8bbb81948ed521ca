//! Small helpers that don't belong to the engine itself.

pub mod buf_writer;
pub mod ring_buffer;
pub mod similarity;

pub use similarity::Similarity;
