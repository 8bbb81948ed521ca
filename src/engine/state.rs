use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::volume::AtomicVolume;

/// Whether the engine currently has a producer loop running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Idle,
    Running,
}

/// State shared between the producer loop and everyone else for a single run.
/// Phases are not in here, they belong to the producer alone.
#[derive(Debug)]
pub struct EngineState {
    /// Set at creation, only ever cleared afterwards.
    running: AtomicBool,
    volume: AtomicVolume,
    blocks_written: AtomicU64,
}

impl EngineState {
    pub fn new(volume: f32) -> Self {
        Self {
            running: AtomicBool::new(true),
            volume: AtomicVolume::new(volume),
            blocks_written: AtomicU64::new(0),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn request_stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn volume(&self) -> f32 {
        self.volume.load()
    }

    /// Clamps and stores the volume, returning the stored value.
    pub fn set_volume(&self, volume: f32) -> f32 {
        self.volume.store(volume)
    }

    pub fn blocks_written(&self) -> u64 {
        self.blocks_written.load(Ordering::Relaxed)
    }

    pub(super) fn block_written(&self) {
        self.blocks_written.fetch_add(1, Ordering::Relaxed);
    }
}
