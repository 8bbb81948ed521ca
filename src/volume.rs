//! Lock-free volume storage and the volume control seam used by the fade driver.

use std::sync::atomic::{AtomicU32, Ordering};

/// Something whose output level can be read and changed from any thread.
/// Implemented by the engine and by whatever plays the ambient sounds.
pub trait VolumeControl: Send + Sync {
    fn volume(&self) -> f32;
    fn set_volume(&self, volume: f32);
}

/// Clamps a volume into `[0, 1]`. NaN becomes silence.
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        return 0.0;
    }

    volume.clamp(0.0, 1.0)
}

/// An `f32` volume stored as its bit pattern in an atomic.
/// Writers never block the reader; the last write wins.
#[derive(Debug)]
pub struct AtomicVolume(AtomicU32);

impl AtomicVolume {
    pub fn new(volume: f32) -> Self {
        Self(AtomicU32::new(clamp_volume(volume).to_bits()))
    }

    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }

    /// Clamps and stores `volume`, returning the value actually stored.
    pub fn store(&self, volume: f32) -> f32 {
        let volume = clamp_volume(volume);
        self.0.store(volume.to_bits(), Ordering::Release);
        volume
    }
}

impl Default for AtomicVolume {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl VolumeControl for AtomicVolume {
    fn volume(&self) -> f32 {
        self.load()
    }

    fn set_volume(&self, volume: f32) {
        self.store(volume);
    }
}
