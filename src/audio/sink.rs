//! Output sinks the producer loop writes blocks into.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use parking_lot::Mutex;

use crate::{
    config::{EngineConfig, CHANNELS},
    error::SinkError,
};

/// A streaming 16-bit stereo output.
/// Owned by the producer thread from open to drop; dropping it releases the device.
pub trait AudioSink {
    /// Number of stereo frames the producer should put in each block.
    fn block_frames(&self) -> usize;

    /// Writes one interleaved block, blocking until the sink has room for it.
    fn write(&mut self, block: &[i16]) -> Result<(), SinkError>;

    /// Tries to rebuild the underlying output after a transient failure.
    fn reopen(&mut self) -> Result<(), SinkError> {
        Err(SinkError::Closed)
    }
}

/// Opens sinks for new runs.
/// `open` is called on the producer thread, so sinks themselves need not be `Send`.
pub trait SinkFactory: Send + Sync {
    fn open(&self, config: &EngineConfig) -> Result<Box<dyn AudioSink>, SinkError>;
}

/// In-process sink factory that records what gets written.
/// Used for running the engine without audio hardware.
#[derive(Clone)]
pub struct MemorySinkFactory {
    shared: Arc<Shared>,
    block_frames: usize,
    realtime: bool,
    fail_after: Option<usize>,
    unavailable: bool,
}

struct Shared {
    blocks: Mutex<VecDeque<Vec<i16>>>,
    keep: usize,
    opened: AtomicUsize,
    open_sinks: AtomicUsize,
    written: AtomicUsize,
    reopened: AtomicUsize,
}

pub struct MemorySink {
    shared: Arc<Shared>,
    block_frames: usize,
    block_time: Option<Duration>,
    fail_after: Option<usize>,
}

impl MemorySinkFactory {
    /// Number of recent blocks kept for inspection.
    const KEEP_BLOCKS: usize = 64;

    pub fn new(block_frames: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                blocks: Mutex::new(VecDeque::new()),
                keep: Self::KEEP_BLOCKS,
                opened: AtomicUsize::new(0),
                open_sinks: AtomicUsize::new(0),
                written: AtomicUsize::new(0),
                reopened: AtomicUsize::new(0),
            }),
            block_frames: block_frames.max(1),
            realtime: false,
            fail_after: None,
            unavailable: false,
        }
    }

    /// Makes every write take as long as the block would take to play.
    pub fn realtime(mut self) -> Self {
        self.realtime = true;
        self
    }

    /// Every write after the first `blocks` fails with [`SinkError::Transient`].
    pub fn failing_after(mut self, blocks: usize) -> Self {
        self.fail_after = Some(blocks);
        self
    }

    /// Refuses to open any sink.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// How many sinks have been opened so far.
    pub fn opened(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }

    /// How many sinks are currently alive (opened and not yet dropped).
    pub fn open_sinks(&self) -> usize {
        self.shared.open_sinks.load(Ordering::SeqCst)
    }

    /// Total blocks written across all sinks.
    pub fn written(&self) -> usize {
        self.shared.written.load(Ordering::SeqCst)
    }

    pub fn reopened(&self) -> usize {
        self.shared.reopened.load(Ordering::SeqCst)
    }

    /// The most recent blocks, oldest first.
    pub fn blocks(&self) -> Vec<Vec<i16>> {
        self.shared.blocks.lock().iter().cloned().collect()
    }

    pub fn last_block(&self) -> Option<Vec<i16>> {
        self.shared.blocks.lock().back().cloned()
    }
}

impl SinkFactory for MemorySinkFactory {
    fn open(&self, config: &EngineConfig) -> Result<Box<dyn AudioSink>, SinkError> {
        if self.unavailable {
            return Err(SinkError::Unavailable("memory sink disabled".to_owned()));
        }

        self.shared.opened.fetch_add(1, Ordering::SeqCst);
        self.shared.open_sinks.fetch_add(1, Ordering::SeqCst);

        let block_time = self.realtime.then(|| {
            Duration::from_secs_f64(self.block_frames as f64 / config.sample_rate as f64)
        });

        Ok(Box::new(MemorySink {
            shared: self.shared.clone(),
            block_frames: self.block_frames,
            block_time,
            fail_after: self.fail_after,
        }))
    }
}

impl AudioSink for MemorySink {
    fn block_frames(&self) -> usize {
        self.block_frames
    }

    fn write(&mut self, block: &[i16]) -> Result<(), SinkError> {
        debug_assert_eq!(block.len(), self.block_frames * CHANNELS);

        if let Some(limit) = self.fail_after {
            if self.shared.written.load(Ordering::SeqCst) >= limit {
                return Err(SinkError::Transient("injected write failure".to_owned()));
            }
        }

        if let Some(time) = self.block_time {
            thread::sleep(time);
        }

        let mut blocks = self.shared.blocks.lock();
        if blocks.len() >= self.shared.keep {
            blocks.pop_front();
        }
        blocks.push_back(block.to_vec());
        self.shared.written.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn reopen(&mut self) -> Result<(), SinkError> {
        self.shared.reopened.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for MemorySink {
    fn drop(&mut self) {
        self.shared.open_sinks.fetch_sub(1, Ordering::SeqCst);
    }
}
