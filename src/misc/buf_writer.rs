//! Whole-frame buffered writer for terminal drawing.

use std::io::{self, Write};

/// Collects everything written to it until [`Write::flush`] is called,
/// then hands it to the inner writer in a single `write_all`.
/// Unlike `std::io::BufWriter` it never flushes on its own, so a frame is
/// either drawn completely or not at all.
pub struct FrameWriter<T: Write> {
    inner: T,
    buf: Vec<u8>,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(inner: T) -> Self {
        Self::with_capacity(inner, 0)
    }

    pub fn with_capacity(inner: T, capacity: usize) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Bytes waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Drops the pending frame without writing it.
    pub fn discard(&mut self) {
        self.buf.clear();
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }
}

impl<T: Write> Write for FrameWriter<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.write_all(&self.buf)?;
        self.buf.clear();
        self.inner.flush()
    }
}
