//! Write-side buffering in front of a pipeline's output stream.

use std::io::{self, Write};

/// Batches writes to an underlying stream so pipelined responses don't each force a
/// separate TCP packet.
///
/// Flushes when the internal buffer would overflow, on an explicit
/// [`BufferedOutput::flush`] call, and on [`Drop`]. Reused across every pipelined response
/// on one pipeline. A `capacity` of zero disables buffering entirely: every write passes
/// straight through to the inner stream.
///
/// This makes no ordering guarantees beyond those of the underlying stream.
#[derive(Debug)]
pub struct BufferedOutput<W: Write> {
    inner: W,
    buf: Vec<u8>,
    capacity: usize,
}

impl<W: Write> BufferedOutput<W> {
    /// Wraps `inner`, batching writes up to `capacity` bytes before flushing.
    pub fn new(inner: W, capacity: usize) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(capacity),
            capacity,
        }
    }
}

impl<W: Write> Write for BufferedOutput<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.capacity == 0 {
            return self.inner.write(data);
        }

        if self.buf.len() + data.len() > self.capacity {
            self.flush()?;
        }

        if data.len() >= self.capacity {
            return self.inner.write(data);
        }

        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            self.inner.write_all(&self.buf)?;
            self.buf.clear();
        }
        self.inner.flush()
    }
}

impl<W: Write> Drop for BufferedOutput<W> {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
