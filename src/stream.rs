//! Non-blocking probe over a keep-alive TCP stream.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

/// The smallest non-zero read timeout used while probing for available bytes.
const PROBE_TIMEOUT: Duration = Duration::from_millis(1);

/// Capacity of the push-back region kept in front of the raw socket.
const PUSHBACK_CAPACITY: usize = 512;

/// A `TcpStream` wrapped with a small push-back buffer and a cheap non-blocking
/// `available()` probe.
///
/// [`PipelineStream::available`] never blocks for longer than the platform's minimum
/// non-zero socket read timeout: it swaps in that timeout, attempts a one-byte read, then
/// restores whatever timeout the socket had before the probe. Restoring the prior timeout
/// is a correctness requirement — the probe is re-entered on every scheduler tick, so it
/// must leave the socket exactly as it found it, including the caller's own 60-second idle
/// timeout.
///
/// This lets one worker thread cheaply check many sockets for readability without
/// dedicating a thread, or an OS reactor registration, per connection — and, unlike relying
/// on the kernel's own notion of "bytes available", it positively detects a half-closed peer
/// by observing end-of-stream on the probe read.
#[derive(Debug)]
pub struct PipelineStream {
    socket: TcpStream,
    pushback: Vec<u8>,
    closed: bool,
}

impl PipelineStream {
    /// Wraps `socket`. The caller is responsible for any socket-level configuration
    /// (nodelay, linger, idle timeout) before or after construction.
    pub fn new(socket: TcpStream) -> Self {
        Self {
            socket,
            pushback: Vec::with_capacity(PUSHBACK_CAPACITY),
            closed: false,
        }
    }

    /// Returns the number of bytes immediately readable without blocking more than
    /// [`PROBE_TIMEOUT`].
    ///
    /// Once this has returned an error the stream is considered closed and every subsequent
    /// call returns the same kind of error without touching the socket again.
    pub fn available(&mut self) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "pipeline stream already closed",
            ));
        }

        if !self.pushback.is_empty() {
            return Ok(self.pushback.len().min(PUSHBACK_CAPACITY));
        }

        let prior_timeout = self.socket.read_timeout()?;
        self.socket.set_read_timeout(Some(PROBE_TIMEOUT))?;

        let mut probe = [0u8; 1];
        let result = self.socket.read(&mut probe);

        self.socket.set_read_timeout(prior_timeout)?;

        match result {
            Ok(0) => {
                self.closed = true;
                Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "peer closed the connection",
                ))
            }
            Ok(_) => {
                self.pushback.insert(0, probe[0]);
                Ok(1)
            }
            Err(err)
                if err.kind() == io::ErrorKind::WouldBlock
                    || err.kind() == io::ErrorKind::TimedOut =>
            {
                Ok(0)
            }
            Err(err) => Err(err),
        }
    }

    /// Pushes `bytes` back in front of the stream, so the next read sees them first, in the
    /// order given.
    pub fn push_back(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut combined = Vec::with_capacity(bytes.len() + self.pushback.len());
        combined.extend_from_slice(bytes);
        combined.extend_from_slice(&self.pushback);
        self.pushback = combined;
    }

    /// The connected peer's address.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.socket.peer_addr()
    }

    /// Shuts down both halves of the underlying socket.
    pub fn shutdown(&mut self, how: Shutdown) -> io::Result<()> {
        self.socket.shutdown(how)
    }

    /// Sets the socket's read timeout.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.socket.set_read_timeout(timeout)
    }
}

impl Read for PipelineStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.pushback.is_empty() {
            let n = buf.len().min(self.pushback.len());
            buf[..n].copy_from_slice(&self.pushback[..n]);
            self.pushback.drain(..n);
            return Ok(n);
        }
        self.socket.read(buf)
    }
}

impl Write for PipelineStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.socket.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.socket.flush()
    }
}
