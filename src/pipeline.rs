//! A single keep-alive TCP connection together with its streams, attributes, and identity.

use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::attributes::Attributes;
use crate::buffered_output::BufferedOutput;
use crate::stream::PipelineStream;

/// The externally observable behavior shared by [`Pipeline`] and any wrapper built around
/// one by composition (output buffering today; TLS, eventually, without touching the core
/// scheduling logic).
///
/// A `FilterPipeline` delegates every method here to the pipeline it wraps, so wrapping is
/// composition rather than an inheritance chain: the scheduler and poller only ever see
/// `Arc<dyn PipelineLike>` and can't tell a wrapped pipeline from a bare one.
pub trait PipelineLike: std::fmt::Debug + Send + Sync {
    /// Exclusive access to the input stream.
    ///
    /// Returns the same object identity across calls — the [`crate::scanner::HeaderScanner`]
    /// attached to a pipeline's [`crate::poller::Poller`] depends on reading from the same
    /// underlying push-back buffer every time.
    fn input(&self) -> &Mutex<PipelineStream>;

    /// The pipeline's buffered output stream.
    fn output(&self) -> &Mutex<BufferedOutput<PipelineStream>>;

    /// The address of the connected peer.
    fn peer_address(&self) -> SocketAddr;

    /// The pipeline's attribute bag.
    fn attributes(&self) -> &Attributes;

    /// Closes the pipeline: shuts down the socket and flushes any pending output.
    ///
    /// Idempotent and never fails observably. A concurrent `close` racing an in-flight read
    /// either lets that read complete first or fails it with an I/O error — the `available()`
    /// probe's bounded timeout means a reader never blocks on `close`'s mutex for long.
    fn close(&self);

    /// Whether [`PipelineLike::close`] has already run.
    fn is_closed(&self) -> bool;
}

/// Owns one accepted socket: its input and output streams, attribute map, and peer address.
///
/// Created by the [`crate::acceptor::Acceptor`], then handed to the
/// [`crate::scheduler::Scheduler`]. While a worker holds this pipeline's
/// [`crate::poller::Poller`], that worker has exclusive access to the read side; writes are
/// only performed from the thread currently executing the
/// [`crate::handler::RequestHandler`] for this pipeline's current request.
#[derive(Debug)]
pub struct Pipeline {
    input: Mutex<PipelineStream>,
    output: Mutex<BufferedOutput<PipelineStream>>,
    attributes: Attributes,
    peer: SocketAddr,
    closed: AtomicBool,
}

impl Pipeline {
    /// Builds a pipeline around an already-accepted `socket`.
    ///
    /// Duplicates the socket so the read and write sides can be locked independently: a
    /// worker scanning for the next request's header never blocks a concurrent response
    /// write, and vice versa.
    pub fn new(socket: TcpStream, peer: SocketAddr, write_buffer_bytes: usize) -> io::Result<Self> {
        let write_half = socket.try_clone()?;
        Ok(Self {
            input: Mutex::new(PipelineStream::new(socket)),
            output: Mutex::new(BufferedOutput::new(
                PipelineStream::new(write_half),
                write_buffer_bytes,
            )),
            attributes: Attributes::new(),
            peer,
            closed: AtomicBool::new(false),
        })
    }
}

impl PipelineLike for Pipeline {
    fn input(&self) -> &Mutex<PipelineStream> {
        &self.input
    }

    fn output(&self) -> &Mutex<BufferedOutput<PipelineStream>> {
        &self.output
    }

    fn peer_address(&self) -> SocketAddr {
        self.peer
    }

    fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut input) = self.input.lock() {
            let _ = input.shutdown(Shutdown::Both);
        }
        if let Ok(mut output) = self.output.lock() {
            let _ = output.flush();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Delegates every [`PipelineLike`] method to an inner pipeline.
///
/// Exists so that wrapping behavior — response buffering today, a TLS layer later — is
/// composition over a concrete [`Pipeline`] rather than a subclassing hierarchy.
#[derive(Debug)]
pub struct FilterPipeline<P: PipelineLike> {
    inner: P,
}

impl<P: PipelineLike> FilterPipeline<P> {
    /// Wraps `inner`. By itself this changes nothing observable; it's a seam for further
    /// wrapping to hang behavior off.
    pub fn new(inner: P) -> Self {
        Self { inner }
    }

    /// Borrows the wrapped pipeline.
    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: PipelineLike> PipelineLike for FilterPipeline<P> {
    fn input(&self) -> &Mutex<PipelineStream> {
        self.inner.input()
    }

    fn output(&self) -> &Mutex<BufferedOutput<PipelineStream>> {
        self.inner.output()
    }

    fn peer_address(&self) -> SocketAddr {
        self.inner.peer_address()
    }

    fn attributes(&self) -> &Attributes {
        self.inner.attributes()
    }

    fn close(&self) {
        self.inner.close()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}
