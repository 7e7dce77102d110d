//! Accepts incoming connections, configures their sockets, and hands pipelines to the scheduler.

use std::fmt;
use std::io;
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, warn};
use slab::Slab;
use socket2::{SockRef, TcpKeepalive};

use crate::config::ServerConfig;
use crate::pipeline::{Pipeline, PipelineLike};
use crate::scheduler::Scheduler;

/// How long `accept()` blocks before the accept loop re-checks the shutdown flag.
///
/// `std::net::TcpListener` has no portable accept-with-timeout, so the listener itself is put
/// in non-blocking mode and the loop sleeps between attempts instead.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Accepts connections on a bound [`TcpListener`], configures each socket per
/// [`ServerConfig`], and enqueues a fresh [`Pipeline`] with the [`Scheduler`].
///
/// Keeps a weak registry of every pipeline it has handed off, so that [`Acceptor::stop`] can
/// drain and close any pipelines the scheduler hasn't already finished with.
pub struct Acceptor {
    listener: TcpListener,
    config: ServerConfig,
    scheduler: Arc<Scheduler>,
    registry: Mutex<Slab<Weak<dyn PipelineLike>>>,
    shutdown: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for Acceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acceptor")
            .field("local_addr", &self.listener.local_addr().ok())
            .field("shutdown", &self.shutdown.load(Ordering::Relaxed))
            .finish()
    }
}

impl Acceptor {
    /// Wraps an already-bound `listener`, ready to [`Acceptor::spawn`].
    pub fn new(listener: TcpListener, config: ServerConfig, scheduler: Arc<Scheduler>) -> io::Result<Arc<Self>> {
        listener.set_nonblocking(true)?;
        Ok(Arc::new(Self {
            listener,
            config,
            scheduler,
            registry: Mutex::new(Slab::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(None),
        }))
    }

    /// The address the underlying listener is bound to.
    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Starts the background accept loop.
    pub fn spawn(self: &Arc<Self>) {
        let acceptor = self.clone();
        let handle = thread::Builder::new()
            .name("loomhttp-acceptor".into())
            .spawn(move || acceptor.run())
            .expect("failed to spawn acceptor thread");
        *self.thread.lock().expect("acceptor thread mutex poisoned") = Some(handle);
    }

    fn run(&self) {
        while !self.shutdown.load(Ordering::Acquire) {
            match self.listener.accept() {
                Ok((socket, peer)) => {
                    if let Err(err) = self.accept_one(socket, peer) {
                        warn!("dropping connection from {peer}: {err}");
                    }
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(err) => {
                    // anything other than WouldBlock here is the listening socket itself
                    // failing, not a single connection attempt — std's accept() never hands
                    // back a partial connection, so there's no pipeline to isolate the
                    // error to. Stop accepting and begin the shutdown sequence.
                    warn!("listening socket failed, shutting down: {err}");
                    self.shutdown.store(true, Ordering::Release);
                    self.scheduler.shutdown();
                    break;
                }
            }
        }
    }

    fn accept_one(&self, socket: std::net::TcpStream, peer: std::net::SocketAddr) -> io::Result<()> {
        configure_socket(&socket, &self.config)?;

        let pipeline: Arc<dyn PipelineLike> =
            Arc::new(Pipeline::new(socket, peer, self.config.write_buffer_bytes as usize)?);

        let mut registry = self.registry.lock().expect("acceptor registry mutex poisoned");
        registry.retain(|_, weak| weak.strong_count() > 0);
        registry.insert(Arc::downgrade(&pipeline));
        drop(registry);

        debug!("accepted connection from {peer}");
        self.scheduler.enqueue(pipeline);
        Ok(())
    }

    /// Stops the accept loop and closes every pipeline the acceptor has handed off that is
    /// still alive, so a shutting-down server doesn't leave sockets dangling in the
    /// scheduler's ready queue or wait buckets.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.thread.lock().expect("acceptor thread mutex poisoned").take() {
            let _ = handle.join();
        }
        let registry = self.registry.lock().expect("acceptor registry mutex poisoned");
        for (_, weak) in registry.iter() {
            if let Some(pipeline) = weak.upgrade() {
                pipeline.close();
            }
        }
    }
}

fn configure_socket(socket: &std::net::TcpStream, config: &ServerConfig) -> io::Result<()> {
    socket.set_nodelay(true)?;
    if config.idle_timeout_ms > 0 {
        let timeout = Duration::from_millis(u64::from(config.idle_timeout_ms));
        socket.set_read_timeout(Some(timeout))?;
        socket.set_write_timeout(Some(timeout))?;
    }

    let sock_ref = SockRef::from(socket);
    sock_ref.set_linger(Some(Duration::from_secs(0)))?;
    sock_ref.set_tcp_keepalive(&TcpKeepalive::new().with_time(Duration::from_secs(60)))?;
    Ok(())
}
