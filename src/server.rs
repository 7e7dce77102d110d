//! Top-level wiring: binds a listener, starts the acceptor and scheduler, and owns shutdown.

use std::fmt;
use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::Arc;

use log::info;
use socket2::{Domain, Socket, Type};

use crate::acceptor::Acceptor;
use crate::config::ServerConfig;
use crate::handler::RequestHandler;
use crate::scheduler::Scheduler;

/// A running HTTP/1.1 pipeline-processing server.
///
/// Owns the [`Acceptor`] and [`Scheduler`] for one bound listener. Dropping a `Server` does
/// not shut it down; call [`Server::shutdown`] explicitly.
pub struct Server {
    acceptor: Arc<Acceptor>,
    scheduler: Arc<Scheduler>,
    local_addr: SocketAddr,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

impl Server {
    /// Binds `addr` and starts accepting connections, dispatching completed request headers
    /// to `handler`.
    ///
    /// Built through `socket2` rather than `TcpListener::bind` directly so
    /// `config.accept_backlog` actually reaches `listen()` — `std::net::TcpListener::bind`
    /// always asks for a backlog of 128 and gives the caller no way to change it.
    pub fn bind<A: ToSocketAddrs>(
        addr: A,
        config: ServerConfig,
        handler: Arc<dyn RequestHandler>,
    ) -> io::Result<Self> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no addresses to bind to"))?;

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)?;
        socket.bind(&addr.into())?;
        socket.listen(config.accept_backlog as i32)?;
        let listener: TcpListener = socket.into();

        Self::from_listener(listener, config, handler)
    }

    /// Starts a server around an already-bound `listener`, useful for tests that need to pick
    /// an ephemeral port ahead of time or pass a pre-configured socket.
    pub fn from_listener(
        listener: TcpListener,
        config: ServerConfig,
        handler: Arc<dyn RequestHandler>,
    ) -> io::Result<Self> {
        let local_addr = listener.local_addr()?;
        let scheduler = Scheduler::new(config.clone(), handler);
        let acceptor = Acceptor::new(listener, config, scheduler.clone())?;
        acceptor.spawn();

        info!("listening on {local_addr}");
        Ok(Self {
            acceptor,
            scheduler,
            local_addr,
        })
    }

    /// The address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting new connections, closes every pipeline still alive, and waits for the
    /// acceptor, worker, and timer threads to exit.
    ///
    /// Requests already dispatched to the handler are allowed to finish; pipelines merely
    /// waiting for their next byte are closed without ceremony.
    pub fn shutdown(&self) {
        self.acceptor.stop();
        self.scheduler.shutdown();
        info!("server on {} shut down", self.local_addr);
    }
}
