//! Server-wide tunables.

/// Recognized server configuration.
///
/// All fields have conservative defaults via [`ServerConfig::default`]; use the `with_*`
/// builder methods to override individual fields. None of these are reloadable: a
/// `ServerConfig` is consumed once at [`crate::server::Server`] construction.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Worker pool size.
    pub workers: u32,
    /// Listen backlog. Only meaningful when the caller lets [`crate::server::Server::bind`]
    /// create the listening socket; a caller supplying an already-bound listener controls
    /// this themselves.
    pub accept_backlog: u32,
    /// Per-socket read timeout, applied by the acceptor at accept time.
    pub idle_timeout_ms: u32,
    /// Maximum header-region size before a request fails with `HeaderTooLong`.
    pub header_limit_bytes: u32,
    /// Output buffering size in bytes; zero disables buffering.
    pub write_buffer_bytes: u32,
    /// Wait-bucket delays in milliseconds, indexed by `phase` and monotonically
    /// non-decreasing. The last entry is a plateau: phases beyond the vector's length reuse
    /// it.
    pub poll_schedule_ms: Vec<u32>,
    /// Number of consecutive empty polls after which a pipeline is declared dead.
    pub max_empty_phases: u32,
    /// When `true`, a pipeline whose header exceeds `header_limit_bytes` gets one more
    /// handler call carrying a synthetic marker before being closed, so the handler can
    /// write a 414 response. When `false` (the default), the pipeline is closed
    /// immediately with no handler call.
    pub emit_header_too_long_response: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            accept_backlog: 1024,
            idle_timeout_ms: 60_000,
            header_limit_bytes: 8192,
            write_buffer_bytes: 8192,
            poll_schedule_ms: vec![0, 10, 50, 250, 1000, 5000],
            max_empty_phases: 5,
            emit_header_too_long_response: false,
        }
    }
}

impl ServerConfig {
    /// Overrides `workers`.
    pub fn with_workers(mut self, workers: u32) -> Self {
        self.workers = workers;
        self
    }

    /// Overrides `accept_backlog`.
    pub fn with_accept_backlog(mut self, accept_backlog: u32) -> Self {
        self.accept_backlog = accept_backlog;
        self
    }

    /// Overrides `idle_timeout_ms`.
    pub fn with_idle_timeout_ms(mut self, idle_timeout_ms: u32) -> Self {
        self.idle_timeout_ms = idle_timeout_ms;
        self
    }

    /// Overrides `header_limit_bytes`.
    pub fn with_header_limit_bytes(mut self, header_limit_bytes: u32) -> Self {
        self.header_limit_bytes = header_limit_bytes;
        self
    }

    /// Overrides `write_buffer_bytes`.
    pub fn with_write_buffer_bytes(mut self, write_buffer_bytes: u32) -> Self {
        self.write_buffer_bytes = write_buffer_bytes;
        self
    }

    /// Overrides `poll_schedule_ms`. Panics if empty — the scheduler always needs at least
    /// one bucket to place an empty poll into.
    pub fn with_poll_schedule_ms(mut self, poll_schedule_ms: Vec<u32>) -> Self {
        assert!(
            !poll_schedule_ms.is_empty(),
            "poll_schedule_ms must have at least one bucket"
        );
        self.poll_schedule_ms = poll_schedule_ms;
        self
    }

    /// Overrides `max_empty_phases`.
    pub fn with_max_empty_phases(mut self, max_empty_phases: u32) -> Self {
        self.max_empty_phases = max_empty_phases;
        self
    }

    /// Overrides `emit_header_too_long_response`.
    pub fn with_emit_header_too_long_response(mut self, emit: bool) -> Self {
        self.emit_header_too_long_response = emit;
        self
    }
}
