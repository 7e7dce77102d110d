//! Errors produced while polling a pipeline for a complete request header.

use std::fmt;
use std::io;

/// The error taxonomy of a single [`crate::poller::Poller::poll`] step.
///
/// Nothing in the core retries a failed socket operation — retry is a policy decision left
/// to the [`crate::handler::RequestHandler`]. A `PollError` always leads to the poller
/// reporting [`crate::poller::PollResult::Dead`]; the scheduler is responsible for removing
/// the poller from both queues before closing the pipeline, so errors never corrupt shared
/// state.
#[derive(Debug)]
pub enum PollError {
    /// `available()` observed the peer closing its half of the connection.
    PeerClosed,
    /// Any other I/O failure reading from or writing to the pipeline's socket.
    Io(io::Error),
    /// The header region exceeded the configured limit without a terminator.
    HeaderTooLong {
        /// The configured limit (`header_limit_bytes`) that was exceeded.
        limit: usize,
    },
    /// A wait-bucket sleep was interrupted and should be retried immediately rather than
    /// treated as a missed deadline.
    InterruptedWait,
}

impl fmt::Display for PollError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollError::PeerClosed => write!(f, "peer closed the connection"),
            PollError::Io(err) => write!(f, "I/O error: {err}"),
            PollError::HeaderTooLong { limit } => {
                write!(f, "request header exceeded {limit} bytes without a terminator")
            }
            PollError::InterruptedWait => write!(f, "wait-bucket sleep was interrupted"),
        }
    }
}

impl std::error::Error for PollError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PollError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for PollError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof | io::ErrorKind::NotConnected => PollError::PeerClosed,
            io::ErrorKind::Interrupted => PollError::InterruptedWait,
            _ => PollError::Io(err),
        }
    }
}
