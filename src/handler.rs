//! The single call-out boundary to request-handling code outside the core.

use std::fmt;

use crate::pipeline::PipelineLike;

/// Outcome a [`RequestHandler`] returns after processing one request's header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Keep the pipeline open; the scheduler starts polling for the next pipelined
    /// request.
    KeepAlive,
    /// Close the pipeline after this request.
    Close,
    /// An unrecoverable error occurred while handling the request; log it and close the
    /// pipeline.
    FatalError,
}

/// The one function the core calls out to once a request header has been fully consumed.
///
/// `header` is everything read up to and including the terminating CRLFCRLF; any bytes that
/// followed the terminator in the underlying socket's last read have already been pushed
/// back onto the pipeline's input stream and are not part of `header`. The core performs no
/// interpretation of method, URI, headers, or body — that is entirely this boundary's
/// responsibility.
pub trait RequestHandler: Send + Sync {
    /// Handles one request's header, reachable for further reads/writes through `pipeline`.
    fn handle(&self, pipeline: &dyn PipelineLike, header: &[u8]) -> HandleOutcome;
}

impl fmt::Debug for dyn RequestHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn RequestHandler")
    }
}
