//! Per-pipeline request-header polling state machine.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::error::PollError;
use crate::pipeline::PipelineLike;
use crate::scanner::{HeaderScanner, ScanOutcome};

/// Outcome of one [`Poller::poll`] step.
#[derive(Debug)]
pub enum PollResult {
    /// No complete header yet. The scheduler places this poller in the wait bucket for
    /// `phase`.
    Wait {
        /// The number of consecutive empty polls observed so far, including this one.
        phase: u32,
    },
    /// A full header was read; [`Poller::header`] now returns it. The dispatcher hands the
    /// pipeline and header to the `RequestHandler`.
    Ready,
    /// The pipeline is no longer usable and must be closed.
    Dead(PollError),
}

/// Per-request scanning state attached to one pipeline.
///
/// A fresh `Poller` is constructed for every pipelined request — on first scheduling of a
/// pipeline, and again after the handler for the previous request returns with the
/// connection still alive. Exactly one `Poller` exists for a given pipeline at any instant:
/// in the ready queue, in a wait bucket, or held by the worker currently executing it.
#[derive(Debug)]
pub struct Poller {
    pipeline: Arc<dyn PipelineLike>,
    scanner: HeaderScanner,
    phase: u32,
}

impl Poller {
    /// Creates a poller for `pipeline`'s next request, with a clean scanner and phase 0.
    pub fn new(pipeline: Arc<dyn PipelineLike>) -> Self {
        Self {
            pipeline,
            scanner: HeaderScanner::new(),
            phase: 0,
        }
    }

    /// The pipeline this poller is scanning.
    pub fn pipeline(&self) -> &Arc<dyn PipelineLike> {
        &self.pipeline
    }

    /// The current consecutive-empty-poll count.
    pub fn phase(&self) -> u32 {
        self.phase
    }

    /// Performs one non-blocking attempt to consume the current request's header.
    ///
    /// Resets `phase` to 0 whenever bytes were consumed this call, even without completing
    /// the header — a connection trickling data in stays out of the back-off buckets as
    /// long as it keeps making progress. `phase` only increments on a call that reads
    /// nothing at all.
    pub fn poll(&mut self, config: &ServerConfig) -> PollResult {
        let mut input = match self.pipeline.input().lock() {
            Ok(guard) => guard,
            Err(_) => {
                return PollResult::Dead(PollError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "pipeline input mutex poisoned",
                )))
            }
        };

        match self.scanner.poll(&mut input, config.header_limit_bytes as usize) {
            Ok(ScanOutcome::Found) => {
                self.phase = 0;
                PollResult::Ready
            }
            Ok(ScanOutcome::Pending { progressed: true }) => {
                self.phase = 0;
                PollResult::Wait { phase: self.phase }
            }
            Ok(ScanOutcome::Pending { progressed: false }) => {
                self.phase += 1;
                PollResult::Wait { phase: self.phase }
            }
            Err(err) => PollResult::Dead(err),
        }
    }

    /// The header bytes consumed on [`PollResult::Ready`], ending with the terminating
    /// CRLFCRLF.
    pub fn header(&self) -> &[u8] {
        self.scanner.header()
    }
}
