//! Work queue, worker pool, and phased back-off scheduling of pollers across pipelines.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, warn};

use crate::config::ServerConfig;
use crate::error::PollError;
use crate::handler::{HandleOutcome, RequestHandler};
use crate::pipeline::PipelineLike;
use crate::poller::{PollResult, Poller};

/// One back-off phase: a fixed delay and the pollers currently waiting it out.
struct WaitBucket {
    delay: Duration,
    items: Mutex<Vec<(Instant, Poller)>>,
}

/// How long a worker blocks on the ready queue before re-checking the shutdown flag.
const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// How often the timer thread sweeps the wait buckets for expired deadlines.
const TIMER_TICK: Duration = Duration::from_millis(5);

/// The ready queue, phased wait buckets, and fixed worker pool that multiplex many
/// pipelines' [`Poller`]s onto a small thread pool.
///
/// Workers repeatedly dequeue a ready poller, run one poll step, and route the outcome:
/// `Wait` re-enters the appropriate back-off bucket, `Ready` invokes the
/// [`RequestHandler`] synchronously on the worker thread, and `Dead` closes the pipeline. A
/// single timer thread promotes expired wait-bucket entries back to the ready queue.
pub struct Scheduler {
    ready_tx: Sender<Poller>,
    ready_rx: Receiver<Poller>,
    buckets: Vec<WaitBucket>,
    config: ServerConfig,
    handler: Arc<dyn RequestHandler>,
    shutdown: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("buckets", &self.buckets.len())
            .field("workers", &self.config.workers)
            .field("shutdown", &self.shutdown.load(Ordering::Relaxed))
            .finish()
    }
}

impl Scheduler {
    /// Builds a scheduler for `config` and spawns its worker pool and timer thread.
    pub fn new(config: ServerConfig, handler: Arc<dyn RequestHandler>) -> Arc<Self> {
        let (ready_tx, ready_rx) = unbounded();
        let buckets = config
            .poll_schedule_ms
            .iter()
            .map(|ms| WaitBucket {
                delay: Duration::from_millis(u64::from(*ms)),
                items: Mutex::new(Vec::new()),
            })
            .collect();

        let scheduler = Arc::new(Self {
            ready_tx,
            ready_rx,
            buckets,
            config,
            handler,
            shutdown: Arc::new(AtomicBool::new(false)),
            workers: Mutex::new(Vec::new()),
            timer: Mutex::new(None),
        });

        let worker_count = scheduler.config.workers.max(1);
        let mut workers = Vec::with_capacity(worker_count as usize);
        for id in 0..worker_count {
            let sched = scheduler.clone();
            workers.push(
                thread::Builder::new()
                    .name(format!("loomhttp-worker-{id}"))
                    .spawn(move || sched.run_worker())
                    .expect("failed to spawn scheduler worker thread"),
            );
        }
        *scheduler.workers.lock().expect("workers mutex poisoned") = workers;

        let timer_sched = scheduler.clone();
        let timer_handle = thread::Builder::new()
            .name("loomhttp-timer".into())
            .spawn(move || timer_sched.run_timer())
            .expect("failed to spawn scheduler timer thread");
        *scheduler.timer.lock().expect("timer mutex poisoned") = Some(timer_handle);

        scheduler
    }

    /// Schedules `pipeline`'s first poller onto the ready queue.
    pub fn enqueue(&self, pipeline: Arc<dyn PipelineLike>) {
        self.requeue(Poller::new(pipeline));
    }

    fn requeue(&self, poller: Poller) {
        // the channel only disconnects once every receiver (every worker) has exited,
        // which only happens after shutdown; dropping a straggling poller at that point is
        // fine, its pipeline gets closed by the shutdown drain instead.
        let _ = self.ready_tx.send(poller);
    }

    fn wait(&self, poller: Poller, phase: u32) {
        let idx = (phase as usize).min(self.buckets.len() - 1);
        let bucket = &self.buckets[idx];
        let deadline = Instant::now() + bucket.delay;
        bucket
            .items
            .lock()
            .expect("wait bucket mutex poisoned")
            .push((deadline, poller));
    }

    fn run_worker(self: Arc<Self>) {
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return;
            }
            match self.ready_rx.recv_timeout(WORKER_POLL_INTERVAL) {
                Ok(poller) => self.step(poller),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }

    fn run_timer(self: Arc<Self>) {
        while !self.shutdown.load(Ordering::Acquire) {
            let now = Instant::now();
            for bucket in &self.buckets {
                let due: Vec<Poller> = {
                    let mut items = bucket.items.lock().expect("wait bucket mutex poisoned");
                    let (due, pending): (Vec<_>, Vec<_>) =
                        std::mem::take(&mut *items).into_iter().partition(|(deadline, _)| *deadline <= now);
                    *items = pending;
                    due.into_iter().map(|(_, poller)| poller).collect()
                };
                for poller in due {
                    self.requeue(poller);
                }
            }
            thread::sleep(TIMER_TICK);
        }
    }

    fn step(&self, mut poller: Poller) {
        let pipeline = poller.pipeline().clone();

        match poller.poll(&self.config) {
            PollResult::Wait { phase } => {
                if phase >= self.config.max_empty_phases {
                    debug!(
                        "pipeline {:?} exceeded max_empty_phases ({phase}); closing",
                        pipeline.peer_address()
                    );
                    pipeline.close();
                    return;
                }
                self.wait(poller, phase);
            }
            PollResult::Ready => {
                let header = poller.header().to_vec();
                self.dispatch(pipeline, &header);
            }
            PollResult::Dead(err) => {
                self.handle_dead(pipeline, err, &poller);
            }
        }
    }

    fn dispatch(&self, pipeline: Arc<dyn PipelineLike>, header: &[u8]) {
        let outcome = catch_unwind(AssertUnwindSafe(|| self.handler.handle(pipeline.as_ref(), header)));

        match outcome {
            Ok(HandleOutcome::KeepAlive) => {
                if pipeline.is_closed() {
                    return;
                }
                self.enqueue(pipeline);
            }
            Ok(HandleOutcome::Close) => {
                pipeline.close();
            }
            Ok(HandleOutcome::FatalError) => {
                warn!("request handler reported a fatal error; closing pipeline");
                pipeline.close();
            }
            Err(_) => {
                error!("request handler panicked; closing pipeline");
                pipeline.close();
            }
        }
    }

    fn handle_dead(&self, pipeline: Arc<dyn PipelineLike>, err: PollError, poller: &Poller) {
        if let PollError::HeaderTooLong { limit } = err {
            warn!(
                "pipeline {:?} exceeded header_limit_bytes ({limit})",
                pipeline.peer_address()
            );
            if self.config.emit_header_too_long_response {
                let marker = format!("__LOOMHTTP_HEADER_TOO_LONG__:{limit}");
                let _ = catch_unwind(AssertUnwindSafe(|| {
                    self.handler.handle(pipeline.as_ref(), marker.as_bytes())
                }));
            }
        } else {
            debug!(
                "pipeline {:?} died at phase {}: {err}",
                pipeline.peer_address(),
                poller.phase()
            );
        }
        pipeline.close();
    }

    /// Stops accepting new work and waits for the worker and timer threads to exit.
    ///
    /// Any poller still sitting in the ready queue or a wait bucket when this returns has
    /// its pipeline left to the caller (typically [`crate::server::Server::shutdown`], via
    /// its own pipeline registry) to close.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.timer.lock().expect("timer mutex poisoned").take() {
            let _ = handle.join();
        }
        let workers = std::mem::take(&mut *self.workers.lock().expect("workers mutex poisoned"));
        for worker in workers {
            let _ = worker.join();
        }
    }
}
