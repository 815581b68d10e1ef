//! Fire-and-forget executor for outbound HTTP calls.
//!
//! ## Design
//!
//! - `execute` is a one-way enqueue into an unbounded channel; it never blocks,
//!   never fails and never reports back
//! - a dispatcher task turns each submission into its own tokio task
//! - each job creates its execution record, then runs a fixed-backoff retry loop,
//!   persisting every attempt outcome to the ledger
//! - panics inside a job are caught at the task boundary and logged
//! - concurrency is unbounded unless `max_in_flight` is configured
//!
//! The descriptor's cancellation token is only observed by the transport during
//! a send. The retry loop itself never checks it, so a cancelled request keeps
//! consuming its budget and the audit trail is always completed.

mod job;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, Instrument};

use courier_core::{CorrelationCode, RetryPolicy};

use crate::config::ExecutorConfig;
use crate::ledger::JobLedger;
use crate::transport::{RequestDescriptor, Transport};

use job::{JobOutcome, LedgerStage};

/// Entry point for fire-and-forget dispatch.
pub trait Dispatch: Send + Sync {
    /// Dispatch `request` in the background with up to `retry_budget` attempts.
    fn execute(&self, request: RequestDescriptor, retry_budget: u32);
}

/// Executor runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutorStats {
    pub jobs_accepted: u64,
    pub jobs_succeeded: u64,
    pub jobs_exhausted: u64,
    pub jobs_aborted: u64,
    pub jobs_panicked: u64,
    pub attempts: u64,
    pub in_flight: usize,
}

#[derive(Debug, Default)]
struct StatsCounters {
    accepted: AtomicU64,
    succeeded: AtomicU64,
    exhausted: AtomicU64,
    aborted: AtomicU64,
    panicked: AtomicU64,
    attempts: AtomicU64,
    in_flight: AtomicUsize,
}

impl StatsCounters {
    fn snapshot(&self) -> ExecutorStats {
        ExecutorStats {
            jobs_accepted: self.accepted.load(Ordering::Relaxed),
            jobs_succeeded: self.succeeded.load(Ordering::Relaxed),
            jobs_exhausted: self.exhausted.load(Ordering::Relaxed),
            jobs_aborted: self.aborted.load(Ordering::Relaxed),
            jobs_panicked: self.panicked.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: &JobOutcome) {
        self.attempts
            .fetch_add(u64::from(outcome.attempts()), Ordering::Relaxed);
        let counter = match outcome {
            JobOutcome::Succeeded { .. } => &self.succeeded,
            JobOutcome::Exhausted { .. } => &self.exhausted,
            JobOutcome::Aborted { .. } => &self.aborted,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug)]
struct Submission {
    request: RequestDescriptor,
    policy: RetryPolicy,
}

/// Async executor: owns the injected ledger and transport.
///
/// Call [`AsyncExecutor::spawn`] from inside a tokio runtime to start the
/// dispatcher and obtain a handle.
pub struct AsyncExecutor<L: ?Sized, T: ?Sized> {
    ledger: Arc<L>,
    transport: Arc<T>,
}

impl<L, T> AsyncExecutor<L, T>
where
    L: JobLedger + ?Sized + 'static,
    T: Transport + ?Sized + 'static,
{
    pub fn new(ledger: Arc<L>, transport: Arc<T>) -> Self {
        Self { ledger, transport }
    }

    /// Start the dispatcher task.
    pub fn spawn(self, config: ExecutorConfig) -> AsyncExecutorHandle {
        let (intake, rx) = mpsc::unbounded_channel::<Submission>();
        let tracker = TaskTracker::new();
        let stats = Arc::new(StatsCounters::default());
        let shutdown = CancellationToken::new();
        let limiter = config.max_in_flight.map(|n| Arc::new(Semaphore::new(n.max(1))));

        let dispatcher = Dispatcher {
            ledger: self.ledger,
            transport: self.transport,
            tracker: tracker.clone(),
            stats: stats.clone(),
            limiter,
        };
        tokio::spawn(dispatcher.run(config.name.clone(), rx, shutdown.clone()));

        AsyncExecutorHandle {
            name: Arc::from(config.name),
            intake,
            default_retry: config.retry,
            tracker,
            stats,
            shutdown,
        }
    }
}

struct Dispatcher<L: ?Sized, T: ?Sized> {
    ledger: Arc<L>,
    transport: Arc<T>,
    tracker: TaskTracker,
    stats: Arc<StatsCounters>,
    limiter: Option<Arc<Semaphore>>,
}

impl<L, T> Dispatcher<L, T>
where
    L: JobLedger + ?Sized + 'static,
    T: Transport + ?Sized + 'static,
{
    async fn run(
        self,
        name: String,
        mut rx: mpsc::UnboundedReceiver<Submission>,
        shutdown: CancellationToken,
    ) {
        info!(executor = %name, "async executor started");

        loop {
            let submission = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = rx.recv() => match next {
                    Some(submission) => submission,
                    None => break,
                },
            };
            self.launch(submission).await;
        }

        // Accepted submissions still run after shutdown.
        rx.close();
        while let Some(submission) = rx.recv().await {
            self.launch(submission).await;
        }
        self.tracker.close();

        info!(executor = %name, "async executor stopped");
    }

    async fn launch(&self, submission: Submission) {
        let permit = match &self.limiter {
            Some(limiter) => limiter.clone().acquire_owned().await.ok(),
            None => None,
        };

        let ledger = self.ledger.clone();
        let transport = self.transport.clone();
        let stats = self.stats.clone();
        let Submission { request, policy } = submission;

        self.tracker.spawn(async move {
            let _permit = permit;
            let code = CorrelationCode::generate();
            let span = tracing::info_span!("async_job", %code);

            async move {
                stats.in_flight.fetch_add(1, Ordering::Relaxed);
                let work = job::run(&*ledger, &*transport, code, &request, policy);
                let outcome = AssertUnwindSafe(work).catch_unwind().await;
                stats.in_flight.fetch_sub(1, Ordering::Relaxed);

                match outcome {
                    Ok(outcome) => {
                        if let JobOutcome::Aborted { stage: LedgerStage::Create, .. } = outcome {
                            error!("job dropped before its execution record existed");
                        }
                        stats.record(&outcome);
                    }
                    Err(panic) => {
                        error!(panic = %panic_message(panic.as_ref()), "async job panicked");
                        stats.panicked.fetch_add(1, Ordering::Relaxed);
                    }
                }
                info!("async execution terminated");
            }
            .instrument(span)
            .await
        });
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Handle to a running executor. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AsyncExecutorHandle {
    name: Arc<str>,
    intake: mpsc::UnboundedSender<Submission>,
    default_retry: RetryPolicy,
    tracker: TaskTracker,
    stats: Arc<StatsCounters>,
    shutdown: CancellationToken,
}

impl AsyncExecutorHandle {
    /// Dispatch with an explicit retry policy. Returns immediately.
    pub fn execute_with_policy(&self, request: RequestDescriptor, policy: RetryPolicy) {
        let endpoint = request.url().to_string();
        match self.intake.send(Submission { request, policy }) {
            Ok(()) => {
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                error!(executor = %self.name, %endpoint, "executor is shut down; request dropped");
            }
        }
    }

    /// Get current executor statistics.
    pub fn stats(&self) -> ExecutorStats {
        self.stats.snapshot()
    }

    /// Stop accepting requests and wait for every accepted job to finish.
    ///
    /// Running jobs are not cancelled; they complete their retry loops.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.wait().await;
    }
}

impl Dispatch for AsyncExecutorHandle {
    fn execute(&self, request: RequestDescriptor, retry_budget: u32) {
        self.execute_with_policy(request, self.default_retry.with_budget(retry_budget));
    }
}
