//! Queue worker: drains the durable queue and runs the executor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use pathforge_ai::TaskExecutor;
use pathforge_core::{TaskId, TaskState, TaskStatus};

use super::execution::run_task;
use super::queue::{DurableQueue, QueueError};

#[derive(Debug, Clone)]
pub struct QueueWorkerConfig {
    /// Name for logging
    pub name: String,
    /// How long one claim blocks waiting for a job
    pub poll_timeout: Duration,
    /// Pause after a queue error before trying again; doubles per consecutive error
    pub retry_interval: Duration,
    /// Optional executor deadline
    pub execution_timeout: Option<Duration>,
    /// Claims left `processing` this long are failed; `None` disables recovery
    pub abandoned_after: Option<Duration>,
    /// How often to look for abandoned claims
    pub recovery_interval: Duration,
}

/// Cap on the back-off between retries after queue errors.
pub const MAX_RETRY_INTERVAL: Duration = Duration::from_secs(30);

impl Default for QueueWorkerConfig {
    fn default() -> Self {
        Self {
            name: "queue-worker".to_string(),
            poll_timeout: Duration::from_secs(1),
            retry_interval: Duration::from_secs(1),
            execution_timeout: None,
            abandoned_after: Some(Duration::from_secs(60 * 60)),
            recovery_interval: Duration::from_secs(60),
        }
    }
}

impl QueueWorkerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    pub fn with_execution_timeout(mut self, execution_timeout: Option<Duration>) -> Self {
        self.execution_timeout = execution_timeout;
        self
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub fn with_recovery(mut self, abandoned_after: Option<Duration>, recovery_interval: Duration) -> Self {
        self.abandoned_after = abandoned_after;
        self.recovery_interval = recovery_interval;
        self
    }

    fn backoff(&self, consecutive_errors: u32) -> Duration {
        self.retry_interval
            .saturating_mul(1 << consecutive_errors.min(16))
            .min(MAX_RETRY_INTERVAL.max(self.retry_interval))
    }
}

/// Worker runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub uptime_secs: u64,
}

#[derive(Debug)]
struct Counters {
    processed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    started: Instant,
}

impl Counters {
    fn new() -> Self {
        Self {
            processed: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    fn record(&self, status: TaskStatus) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        match status {
            TaskStatus::Finished => self.succeeded.fetch_add(1, Ordering::Relaxed),
            _ => self.failed.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn snapshot(&self) -> WorkerStats {
        WorkerStats {
            processed: self.processed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            uptime_secs: self.started.elapsed().as_secs(),
        }
    }
}

/// Handle to control a running worker.
#[derive(Debug)]
pub struct QueueWorkerHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
    counters: Arc<Counters>,
}

impl QueueWorkerHandle {
    /// Request graceful shutdown and wait for the job in flight to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.join.await {
            error!(error = %e, "queue worker task ended abnormally");
        }
    }

    pub fn stats(&self) -> WorkerStats {
        self.counters.snapshot()
    }
}

/// Pulls jobs from a [`DurableQueue`] one at a time.
///
/// An outcome the queue could not store is kept and handed over again before
/// the next claim, so a broker outage delays a result but never loses it.
pub struct QueueWorker {
    queue: Arc<dyn DurableQueue>,
    executor: Arc<dyn TaskExecutor>,
    config: QueueWorkerConfig,
    unreported: Mutex<Option<(TaskId, TaskState)>>,
}

impl QueueWorker {
    pub fn new(queue: Arc<dyn DurableQueue>, executor: Arc<dyn TaskExecutor>, config: QueueWorkerConfig) -> Self {
        Self {
            queue,
            executor,
            config,
            unreported: Mutex::new(None),
        }
    }

    /// Spawn the worker loop on the current runtime.
    pub fn spawn(self) -> QueueWorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let counters = Arc::new(Counters::new());
        let join = tokio::spawn(self.run(shutdown_rx, counters.clone()));
        QueueWorkerHandle {
            shutdown: shutdown_tx,
            join,
            counters,
        }
    }

    /// Claim and execute at most one job. Returns the recorded status, if a job ran.
    ///
    /// A held back outcome is reported first; while that keeps failing no
    /// new job is claimed.
    pub async fn process_next(&self) -> Result<Option<TaskStatus>, QueueError> {
        if let Some(status) = self.report_unreported().await? {
            return Ok(Some(status));
        }

        let Some(job) = self.queue.claim(self.config.poll_timeout).await? else {
            return Ok(None);
        };
        info!(worker = %self.config.name, task_id = %job.task_id, topic = %job.params.topic, "processing queued task");

        let outcome = run_task(self.executor.clone(), job.params, self.config.execution_timeout).await;
        if let TaskState::Failed { error } = &outcome {
            warn!(worker = %self.config.name, task_id = %job.task_id, error = %error, "queued task failed");
        }
        self.report(job.task_id, outcome).await.map(Some)
    }

    /// Hand an outcome to the queue, holding it back when the broker is unreachable.
    async fn report(&self, task_id: TaskId, outcome: TaskState) -> Result<TaskStatus, QueueError> {
        let status = outcome.status();
        match self.queue.complete(&task_id, outcome.clone()).await {
            Ok(()) => {
                debug!(worker = %self.config.name, task_id = %task_id, status = %status, "queued task completed");
                Ok(status)
            }
            Err(e @ (QueueError::Connection(_) | QueueError::Command(_))) => {
                warn!(worker = %self.config.name, task_id = %task_id, error = %e, "could not report outcome, holding it for retry");
                *self.unreported_slot() = Some((task_id, outcome));
                Err(e)
            }
            Err(e) => {
                error!(worker = %self.config.name, task_id = %task_id, error = %e, "queue rejected outcome, dropping it");
                Err(e)
            }
        }
    }

    async fn report_unreported(&self) -> Result<Option<TaskStatus>, QueueError> {
        let held = self.unreported_slot().take();
        let Some((task_id, outcome)) = held else {
            return Ok(None);
        };
        debug!(worker = %self.config.name, task_id = %task_id, "retrying held back outcome");
        self.report(task_id, outcome).await.map(Some)
    }

    fn unreported_slot(&self) -> MutexGuard<'_, Option<(TaskId, TaskState)>> {
        self.unreported.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn recover_abandoned(&self, stale_after: Duration) {
        match self.queue.recover_abandoned(stale_after).await {
            Ok(0) => {}
            Ok(recovered) => warn!(worker = %self.config.name, recovered, "settled abandoned claims"),
            Err(e) => warn!(worker = %self.config.name, error = %e, "abandoned-claim recovery failed"),
        }
    }

    // Shutdown is only observed between claims: each claim is bounded by
    // `poll_timeout`, and a claimed job always runs to completion.
    async fn run(self, mut shutdown: watch::Receiver<bool>, counters: Arc<Counters>) {
        info!(worker = %self.config.name, "queue worker started");
        let mut consecutive_errors = 0u32;
        let mut next_recovery = Instant::now();

        loop {
            let stop = *shutdown.borrow();
            if stop {
                break;
            }
            if let Some(stale_after) = self.config.abandoned_after {
                if Instant::now() >= next_recovery {
                    self.recover_abandoned(stale_after).await;
                    next_recovery = Instant::now() + self.config.recovery_interval;
                }
            }
            match self.process_next().await {
                Ok(status) => {
                    consecutive_errors = 0;
                    if let Some(status) = status {
                        counters.record(status);
                    }
                }
                Err(e) => {
                    let delay = self.config.backoff(consecutive_errors);
                    consecutive_errors = consecutive_errors.saturating_add(1);
                    error!(worker = %self.config.name, error = %e, retry_in_ms = delay.as_millis() as u64, "queue worker iteration failed");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
        }

        match self.report_unreported().await {
            Ok(Some(status)) => counters.record(status),
            Ok(None) => {}
            Err(e) => error!(
                worker = %self.config.name,
                error = %e,
                "outcome still unreported at shutdown; recovery will fail the job"
            ),
        }

        info!(worker = %self.config.name, stats = ?counters.snapshot(), "queue worker stopped");
    }
}
