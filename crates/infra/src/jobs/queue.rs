//! Durable queue abstraction (the broker side of the queued lane).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};

use pathforge_core::{GenerationParams, TaskId, TaskRecord, TaskState, TaskStatus, TransitionError};

/// Error recorded on a job whose worker never reported an outcome.
pub const ABANDONED_ERROR: &str = "worker stopped before reporting an outcome";

/// Whether a claim has sat in `processing` for at least `stale_after`.
pub(crate) fn is_stale(record: &TaskRecord, stale_after: Duration) -> bool {
    (Utc::now() - record.updated_at).to_std().unwrap_or_default() >= stale_after
}

/// A job handed to a worker by [`DurableQueue::claim`].
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedJob {
    pub task_id: TaskId,
    pub params: GenerationParams,
}

/// What the queue keeps per job: its public record plus the input to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredJob {
    pub record: TaskRecord,
    pub params: GenerationParams,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum QueueError {
    #[error("queue connection error: {0}")]
    Connection(String),

    #[error("queue command error: {0}")]
    Command(String),

    #[error("queue serialization error: {0}")]
    Serialization(String),

    #[error("unknown queued job: {0}")]
    UnknownJob(TaskId),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Broker holding queued jobs and their state.
///
/// The queue assigns task ids, owns the record of every job it accepted and
/// is the only place a worker reports outcomes to.
#[async_trait]
pub trait DurableQueue: Send + Sync {
    /// Cheap reachability check.
    async fn ping(&self) -> Result<(), QueueError>;

    /// Accept a job; the returned id is in state `queued`.
    async fn enqueue(&self, params: &GenerationParams) -> Result<TaskId, QueueError>;

    /// Record of a job this queue accepted, if it still has it.
    async fn fetch(&self, task_id: &TaskId) -> Result<Option<TaskRecord>, QueueError>;

    /// Take the oldest pending job and mark it `processing`, waiting up to
    /// `timeout` for one to arrive.
    async fn claim(&self, timeout: Duration) -> Result<Option<QueuedJob>, QueueError>;

    /// Store the terminal outcome of a claimed job.
    async fn complete(&self, task_id: &TaskId, outcome: TaskState) -> Result<(), QueueError>;

    /// Settle claims nobody will finish: jobs `processing` for at least
    /// `stale_after` are failed with [`ABANDONED_ERROR`], and ids taken off
    /// the pending list but never started go back on it. Returns how many
    /// jobs were touched.
    async fn recover_abandoned(&self, stale_after: Duration) -> Result<usize, QueueError>;
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<TaskId>,
    jobs: HashMap<TaskId, StoredJob>,
}

/// In-process queue with the same semantics as the Redis one.
///
/// Used by tests and single-binary setups; [`InMemoryQueue::set_available`]
/// simulates a broker outage.
#[derive(Debug)]
pub struct InMemoryQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    available: AtomicBool,
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    fn ensure_available(&self) -> Result<(), QueueError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(QueueError::Connection("queue unavailable".to_string()))
        }
    }

    async fn try_claim(&self) -> Result<Option<QueuedJob>, QueueError> {
        let mut state = self.state.lock().await;
        while let Some(task_id) = state.pending.pop_front() {
            let Some(job) = state.jobs.get_mut(&task_id) else {
                continue;
            };
            if job.record.start().is_err() {
                continue;
            }
            return Ok(Some(QueuedJob {
                task_id,
                params: job.params.clone(),
            }));
        }
        Ok(None)
    }
}

#[async_trait]
impl DurableQueue for InMemoryQueue {
    async fn ping(&self) -> Result<(), QueueError> {
        self.ensure_available()
    }

    async fn enqueue(&self, params: &GenerationParams) -> Result<TaskId, QueueError> {
        self.ensure_available()?;
        let task_id = TaskId::new();
        {
            let mut state = self.state.lock().await;
            state.jobs.insert(
                task_id.clone(),
                StoredJob {
                    record: TaskRecord::queued(task_id.clone()),
                    params: params.clone(),
                },
            );
            state.pending.push_back(task_id.clone());
        }
        self.notify.notify_one();
        Ok(task_id)
    }

    async fn fetch(&self, task_id: &TaskId) -> Result<Option<TaskRecord>, QueueError> {
        self.ensure_available()?;
        let state = self.state.lock().await;
        Ok(state.jobs.get(task_id).map(|job| job.record.clone()))
    }

    async fn claim(&self, timeout: Duration) -> Result<Option<QueuedJob>, QueueError> {
        self.ensure_available()?;
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(job) = self.try_claim().await? {
                return Ok(Some(job));
            }
            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                return self.try_claim().await;
            }
        }
    }

    async fn complete(&self, task_id: &TaskId, outcome: TaskState) -> Result<(), QueueError> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;
        let job = state
            .jobs
            .get_mut(task_id)
            .ok_or_else(|| QueueError::UnknownJob(task_id.clone()))?;
        job.record.transition(outcome)?;
        Ok(())
    }

    async fn recover_abandoned(&self, stale_after: Duration) -> Result<usize, QueueError> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;
        let mut recovered = 0;
        for job in state.jobs.values_mut() {
            if job.record.status() == TaskStatus::Processing && is_stale(&job.record, stale_after) {
                job.record.fail(ABANDONED_ERROR)?;
                recovered += 1;
            }
        }
        Ok(recovered)
    }
}
