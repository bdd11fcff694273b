//! Dispatch layer: chooses an execution lane per request.
//!
//! ## Lanes
//!
//! - [`DurableQueueLane`]: hand the job to the broker and return at once
//!   (`queued`). A worker process executes it later.
//! - [`InlineLane`]: run the executor inside the request and record the
//!   outcome in the Job Store.
//!
//! The durable lane is used while it is healthy. An enqueue failure marks it
//! down for a back-off window and the request falls through to the inline lane;
//! queue failures are never surfaced to callers. After the window the lane is
//! re-probed with a ping before it is trusted again.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use pathforge_ai::TaskExecutor;
use pathforge_core::{GenerationParams, TaskId, TaskRecord, TaskState, TransitionError};

use super::execution::run_task;
use super::queue::{DurableQueue, QueueError};
use super::store::{JobStore, JobStoreError};

pub const DEFAULT_REPROBE_AFTER: Duration = Duration::from_secs(30);

/// What the caller gets back from a dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Queued { task_id: TaskId },
    Finished { task_id: TaskId, result: Value },
    Failed { task_id: TaskId, error: String },
}

impl DispatchOutcome {
    pub fn task_id(&self) -> &TaskId {
        match self {
            DispatchOutcome::Queued { task_id }
            | DispatchOutcome::Finished { task_id, .. }
            | DispatchOutcome::Failed { task_id, .. } => task_id,
        }
    }

    fn from_record(record: TaskRecord) -> Self {
        let task_id = record.task_id.clone();
        match record.state().clone() {
            TaskState::Finished { result } => DispatchOutcome::Finished { task_id, result },
            TaskState::Failed { error } => DispatchOutcome::Failed { task_id, error },
            TaskState::Queued | TaskState::Processing => DispatchOutcome::Queued { task_id },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Store(#[from] JobStoreError),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// One way of getting a task executed.
#[async_trait]
pub trait Lane: Send + Sync {
    fn name(&self) -> &'static str;

    async fn submit(&self, params: GenerationParams) -> Result<DispatchOutcome, DispatchError>;

    /// Whether the lane can currently accept work.
    async fn probe(&self) -> bool {
        true
    }
}

/// Enqueue on the durable broker; never waits for execution.
pub struct DurableQueueLane {
    queue: Arc<dyn DurableQueue>,
}

impl DurableQueueLane {
    pub fn new(queue: Arc<dyn DurableQueue>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl Lane for DurableQueueLane {
    fn name(&self) -> &'static str {
        "queue"
    }

    async fn submit(&self, params: GenerationParams) -> Result<DispatchOutcome, DispatchError> {
        let task_id = self.queue.enqueue(&params).await?;
        info!(task_id = %task_id, lane = self.name(), topic = %params.topic, "task queued");
        Ok(DispatchOutcome::Queued { task_id })
    }

    async fn probe(&self) -> bool {
        match self.queue.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "durable queue probe failed");
                false
            }
        }
    }
}

/// Execute within the request and keep the outcome in the Job Store.
pub struct InlineLane {
    store: Arc<dyn JobStore>,
    executor: Arc<dyn TaskExecutor>,
    deadline: Option<Duration>,
}

impl InlineLane {
    pub fn new(store: Arc<dyn JobStore>, executor: Arc<dyn TaskExecutor>) -> Self {
        Self {
            store,
            executor,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }
}

#[async_trait]
impl Lane for InlineLane {
    fn name(&self) -> &'static str {
        "inline"
    }

    async fn submit(&self, params: GenerationParams) -> Result<DispatchOutcome, DispatchError> {
        let mut record = TaskRecord::processing(TaskId::new());
        self.store.put(record.clone())?;
        info!(task_id = %record.task_id, lane = self.name(), topic = %params.topic, "executing task inline");

        let outcome = run_task(self.executor.clone(), params, self.deadline).await;
        record.transition(outcome)?;
        // The outcome is still returned when it cannot be stored; later
        // lookups then see the task as `processing`.
        if let Err(e) = self.store.put(record.clone()) {
            error!(task_id = %record.task_id, lane = self.name(), error = %e, "failed to store task outcome");
        }

        match record.error() {
            Some(error) => warn!(task_id = %record.task_id, lane = self.name(), error, "task failed"),
            None => info!(task_id = %record.task_id, lane = self.name(), "task finished"),
        }
        Ok(DispatchOutcome::from_record(record))
    }
}

/// Reachability of the durable lane as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueAvailability {
    Available,
    Unavailable,
    Disabled,
}

impl QueueAvailability {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueAvailability::Available => "available",
            QueueAvailability::Unavailable => "unavailable",
            QueueAvailability::Disabled => "disabled",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Health {
    Up,
    Down { since: Instant },
}

/// Picks a lane per request and tracks whether the durable lane is usable.
pub struct Dispatcher {
    durable: Option<Arc<dyn Lane>>,
    inline: Arc<dyn Lane>,
    health: Mutex<Health>,
    reprobe_after: Duration,
}

impl Dispatcher {
    pub fn new(durable: Option<Arc<dyn Lane>>, inline: Arc<dyn Lane>) -> Self {
        Self {
            durable,
            inline,
            health: Mutex::new(Health::Up),
            reprobe_after: DEFAULT_REPROBE_AFTER,
        }
    }

    /// A dispatcher that always executes inline.
    pub fn inline_only(inline: Arc<dyn Lane>) -> Self {
        Self::new(None, inline)
    }

    pub fn with_reprobe_after(mut self, reprobe_after: Duration) -> Self {
        self.reprobe_after = reprobe_after;
        self
    }

    /// Probe the durable lane now and record the answer. Called once at startup.
    pub async fn probe(&self) -> QueueAvailability {
        let Some(durable) = &self.durable else {
            return QueueAvailability::Disabled;
        };
        if durable.probe().await {
            self.set_health(Health::Up);
            QueueAvailability::Available
        } else {
            self.set_health(Health::Down { since: Instant::now() });
            QueueAvailability::Unavailable
        }
    }

    pub fn availability(&self) -> QueueAvailability {
        match (&self.durable, self.health()) {
            (None, _) => QueueAvailability::Disabled,
            (Some(_), Health::Up) => QueueAvailability::Available,
            (Some(_), Health::Down { .. }) => QueueAvailability::Unavailable,
        }
    }

    /// Submit `params` to the first lane that accepts them.
    ///
    /// Validation has already happened; every call ends in exactly one record.
    pub async fn dispatch(&self, params: GenerationParams) -> Result<DispatchOutcome, DispatchError> {
        if let Some(durable) = &self.durable {
            if self.durable_ready(durable.as_ref()).await {
                match durable.submit(params.clone()).await {
                    Ok(outcome) => return Ok(outcome),
                    Err(e) => {
                        warn!(
                            lane = durable.name(),
                            error = %e,
                            reprobe_after_secs = self.reprobe_after.as_secs(),
                            "durable lane failed, falling back to inline execution"
                        );
                        self.set_health(Health::Down { since: Instant::now() });
                    }
                }
            }
        }
        self.inline.submit(params).await
    }

    async fn durable_ready(&self, durable: &dyn Lane) -> bool {
        match self.health() {
            Health::Up => true,
            Health::Down { since } if since.elapsed() < self.reprobe_after => false,
            Health::Down { .. } => {
                let up = durable.probe().await;
                if up {
                    info!(lane = durable.name(), "durable lane is reachable again");
                    self.set_health(Health::Up);
                } else {
                    self.set_health(Health::Down { since: Instant::now() });
                }
                up
            }
        }
    }

    fn health(&self) -> Health {
        *self.health.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_health(&self, health: Health) {
        *self.health.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = health;
    }
}
