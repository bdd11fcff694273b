//! Redis-backed durable queue.
//!
//! ## Key schema
//!
//! - `pathforge:queue:<name>`: list of pending task ids (LPUSH / BRPOPLPUSH, FIFO)
//! - `pathforge:processing:<name>`: ids claimed by a worker and not yet settled
//! - `pathforge:job:<task_id>`: JSON `{ record, params }`
//!
//! Claiming moves an id atomically from the pending list to the processing
//! list, so a worker that dies mid-claim or mid-job leaves a trace that
//! [`DurableQueue::recover_abandoned`] can settle.
//!
//! Terminal records expire: `finished` after `result_ttl`, `failed` after
//! `failure_ttl`. Queued and processing records never expire.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use pathforge_core::{GenerationParams, TaskId, TaskRecord, TaskState, TaskStatus};

use super::queue::{ABANDONED_ERROR, DurableQueue, QueueError, QueuedJob, StoredJob, is_stale};
use crate::config::{DEFAULT_FAILURE_TTL_SECS, DEFAULT_QUEUE_NAME, DEFAULT_RESULT_TTL_SECS};

const KEY_PREFIX: &str = "pathforge";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisQueueConfig {
    pub url: String,
    pub queue_name: String,
    pub result_ttl: Duration,
    pub failure_ttl: Duration,
}

impl RedisQueueConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
            result_ttl: Duration::from_secs(DEFAULT_RESULT_TTL_SECS),
            failure_ttl: Duration::from_secs(DEFAULT_FAILURE_TTL_SECS),
        }
    }
}

/// Durable queue on a Redis server.
///
/// Connections are opened lazily and dropped after an IO error, so a broker
/// that comes back is picked up on the next call. Blocking claims use their
/// own connection to keep BRPOPLPUSH from stalling other commands.
pub struct RedisJobQueue {
    client: redis::Client,
    list_key: String,
    processing_key: String,
    result_ttl: Duration,
    failure_ttl: Duration,
    conn: Mutex<Option<MultiplexedConnection>>,
    claim_conn: Mutex<Option<MultiplexedConnection>>,
}

impl std::fmt::Debug for RedisJobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisJobQueue")
            .field("list_key", &self.list_key)
            .field("processing_key", &self.processing_key)
            .field("result_ttl", &self.result_ttl)
            .field("failure_ttl", &self.failure_ttl)
            .finish_non_exhaustive()
    }
}

impl RedisJobQueue {
    /// Validate the URL and prepare the client. No connection is made yet.
    pub fn new(config: RedisQueueConfig) -> Result<Self, QueueError> {
        let client =
            redis::Client::open(config.url.as_str()).map_err(|e| QueueError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            list_key: format!("{KEY_PREFIX}:queue:{}", config.queue_name),
            processing_key: format!("{KEY_PREFIX}:processing:{}", config.queue_name),
            result_ttl: config.result_ttl,
            failure_ttl: config.failure_ttl,
            conn: Mutex::new(None),
            claim_conn: Mutex::new(None),
        })
    }

    fn job_key(task_id: &TaskId) -> String {
        format!("{KEY_PREFIX}:job:{task_id}")
    }

    async fn connection(
        &self,
        slot: &Mutex<Option<MultiplexedConnection>>,
    ) -> Result<MultiplexedConnection, QueueError> {
        let mut guard = slot.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self
            .client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Map a command failure, forgetting the cached connection when it is broken.
    async fn command_error(&self, slot: &Mutex<Option<MultiplexedConnection>>, err: redis::RedisError) -> QueueError {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            *slot.lock().await = None;
            QueueError::Connection(err.to_string())
        } else {
            QueueError::Command(err.to_string())
        }
    }

    async fn load(&self, task_id: &TaskId) -> Result<Option<StoredJob>, QueueError> {
        let mut conn = self.connection(&self.conn).await?;
        let raw: Option<String> = match redis::cmd("GET")
            .arg(Self::job_key(task_id))
            .query_async(&mut conn)
            .await
        {
            Ok(raw) => raw,
            Err(e) => return Err(self.command_error(&self.conn, e).await),
        };
        raw.map(|raw| serde_json::from_str(&raw).map_err(|e| QueueError::Serialization(e.to_string())))
            .transpose()
    }

    /// Overwrite a job that is still queued or processing.
    async fn save(&self, job: &StoredJob) -> Result<(), QueueError> {
        let payload = serde_json::to_string(job).map_err(|e| QueueError::Serialization(e.to_string()))?;
        let mut conn = self.connection(&self.conn).await?;
        match redis::cmd("SET")
            .arg(Self::job_key(&job.record.task_id))
            .arg(payload)
            .query_async::<_, ()>(&mut conn)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => Err(self.command_error(&self.conn, e).await),
        }
    }

    fn ttl_for(&self, status: TaskStatus) -> Option<Duration> {
        match status {
            TaskStatus::Finished => Some(self.result_ttl),
            TaskStatus::Failed => Some(self.failure_ttl),
            TaskStatus::Queued | TaskStatus::Processing => None,
        }
    }

    /// Store a terminal record and drop its id from the processing list in one step.
    async fn settle(&self, job: &StoredJob) -> Result<(), QueueError> {
        let payload = serde_json::to_string(job).map_err(|e| QueueError::Serialization(e.to_string()))?;
        let task_id = &job.record.task_id;
        let mut set = redis::cmd("SET");
        set.arg(Self::job_key(task_id)).arg(payload);
        if let Some(ttl) = self.ttl_for(job.record.status()) {
            set.arg("EX").arg(ttl.as_secs().max(1));
        }

        let mut conn = self.connection(&self.conn).await?;
        let settled = redis::pipe()
            .atomic()
            .add_command(set)
            .ignore()
            .cmd("LREM")
            .arg(&self.processing_key)
            .arg(0)
            .arg(task_id.as_str())
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await;
        match settled {
            Ok(()) => Ok(()),
            Err(e) => Err(self.command_error(&self.conn, e).await),
        }
    }

    /// Forget a claimed id that has nothing left to run.
    async fn release(&self, task_id: &TaskId) -> Result<(), QueueError> {
        let mut conn = self.connection(&self.conn).await?;
        match redis::cmd("LREM")
            .arg(&self.processing_key)
            .arg(0)
            .arg(task_id.as_str())
            .query_async::<_, ()>(&mut conn)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => Err(self.command_error(&self.conn, e).await),
        }
    }

    /// Put a claimed but never started id back at the head of the pending list.
    async fn requeue(&self, task_id: &TaskId) -> Result<(), QueueError> {
        let mut conn = self.connection(&self.conn).await?;
        let moved = redis::pipe()
            .atomic()
            .cmd("LREM")
            .arg(&self.processing_key)
            .arg(0)
            .arg(task_id.as_str())
            .ignore()
            .cmd("RPUSH")
            .arg(&self.list_key)
            .arg(task_id.as_str())
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await;
        match moved {
            Ok(()) => Ok(()),
            Err(e) => Err(self.command_error(&self.conn, e).await),
        }
    }
}

#[async_trait]
impl DurableQueue for RedisJobQueue {
    async fn ping(&self) -> Result<(), QueueError> {
        let mut conn = self.connection(&self.conn).await?;
        match redis::cmd("PING").query_async::<_, String>(&mut conn).await {
            Ok(_) => Ok(()),
            Err(e) => Err(self.command_error(&self.conn, e).await),
        }
    }

    #[instrument(skip(self, params), fields(list_key = %self.list_key), err)]
    async fn enqueue(&self, params: &GenerationParams) -> Result<TaskId, QueueError> {
        let task_id = TaskId::new();
        let job = StoredJob {
            record: TaskRecord::queued(task_id.clone()),
            params: params.clone(),
        };
        let payload = serde_json::to_string(&job).map_err(|e| QueueError::Serialization(e.to_string()))?;

        let mut conn = self.connection(&self.conn).await?;
        let pushed = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(Self::job_key(&task_id))
            .arg(payload)
            .ignore()
            .cmd("LPUSH")
            .arg(&self.list_key)
            .arg(task_id.as_str())
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await;
        if let Err(e) = pushed {
            return Err(self.command_error(&self.conn, e).await);
        }

        debug!(task_id = %task_id, "job enqueued");
        Ok(task_id)
    }

    async fn fetch(&self, task_id: &TaskId) -> Result<Option<TaskRecord>, QueueError> {
        Ok(self.load(task_id).await?.map(|job| job.record))
    }

    async fn claim(&self, timeout: Duration) -> Result<Option<QueuedJob>, QueueError> {
        let mut conn = self.connection(&self.claim_conn).await?;
        let moved: Option<String> = match redis::cmd("BRPOPLPUSH")
            .arg(&self.list_key)
            .arg(&self.processing_key)
            .arg(timeout.as_secs().max(1))
            .query_async(&mut conn)
            .await
        {
            Ok(moved) => moved,
            Err(e) => return Err(self.command_error(&self.claim_conn, e).await),
        };
        let Some(raw_id) = moved else {
            return Ok(None);
        };

        // From here on the id sits in the processing list; errors leave it
        // there for recovery.
        let task_id = TaskId::from(raw_id);
        let Some(mut job) = self.load(&task_id).await? else {
            warn!(task_id = %task_id, "claimed id has no job record, skipping");
            self.release(&task_id).await?;
            return Ok(None);
        };
        if let Err(e) = job.record.start() {
            warn!(task_id = %task_id, error = %e, "claimed job is not pending, skipping");
            self.release(&task_id).await?;
            return Ok(None);
        }
        self.save(&job).await?;

        Ok(Some(QueuedJob {
            task_id,
            params: job.params,
        }))
    }

    #[instrument(skip(self, task_id, outcome), fields(task_id = %task_id), err)]
    async fn complete(&self, task_id: &TaskId, outcome: TaskState) -> Result<(), QueueError> {
        let mut job = self
            .load(task_id)
            .await?
            .ok_or_else(|| QueueError::UnknownJob(task_id.clone()))?;
        job.record.transition(outcome)?;
        self.settle(&job).await
    }

    async fn recover_abandoned(&self, stale_after: Duration) -> Result<usize, QueueError> {
        let mut conn = self.connection(&self.conn).await?;
        let claimed: Vec<String> = match redis::cmd("LRANGE")
            .arg(&self.processing_key)
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await
        {
            Ok(claimed) => claimed,
            Err(e) => return Err(self.command_error(&self.conn, e).await),
        };

        let mut recovered = 0;
        for raw_id in claimed {
            let task_id = TaskId::from(raw_id);
            let Some(mut job) = self.load(&task_id).await? else {
                self.release(&task_id).await?;
                continue;
            };
            match job.record.status() {
                TaskStatus::Finished | TaskStatus::Failed => self.release(&task_id).await?,
                TaskStatus::Queued if is_stale(&job.record, stale_after) => {
                    info!(task_id = %task_id, "requeueing job whose claim never started");
                    self.requeue(&task_id).await?;
                    recovered += 1;
                }
                TaskStatus::Processing if is_stale(&job.record, stale_after) => {
                    warn!(task_id = %task_id, "failing job abandoned by its worker");
                    job.record.fail(ABANDONED_ERROR)?;
                    self.settle(&job).await?;
                    recovered += 1;
                }
                TaskStatus::Queued | TaskStatus::Processing => {}
            }
        }
        Ok(recovered)
    }
}
