//! Task orchestration: storage, queueing, dispatch and status lookups.
//!
//! ## Design
//!
//! - Two execution lanes share one status vocabulary (`queued`, `processing`,
//!   `finished`, `failed`)
//! - The durable lane hands jobs to a broker and a separate worker runs them
//! - The inline lane runs the executor in-request and records the outcome in
//!   the Job Store
//! - Status and result reads consult the Job Store first, then the broker
//!
//! ## Components
//!
//! - `JobStore`: task records of the inline lane
//! - `DurableQueue`: broker abstraction (`InMemoryQueue`, `RedisJobQueue`)
//! - `Dispatcher`: lane selection with queue health tracking
//! - `TaskQueries`: read-only status/result lookups
//! - `QueueWorker`: drains the durable queue

pub mod dispatch;
pub mod execution;
pub mod queue;
#[cfg(feature = "redis")]
pub mod redis_queue;
pub mod status;
pub mod store;
pub mod worker;

pub use dispatch::{
    DispatchError, DispatchOutcome, Dispatcher, DurableQueueLane, InlineLane, Lane, QueueAvailability,
};
pub use execution::run_task;
pub use queue::{ABANDONED_ERROR, DurableQueue, InMemoryQueue, QueueError, QueuedJob};
#[cfg(feature = "redis")]
pub use redis_queue::{RedisJobQueue, RedisQueueConfig};
pub use status::{QueryError, ResultView, TaskQueries};
pub use store::{InMemoryJobStore, JobStore, JobStoreError, RetentionPolicy};
pub use worker::{QueueWorker, QueueWorkerConfig, QueueWorkerHandle, WorkerStats};
