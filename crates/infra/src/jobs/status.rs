//! Read-only status and result lookups across both lanes.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use pathforge_core::{TaskId, TaskRecord, TaskState, TaskStatus};

use super::queue::{DurableQueue, QueueError};
use super::store::{JobStore, JobStoreError};

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Task not found")]
    NotFound(TaskId),

    #[error(transparent)]
    Store(#[from] JobStoreError),

    /// The broker could not be asked, so the task may well exist.
    #[error("task queue unavailable: {0}")]
    Unavailable(#[source] QueueError),
}

/// Answer to a result request.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultView {
    Ready(Value),
    Pending(TaskStatus),
    Failed(String),
}

/// Looks a task up in the Job Store first, then in the durable queue.
///
/// A task is only reported missing when both stores answered; a broker that
/// cannot be reached is an error of its own.
///
/// Lookups never modify anything, so repeated calls give the same answer
/// until the task itself moves on.
pub struct TaskQueries {
    store: Arc<dyn JobStore>,
    queue: Option<Arc<dyn DurableQueue>>,
}

impl TaskQueries {
    pub fn new(store: Arc<dyn JobStore>, queue: Option<Arc<dyn DurableQueue>>) -> Self {
        Self { store, queue }
    }

    pub async fn status(&self, task_id: &TaskId) -> Result<TaskRecord, QueryError> {
        if let Some(record) = self.store.get(task_id)? {
            return Ok(record);
        }
        if let Some(queue) = &self.queue {
            match queue.fetch(task_id).await {
                Ok(Some(record)) => return Ok(record),
                Ok(None) => {}
                Err(e) => {
                    warn!(task_id = %task_id, error = %e, "queue lookup failed");
                    return Err(QueryError::Unavailable(e));
                }
            }
        }
        Err(QueryError::NotFound(task_id.clone()))
    }

    pub async fn result(&self, task_id: &TaskId) -> Result<ResultView, QueryError> {
        let record = self.status(task_id).await?;
        Ok(match record.state() {
            TaskState::Finished { result } => ResultView::Ready(result.clone()),
            TaskState::Failed { error } => ResultView::Failed(error.clone()),
            TaskState::Queued | TaskState::Processing => ResultView::Pending(record.status()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::execution::testing::params;
    use crate::jobs::queue::InMemoryQueue;
    use crate::jobs::store::InMemoryJobStore;
    use serde_json::json;
    use std::time::Duration;

    fn setup() -> (Arc<InMemoryJobStore>, Arc<InMemoryQueue>, TaskQueries) {
        let store = InMemoryJobStore::arc();
        let queue = Arc::new(InMemoryQueue::new());
        let queries = TaskQueries::new(store.clone(), Some(queue.clone()));
        (store, queue, queries)
    }

    #[tokio::test]
    async fn unknown_id_is_not_found_in_either_store() {
        let (_, _, queries) = setup();
        let id = TaskId::from("never-issued");
        assert!(matches!(queries.status(&id).await, Err(QueryError::NotFound(_))));
        assert!(matches!(queries.result(&id).await, Err(QueryError::NotFound(_))));
    }

    #[tokio::test]
    async fn job_store_records_are_answered_first() {
        let (store, _, queries) = setup();
        let mut record = TaskRecord::processing(TaskId::from("inline-1"));
        store.put(record.clone()).unwrap();

        assert_eq!(
            queries.result(&record.task_id).await.unwrap(),
            ResultView::Pending(TaskStatus::Processing)
        );

        record.finish(json!({ "topic": "Python" })).unwrap();
        store.put(record.clone()).unwrap();
        assert_eq!(
            queries.result(&record.task_id).await.unwrap(),
            ResultView::Ready(json!({ "topic": "Python" }))
        );
    }

    #[tokio::test]
    async fn queue_records_follow_the_job_lifecycle() {
        let (_, queue, queries) = setup();
        let id = queue.enqueue(&params("Go")).await.unwrap();
        assert_eq!(queries.status(&id).await.unwrap().status(), TaskStatus::Queued);
        assert_eq!(
            queries.result(&id).await.unwrap(),
            ResultView::Pending(TaskStatus::Queued)
        );

        queue.claim(Duration::from_millis(10)).await.unwrap();
        queue.complete(&id, TaskState::failed("model refused")).await.unwrap();
        assert_eq!(
            queries.result(&id).await.unwrap(),
            ResultView::Failed("model refused".to_string())
        );
    }

    #[tokio::test]
    async fn repeated_status_calls_are_identical() {
        let (store, _, queries) = setup();
        let mut record = TaskRecord::processing(TaskId::from("t"));
        record.fail("boom").unwrap();
        store.put(record.clone()).unwrap();

        let first = queries.status(&record.task_id).await.unwrap();
        let second = queries.status(&record.task_id).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, record);
    }

    #[tokio::test]
    async fn queue_outage_is_not_reported_as_missing_task() {
        let (store, queue, queries) = setup();
        let id = queue.enqueue(&params("Go")).await.unwrap();
        queue.set_available(false);

        assert!(matches!(
            queries.status(&id).await,
            Err(QueryError::Unavailable(QueueError::Connection(_)))
        ));
        assert!(matches!(queries.result(&id).await, Err(QueryError::Unavailable(_))));

        // Job Store hits never reach the broker.
        let record = TaskRecord::processing(TaskId::from("inline-2"));
        store.put(record.clone()).unwrap();
        assert_eq!(queries.status(&record.task_id).await.unwrap(), record);

        queue.set_available(true);
        assert_eq!(queries.status(&id).await.unwrap().status(), TaskStatus::Queued);
    }
}
