use serde::Serialize;
use serde_json::Value;

use pathforge_core::{TaskId, TaskRecord, TaskStatus};
use pathforge_infra::jobs::QueueAvailability;

pub const QUEUED_MESSAGE: &str = "Learning path generation started";
pub const FINISHED_MESSAGE: &str = "Learning path generated successfully";
pub const PENDING_MESSAGE: &str = "Task not yet complete";

// -------------------------
// Response DTOs
// -------------------------

/// Body of every `POST /generate` answer that reached a lane.
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub task_id: TaskId,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GenerateResponse {
    pub fn queued(task_id: TaskId) -> Self {
        Self {
            task_id,
            status: TaskStatus::Queued,
            message: Some(QUEUED_MESSAGE),
            result: None,
            error: None,
        }
    }

    pub fn finished(task_id: TaskId, result: Value) -> Self {
        Self {
            task_id,
            status: TaskStatus::Finished,
            message: Some(FINISHED_MESSAGE),
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(task_id: TaskId, error: String) -> Self {
        Self {
            task_id,
            status: TaskStatus::Failed,
            message: None,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub task_id: TaskId,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<TaskRecord> for StatusResponse {
    fn from(record: TaskRecord) -> Self {
        Self {
            status: record.status(),
            result: record.result().cloned(),
            error: record.error().map(str::to_string),
            task_id: record.task_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PendingResponse {
    pub error: &'static str,
    pub status: TaskStatus,
}

impl PendingResponse {
    pub fn new(status: TaskStatus) -> Self {
        Self {
            error: PENDING_MESSAGE,
            status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub queue: QueueAvailability,
}

impl HealthResponse {
    pub fn healthy(queue: QueueAvailability) -> Self {
        Self {
            status: "healthy",
            service: "api",
            queue,
        }
    }
}
