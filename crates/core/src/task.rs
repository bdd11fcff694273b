//! Task record and its lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::id::TaskId;

/// Uniform status vocabulary shared by both execution lanes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Accepted by the durable queue, not yet picked up
    Queued,
    /// Executor is running
    Processing,
    /// Completed with a result
    Finished,
    /// Completed with an error
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Finished | TaskStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::Finished => "finished",
            TaskStatus::Failed => "failed",
        }
    }

    /// Position in the lifecycle; transitions only move forward.
    fn rank(&self) -> u8 {
        match self {
            TaskStatus::Queued => 0,
            TaskStatus::Processing => 1,
            TaskStatus::Finished | TaskStatus::Failed => 2,
        }
    }
}

impl core::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status together with its payload.
///
/// A result exists only when finished and an error only when failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Processing,
    Finished { result: Value },
    Failed { error: String },
}

impl TaskState {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskState::Queued => TaskStatus::Queued,
            TaskState::Processing => TaskStatus::Processing,
            TaskState::Finished { .. } => TaskStatus::Finished,
            TaskState::Failed { .. } => TaskStatus::Failed,
        }
    }

    pub fn finished(result: Value) -> Self {
        Self::Finished { result }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("task {task_id}: illegal transition {from} -> {to}")]
pub struct TransitionError {
    pub task_id: TaskId,
    pub from: TaskStatus,
    pub to: TaskStatus,
}

/// Observable state of one task.
///
/// Serializes as `{ "task_id", "status", "result"?, "error"?, "created_at", "updated_at" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: TaskId,
    #[serde(flatten)]
    state: TaskState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn new(task_id: TaskId, state: TaskState) -> Self {
        let now = Utc::now();
        Self {
            task_id,
            state,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record for a job accepted by the durable queue.
    pub fn queued(task_id: TaskId) -> Self {
        Self::new(task_id, TaskState::Queued)
    }

    /// Record for a job the inline lane is about to run.
    pub fn processing(task_id: TaskId) -> Self {
        Self::new(task_id, TaskState::Processing)
    }

    pub fn state(&self) -> &TaskState {
        &self.state
    }

    pub fn status(&self) -> TaskStatus {
        self.state.status()
    }

    pub fn result(&self) -> Option<&Value> {
        match &self.state {
            TaskState::Finished { result } => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            TaskState::Failed { error } => Some(error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Move to `next`, rejecting backwards moves and anything out of a terminal state.
    ///
    /// On error the record is left untouched.
    pub fn transition(&mut self, next: TaskState) -> Result<(), TransitionError> {
        let from = self.status();
        let to = next.status();
        if from.is_terminal() || to.rank() <= from.rank() {
            return Err(TransitionError {
                task_id: self.task_id.clone(),
                from,
                to,
            });
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.transition(TaskState::Processing)
    }

    pub fn finish(&mut self, result: Value) -> Result<(), TransitionError> {
        self.transition(TaskState::finished(result))
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(TaskState::failed(error))
    }
}
