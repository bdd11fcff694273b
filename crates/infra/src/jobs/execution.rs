//! Running the executor for one task, shared by both lanes.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

use pathforge_ai::{ExecutionError, TaskExecutor};
use pathforge_core::{GenerationParams, TaskState};

/// Run `executor` on `params` and return the terminal state to record.
///
/// The executor runs on its own task so a panic turns into a failed task
/// instead of taking the caller down. With a `deadline`, an overrunning
/// execution is aborted and reported as timed out.
pub async fn run_task(
    executor: Arc<dyn TaskExecutor>,
    params: GenerationParams,
    deadline: Option<Duration>,
) -> TaskState {
    let handle = tokio::spawn(async move { executor.execute(&params).await });
    let abort = handle.abort_handle();

    let joined = match deadline {
        Some(limit) => match tokio::time::timeout(limit, handle).await {
            Ok(joined) => joined,
            Err(_) => {
                abort.abort();
                let err = ExecutionError::TimedOut(limit);
                warn!(error = %err, "task execution aborted");
                return TaskState::failed(err.to_string());
            }
        },
        None => handle.await,
    };

    match joined {
        Ok(Ok(path)) => match serde_json::to_value(&path) {
            Ok(result) => TaskState::finished(result),
            Err(e) => TaskState::failed(
                ExecutionError::Internal(format!("failed to encode learning path: {e}")).to_string(),
            ),
        },
        Ok(Err(err)) => TaskState::failed(err.to_string()),
        Err(join_err) => {
            error!(error = %join_err, "task executor did not complete");
            let reason = if join_err.is_panic() {
                "task executor panicked".to_string()
            } else {
                join_err.to_string()
            };
            TaskState::failed(ExecutionError::Internal(reason).to_string())
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Executors with scripted behaviour for lane and worker tests.

    use async_trait::async_trait;
    use pathforge_ai::{LearningPath, Milestone};

    use super::*;

    pub fn learning_path(topic: &str) -> LearningPath {
        LearningPath {
            title: format!("{topic} path"),
            topic: topic.to_string(),
            expertise_level: "Beginner".to_string(),
            duration_weeks: 1,
            time_commitment: "1 hr/week".to_string(),
            goals: Vec::new(),
            description: String::new(),
            total_hours: 1.0,
            milestones: vec![Milestone {
                title: "start".to_string(),
                description: String::new(),
                week: 1,
                estimated_hours: 1.0,
                skills: Vec::new(),
                resources: Vec::new(),
            }],
        }
    }

    pub enum Scripted {
        Succeed,
        Fail(&'static str),
        Panic,
        Sleep(Duration),
    }

    #[async_trait]
    impl TaskExecutor for Scripted {
        async fn execute(&self, params: &GenerationParams) -> Result<LearningPath, ExecutionError> {
            match self {
                Scripted::Succeed => Ok(learning_path(&params.topic)),
                Scripted::Fail(msg) => Err(ExecutionError::Provider(msg.to_string())),
                Scripted::Panic => panic!("scripted executor panic"),
                Scripted::Sleep(d) => {
                    tokio::time::sleep(*d).await;
                    Ok(learning_path(&params.topic))
                }
            }
        }
    }

    pub fn params(topic: &str) -> GenerationParams {
        GenerationParams::from_json(&serde_json::json!({
            "topic": topic,
            "expertise_level": "Beginner",
            "duration_weeks": 1,
            "time_commitment": "1 hr/week",
        }))
        .expect("valid test params")
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{Scripted, params};
    use super::*;
    use pathforge_core::TaskStatus;

    #[tokio::test]
    async fn success_becomes_finished_with_the_encoded_path() {
        let state = run_task(Arc::new(Scripted::Succeed), params("Python"), None).await;
        assert_eq!(state.status(), TaskStatus::Finished);
        match state {
            TaskState::Finished { result } => assert_eq!(result["topic"], "Python"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn executor_error_becomes_failed_with_its_description() {
        let state = run_task(Arc::new(Scripted::Fail("quota exceeded")), params("x"), None).await;
        assert_eq!(state, TaskState::failed("AI provider error: quota exceeded"));
    }

    #[tokio::test]
    async fn panic_is_contained() {
        let state = run_task(Arc::new(Scripted::Panic), params("x"), None).await;
        assert_eq!(state, TaskState::failed("internal error: task executor panicked"));
    }

    #[tokio::test]
    async fn deadline_aborts_slow_execution() {
        let state = run_task(
            Arc::new(Scripted::Sleep(Duration::from_secs(30))),
            params("x"),
            Some(Duration::from_millis(50)),
        )
        .await;
        assert_eq!(state, TaskState::failed("execution timed out after 0.05s"));
    }

    #[tokio::test]
    async fn deadline_is_not_hit_by_fast_execution() {
        let state = run_task(
            Arc::new(Scripted::Sleep(Duration::from_millis(5))),
            params("x"),
            Some(Duration::from_secs(5)),
        )
        .await;
        assert_eq!(state.status(), TaskStatus::Finished);
    }
}
