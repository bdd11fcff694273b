use async_trait::async_trait;
use pathforge_core::GenerationParams;

use crate::result::{ExecutionError, LearningPath};

/// The unit of work behind every task.
///
/// Both execution lanes (the queue worker and the inline lane) drive the same
/// executor. Implementations must not mutate caller-visible state: they return
/// a learning path or a failure description and nothing else.
#[async_trait]
pub trait TaskExecutor: Send + Sync + 'static {
    async fn execute(&self, params: &GenerationParams) -> Result<LearningPath, ExecutionError>;
}
