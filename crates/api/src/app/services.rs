use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use pathforge_ai::llm::LlmError;
use pathforge_ai::{LearningPathGenerator, TaskExecutor};
use pathforge_infra::Settings;
use pathforge_infra::jobs::{
    Dispatcher, DurableQueue, DurableQueueLane, InMemoryJobStore, InlineLane, JobStore, Lane, QueueError,
    TaskQueries,
};

/// Everything the handlers need, shared behind an `Arc`.
pub struct AppServices {
    pub dispatcher: Dispatcher,
    pub queries: TaskQueries,
}

#[derive(Debug, thiserror::Error)]
pub enum ServicesError {
    #[error("failed to build AI provider client: {0}")]
    Provider(#[from] LlmError),

    #[error("failed to configure durable queue: {0}")]
    Queue(#[from] QueueError),
}

impl AppServices {
    /// Wire the lanes and lookups around one Job Store and an optional queue.
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Option<Arc<dyn DurableQueue>>,
        executor: Arc<dyn TaskExecutor>,
        execution_timeout: Option<Duration>,
    ) -> Self {
        let inline: Arc<dyn Lane> =
            Arc::new(InlineLane::new(store.clone(), executor).with_deadline(execution_timeout));
        let durable = queue
            .clone()
            .map(|queue| Arc::new(DurableQueueLane::new(queue)) as Arc<dyn Lane>);

        Self {
            dispatcher: Dispatcher::new(durable, inline),
            queries: TaskQueries::new(store, queue),
        }
    }
}

/// Build the production services from settings and probe the queue once.
pub async fn build_services(settings: &Settings) -> Result<AppServices, ServicesError> {
    let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::with_retention(settings.retention));
    let executor: Arc<dyn TaskExecutor> = Arc::new(LearningPathGenerator::new(settings.providers.clone())?);
    let queue = durable_queue(settings)?;

    let services = AppServices::new(store, queue, executor, settings.execution_timeout);
    let availability = services.dispatcher.probe().await;
    if settings.retention.is_unbounded() {
        warn!("job store retention is unbounded; set JOB_STORE_MAX_ENTRIES or JOB_STORE_TTL_SECS to cap it");
    }
    info!(
        queue = availability.as_str(),
        provider = settings.providers.default_provider.as_str(),
        dev_mode = settings.providers.dev_mode,
        "services ready"
    );
    Ok(services)
}

#[cfg(feature = "redis")]
fn durable_queue(settings: &Settings) -> Result<Option<Arc<dyn DurableQueue>>, QueueError> {
    use pathforge_infra::jobs::{RedisJobQueue, RedisQueueConfig};

    let Some(url) = &settings.queue.redis_url else {
        info!("no Redis configured; every task runs inline");
        return Ok(None);
    };
    let config = RedisQueueConfig {
        url: url.clone(),
        queue_name: settings.queue.name.clone(),
        result_ttl: settings.queue.result_ttl,
        failure_ttl: settings.queue.failure_ttl,
    };
    Ok(Some(Arc::new(RedisJobQueue::new(config)?)))
}

#[cfg(not(feature = "redis"))]
fn durable_queue(settings: &Settings) -> Result<Option<Arc<dyn DurableQueue>>, QueueError> {
    if settings.queue.redis_url.is_some() {
        warn!("Redis configured but the `redis` feature is off; every task runs inline");
    }
    Ok(None)
}
