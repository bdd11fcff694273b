//! Queue worker process: claims queued learning-path jobs from Redis and runs
//! them until SIGINT/SIGTERM.

use std::sync::Arc;

use anyhow::{Context, bail};
use tracing::info;

use pathforge_ai::LearningPathGenerator;
use pathforge_infra::Settings;
use pathforge_infra::jobs::{DurableQueue, QueueWorker, QueueWorkerConfig, RedisJobQueue, RedisQueueConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pathforge_observability::init();

    let settings = Settings::from_env().context("invalid configuration")?;
    let Some(url) = settings.queue.redis_url.clone() else {
        bail!("the worker needs a broker: set REDIS_URL or REDIS_HOST");
    };

    let queue = RedisJobQueue::new(RedisQueueConfig {
        url,
        queue_name: settings.queue.name.clone(),
        result_ttl: settings.queue.result_ttl,
        failure_ttl: settings.queue.failure_ttl,
    })
    .context("failed to configure Redis queue")?;
    queue.ping().await.context("Redis is unreachable")?;

    let executor = LearningPathGenerator::new(settings.providers.clone())
        .context("failed to build AI provider client")?;

    let config = QueueWorkerConfig::default()
        .with_name(format!("worker-{}", std::process::id()))
        .with_execution_timeout(settings.execution_timeout);
    info!(queue = %settings.queue.name, worker = %config.name, "starting queue worker");

    let handle = QueueWorker::new(Arc::new(queue), Arc::new(executor), config).spawn();

    shutdown_signal().await;
    let stats = handle.stats();
    handle.shutdown().await;
    info!(
        processed = stats.processed,
        succeeded = stats.succeeded,
        failed = stats.failed,
        uptime_secs = stats.uptime_secs,
        "queue worker exited"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, finishing the job in flight");
}
