mod config;

use crate::config::WorkerConfig;
use async_trait::async_trait;
use nodeflow_ai::{AiCapability, AiError, AiRequest, AiResponse};
use nodeflow_engine::WorkflowEngine;
use nodeflow_queue::{JobQueue, SqliteJobStore, TracingObserver};
use nodeflow_workflow::DefaultNodeExecutor;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Stands in for an LLM provider until one is wired up; `ai-node` steps
/// fail and go through the normal retry path.
struct UnconfiguredAi;

#[async_trait]
impl AiCapability for UnconfiguredAi {
    async fn execute(&self, _request: AiRequest) -> Result<AiResponse, AiError> {
        Err(AiError::Unavailable {
            reason: "no LLM provider configured".to_string(),
        })
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = WorkerConfig::from_env().expect("failed to load configuration");
    tracing::info!(workers = config.workers, "Loaded configuration");

    // Open the job store; migrations run on connect
    let store = SqliteJobStore::connect(&config.database_url)
        .await
        .expect("failed to open job store");

    let queue = Arc::new(
        JobQueue::new(Arc::new(store), config.queue.clone())
            .with_observer(Arc::new(TracingObserver)),
    );
    let executor =
        DefaultNodeExecutor::with_config(Arc::new(UnconfiguredAi), config.runner.clone());
    let engine = WorkflowEngine::new(queue, executor);

    // Jobs left active by a previous process lose the interrupted attempt
    match engine.recover().await {
        Ok(recovered) if recovered.requeued > 0 || recovered.failed > 0 => {
            tracing::info!(
                requeued_jobs = recovered.requeued,
                failed_jobs = recovered.failed,
                "Recovered interrupted jobs on startup"
            );
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(error = %e, "Failed to recover interrupted jobs on startup");
        }
    }

    let pool = engine.start(config.workers);

    // Spawn periodic cleanup of old finished jobs
    let cleanup_queue = engine.queue().clone();
    let cleanup = config.cleanup.clone();
    let shutdown = pool.shutdown_token();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup.interval());
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }
            match cleanup_queue.clean(cleanup.max_age()).await {
                Ok(count) if count > 0 => {
                    tracing::debug!(removed_jobs = count, "Periodic job cleanup");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to clean up finished jobs");
                }
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for shutdown signal");
    tracing::info!("Shutting down, waiting for in-flight jobs");
    pool.shutdown().await;
}
