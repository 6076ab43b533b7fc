use anyhow::{Context, Result};
use dotenv::dotenv;
use goldbar_rust_core::{
    AdapterRegistry, ExtractionOrchestrator, RedisSnapshotCache, SnapshotCache, UpdateCoordinator,
};
use price_worker_rust::triggers::{listen_for_requests, RedisOutcomePublisher};
use price_worker_rust::{Scheduler, WorkerConfig};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Gold Bar Price Worker...");

    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;
    info!(
        worker_id = %config.worker_id,
        sources_file = %config.sources_file.display(),
        "Configuration loaded"
    );

    // Sources
    let registry = AdapterRegistry::from_sources_file(&config.sources_file)
        .context("Failed to load price sources")?;
    if registry.is_empty() {
        warn!("No price sources configured; every run will fail until sources are added");
    }

    // Redis
    let cache: Arc<dyn SnapshotCache> = Arc::new(
        RedisSnapshotCache::connect(config.cache_config())
            .await
            .context("Failed to connect snapshot cache")?,
    );
    let redis_client = redis::Client::open(config.redis_url.as_str())?;
    let publisher = Arc::new(RedisOutcomePublisher::connect(&redis_client).await?);

    // Pipeline
    let orchestrator = ExtractionOrchestrator::new(config.orchestrator.clone());
    let coordinator = Arc::new(UpdateCoordinator::new(orchestrator, registry, cache));

    let requests = listen_for_requests(redis_client);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = Scheduler::new(
        coordinator,
        publisher,
        config.worker_id.clone(),
        config.update_interval(),
        config.run_on_startup,
    );
    let scheduler_task = tokio::spawn(scheduler.run(requests, shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);

    if let Err(e) = scheduler_task.await {
        error!("Scheduler task failed: {}", e);
    }

    info!("Price worker stopped");
    Ok(())
}
