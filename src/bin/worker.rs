//! Worker Binary - dequeue-only worker pool for scaling out
//!
//! Needs a shared queue, so `REDIS_URL` is required.

use sonata::adapters::local::{local_orchestrator, RedisPool};
use sonata::application::worker::WorkerService;
use sonata::config::AppConfig;
use sonata::logging;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    logging::init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let Some(redis_url) = config.redis_url.clone() else {
        error!("REDIS_URL is required for a standalone worker");
        std::process::exit(1);
    };

    let pool = match RedisPool::new(&redis_url, config.result_ttl) {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to connect to Redis: {e}");
            std::process::exit(1);
        }
    };

    for dir in [&config.output_dir, &config.work_dir] {
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            error!("Failed to create {}: {e}", dir.display());
            std::process::exit(1);
        }
    }

    let orchestrator = match local_orchestrator(&config, pool.clone()) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!("Failed to build HTTP client: {e}");
            std::process::exit(1);
        }
    };

    let shutdown = CancellationToken::new();
    let workers = Arc::new(WorkerService::new(pool, orchestrator, config.queue_poll_interval));
    let handles = workers.spawn_workers(config.worker_count, shutdown.clone());
    info!("Started {} conversion workers", config.worker_count);

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested, finishing current jobs"),
        Err(e) => error!("Failed to listen for Ctrl-C: {e}"),
    }
    shutdown.cancel();

    for handle in handles {
        if let Err(e) = handle.await {
            error!("Worker task panicked: {e}");
        }
    }
}
