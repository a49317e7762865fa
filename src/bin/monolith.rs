//! Monolith Binary - HTTP front end plus an in-process worker pool
//!
//! It wires up:
//! - Queue and state store (Redis when `REDIS_URL` is set, in-memory otherwise)
//! - Local media, filesystem and webhook adapters
//! - HTTP inbound adapter

use sonata::adapters::local::http::{router, AppState};
use sonata::adapters::local::{local_orchestrator, InMemoryQueue, InMemoryStore};
use sonata::application::submission::SubmissionService;
use sonata::application::worker::WorkerService;
use sonata::config::AppConfig;
use sonata::logging;
use sonata::ports::queue::JobQueuePort;
use sonata::ports::repository::JobStateRepository;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

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

    let result = match config.redis_url.clone() {
        #[cfg(feature = "redis")]
        Some(url) => match sonata::adapters::local::RedisPool::new(&url, config.result_ttl) {
            Ok(pool) => run(config, pool.clone(), pool).await,
            Err(e) => Err(e.to_string()),
        },
        #[cfg(not(feature = "redis"))]
        Some(_) => {
            warn!("REDIS_URL is set but Redis support is not compiled in, using in-memory queue");
            run(config, InMemoryQueue::new(), InMemoryStore::new()).await
        }
        None => {
            warn!("REDIS_URL not set, jobs are kept in memory and lost on restart");
            run(config, InMemoryQueue::new(), InMemoryStore::new()).await
        }
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run<Q, R>(config: AppConfig, queue: Q, repo: R) -> Result<(), String>
where
    Q: JobQueuePort + Clone + 'static,
    R: JobStateRepository + Clone + 'static,
{
    for dir in [&config.upload_dir, &config.output_dir, &config.work_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| format!("Failed to create {}: {e}", dir.display()))?;
    }

    let shutdown = CancellationToken::new();

    // 1. Workers
    let orchestrator = local_orchestrator(&config, repo.clone())
        .map_err(|e| format!("Failed to build HTTP client: {e}"))?;
    let workers = Arc::new(WorkerService::new(
        queue.clone(),
        orchestrator,
        config.queue_poll_interval,
    ));
    let handles = workers.spawn_workers(config.worker_count, shutdown.clone());
    info!("Started {} conversion workers", config.worker_count);

    // 2. HTTP
    let state = AppState {
        service: Arc::new(SubmissionService::new(queue, repo)),
        upload_dir: config.upload_dir.clone(),
        output_dir: config.output_dir.clone(),
        server_url: config.server_url.clone(),
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .map_err(|e| format!("Failed to bind {}: {e}", config.bind_address()))?;
    info!("Listening at {}", config.bind_address());

    tokio::spawn(shutdown_on_ctrl_c(shutdown.clone()));
    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await
        .map_err(|e| format!("Server failed: {e}"))?;

    info!("Waiting for workers to finish their current job");
    for handle in handles {
        if let Err(e) = handle.await {
            error!("Worker task panicked: {e}");
        }
    }
    Ok(())
}

async fn shutdown_on_ctrl_c(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested"),
        Err(e) => error!("Failed to listen for Ctrl-C: {e}"),
    }
    shutdown.cancel();
}
