use super::orchestrator::JobRunner;
use crate::ports::queue::JobQueuePort;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Instrument};

/// Pause after a queue error before polling again.
const QUEUE_RETRY_DELAY: Duration = Duration::from_secs(1);

pub struct WorkerService<Q, J> {
    queue: Q,
    runner: J,
    poll_interval: Duration,
}

impl<Q, J> WorkerService<Q, J>
where
    Q: JobQueuePort + 'static,
    J: JobRunner + 'static,
{
    /// `poll_interval` bounds how long a worker blocks on an empty queue, and
    /// so how quickly it notices shutdown.
    pub fn new(queue: Q, runner: J, poll_interval: Duration) -> Self {
        Self {
            queue,
            runner,
            poll_interval,
        }
    }

    /// Take jobs one at a time until `shutdown` fires.
    ///
    /// A job in progress is finished before the loop exits.
    pub async fn run_worker_loop(&self, worker_id: usize, shutdown: CancellationToken) {
        info!(worker_id, "worker started");
        while !shutdown.is_cancelled() {
            match self.queue.dequeue_job(self.poll_interval).await {
                Ok(Some(job)) => {
                    let span = tracing::info_span!("job", worker_id, job_id = %job.id);
                    match self.runner.run(&job).instrument(span).await {
                        Ok(snapshot) => {
                            info!(worker_id, job_id = %job.id, state = %snapshot.state, "job finished")
                        }
                        Err(e) => error!(worker_id, job_id = %job.id, error = %e, "job aborted"),
                    }
                }
                Ok(None) => continue,
                Err(e) => {
                    error!(worker_id, error = %e, "queue error");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(QUEUE_RETRY_DELAY) => {}
                    }
                }
            }
        }
        info!(worker_id, "worker stopped");
    }

    pub fn spawn_workers(
        self: Arc<Self>,
        count: usize,
        shutdown: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        (0..count.max(1))
            .map(|worker_id| {
                let worker = Arc::clone(&self);
                let shutdown = shutdown.clone();
                tokio::spawn(async move { worker.run_worker_loop(worker_id, shutdown).await })
            })
            .collect()
    }
}
