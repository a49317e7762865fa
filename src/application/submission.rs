use crate::domain::jobs::{Job, JobId, JobSnapshot, JobSource};
use crate::ports::queue::{JobQueuePort, QueueError};
use crate::ports::repository::{JobStateRepository, StoreError};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Accepts new jobs and answers status queries for the front end.
pub struct SubmissionService<Q, R> {
    queue: Q,
    repo: R,
}

impl<Q, R> SubmissionService<Q, R>
where
    Q: JobQueuePort,
    R: JobStateRepository,
{
    pub fn new(queue: Q, repo: R) -> Self {
        Self { queue, repo }
    }

    /// Record the job as PENDING, then hand it to the workers.
    ///
    /// The snapshot goes first so a status query never misses a queued job.
    pub async fn submit(&self, source: JobSource) -> Result<JobId, SubmitError> {
        let job = Job::new(source);
        self.repo.put_job_state(&JobSnapshot::pending(&job)).await?;
        self.queue.enqueue_job(job.clone()).await?;
        info!(job_id = %job.id, source = %job.source, "job submitted");
        Ok(job.id)
    }

    pub async fn status(&self, job_id: &JobId) -> Result<Option<JobSnapshot>, StoreError> {
        self.repo.get_job_state(job_id).await
    }
}
