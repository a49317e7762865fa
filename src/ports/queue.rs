use crate::domain::jobs::Job;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("work queue unavailable: {0}")]
    Unavailable(String),
    #[error("malformed job message: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobQueuePort: Send + Sync {
    /// Enqueue a job
    async fn enqueue_job(&self, job: Job) -> Result<(), QueueError>;

    /// Dequeue a job, waiting at most `timeout` for one to arrive.
    /// `Ok(None)` means the wait expired with the queue empty.
    async fn dequeue_job(&self, timeout: Duration) -> Result<Option<Job>, QueueError>;
}
