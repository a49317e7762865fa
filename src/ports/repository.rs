use crate::domain::jobs::{JobId, JobSnapshot};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job state store unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt job snapshot: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable job state, written by one worker per job and polled by clients.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobStateRepository: Send + Sync {
    /// Replace the stored snapshot for `snapshot.job_id`.
    async fn put_job_state(&self, snapshot: &JobSnapshot) -> Result<(), StoreError>;

    /// `Ok(None)` when nothing was ever written for this job.
    async fn get_job_state(&self, job_id: &JobId) -> Result<Option<JobSnapshot>, StoreError>;
}
