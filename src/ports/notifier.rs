use crate::domain::jobs::JobSummary;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification endpoint answered with status {0}")]
    Rejected(u16),
    #[error("notification transport failed: {0}")]
    Transport(String),
}

/// Best-effort, single-shot delivery of a finished job's summary.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, summary: &JobSummary) -> Result<(), NotifyError>;
}
