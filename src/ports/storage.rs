use crate::domain::jobs::JobSource;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StageError {
    #[error("source file {} does not exist", .0.display())]
    Missing(PathBuf),
    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourceStorage: Send + Sync {
    /// Make the job source readable on local disk and return its path.
    /// Anything downloaded goes under `work_dir`.
    async fn stage(&self, source: &JobSource, work_dir: &Path) -> Result<PathBuf, StageError>;
}
