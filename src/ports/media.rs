//! External media capabilities: inspection and transcoding.

use crate::domain::probe::MediaInfo;
use crate::domain::profile::EncodingProfile;
use crate::domain::segments::SegmentFailure;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("unreadable source {}: {reason}", .path.display())]
    UnreadableSource { path: PathBuf, reason: String },
}

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("`{command}` timed out after {}s", .after.as_secs())]
    Timeout { command: String, after: Duration },

    #[error("`{command}` exited unsuccessfully ({status})")]
    Failed {
        command: String,
        status: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TranscodeError {
    /// Condense into the diagnostic carried by a failed segment.
    pub fn to_failure(&self) -> SegmentFailure {
        match self {
            TranscodeError::Timeout { command, .. } => SegmentFailure {
                command: command.clone(),
                exit_code: None,
                timed_out: true,
                diagnostic: String::new(),
            },
            TranscodeError::Failed {
                command,
                exit_code,
                stderr,
                ..
            } => SegmentFailure {
                command: command.clone(),
                exit_code: *exit_code,
                timed_out: false,
                diagnostic: stderr.clone(),
            },
            TranscodeError::Spawn { command, source } => SegmentFailure {
                command: command.clone(),
                exit_code: None,
                timed_out: false,
                diagnostic: source.to_string(),
            },
            TranscodeError::Io(e) => SegmentFailure {
                command: String::new(),
                exit_code: None,
                timed_out: false,
                diagnostic: e.to_string(),
            },
        }
    }
}

/// Cut the source into raw intermediates of `segment_seconds` each.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitRequest {
    pub source: PathBuf,
    pub work_dir: PathBuf,
    /// Per-job prefix; every intermediate file name starts with it.
    pub prefix: String,
    pub segment_seconds: u32,
    pub timeout: Duration,
}

/// Encode one intermediate into a final artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub profile: EncodingProfile,
    pub timeout: Duration,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaProber: Send + Sync {
    async fn probe(&self, path: &Path, timeout: Duration) -> Result<MediaInfo, ProbeError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Returns the intermediates in playback order.
    async fn split(&self, request: &SplitRequest) -> Result<Vec<PathBuf>, TranscodeError>;

    async fn encode(&self, request: &EncodeRequest) -> Result<(), TranscodeError>;
}
