use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Opaque identifier handed back to clients at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Where the audio to convert comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobSource {
    /// File already written to the upload directory by the front end.
    Upload { path: PathBuf },
    /// Remote file, fetched by the worker that picks up the job.
    Url { url: String },
}

impl fmt::Display for JobSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobSource::Upload { path } => write!(f, "{}", path.display()),
            JobSource::Url { url } => f.write_str(url),
        }
    }
}

/// Message placed on the work queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub source: JobSource,
    pub submitted_at: DateTime<Utc>,
}

impl Job {
    pub fn new(source: JobSource) -> Self {
        Self {
            id: JobId::new(),
            source,
            submitted_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    pub fn can_transition_to(self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Pending, JobState::Running)
                | (JobState::Running, JobState::Succeeded)
                | (JobState::Running, JobState::Failed)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Succeeded => "SUCCEEDED",
            JobState::Failed => "FAILED",
        };
        f.write_str(label)
    }
}

/// A produced artifact, addressed by its file name in the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRef {
    pub index: usize,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobResult {
    Outputs { files: Vec<OutputRef> },
    Error { message: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("job {job_id} cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub job_id: JobId,
    pub from: JobState,
    pub to: JobState,
}

/// Externally visible record of a job, as written to the state store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub state: JobState,
    pub source: JobSource,
    pub result: Option<JobResult>,
    /// Artifact prefix of the attempt that last took the job to RUNNING.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl JobSnapshot {
    pub fn pending(job: &Job) -> Self {
        Self {
            job_id: job.id,
            state: JobState::Pending,
            source: job.source.clone(),
            result: None,
            attempt: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_attempt(mut self, prefix: impl Into<String>) -> Self {
        self.attempt = Some(prefix.into());
        self
    }

    pub fn start(&self) -> Result<Self, InvalidTransition> {
        self.transition(JobState::Running, None)
    }

    pub fn succeed(&self, files: Vec<OutputRef>) -> Result<Self, InvalidTransition> {
        self.transition(JobState::Succeeded, Some(JobResult::Outputs { files }))
    }

    pub fn fail(&self, message: impl Into<String>) -> Result<Self, InvalidTransition> {
        self.transition(
            JobState::Failed,
            Some(JobResult::Error {
                message: message.into(),
            }),
        )
    }

    fn transition(
        &self,
        next: JobState,
        result: Option<JobResult>,
    ) -> Result<Self, InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                job_id: self.job_id,
                from: self.state,
                to: next,
            });
        }
        Ok(Self {
            job_id: self.job_id,
            state: next,
            source: self.source.clone(),
            result,
            attempt: self.attempt.clone(),
            updated_at: Utc::now(),
        })
    }

    pub fn outputs(&self) -> &[OutputRef] {
        match &self.result {
            Some(JobResult::Outputs { files }) => files,
            _ => &[],
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.result {
            Some(JobResult::Error { message }) => Some(message),
            _ => None,
        }
    }
}

/// Public download link for an output file.
pub fn download_url(server_url: &str, file_name: &str) -> String {
    format!("{}/download/{}", server_url.trim_end_matches('/'), file_name)
}

/// Human-readable digest of a finished job, handed to the notifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSummary {
    pub job_id: JobId,
    pub state: JobState,
    pub download_urls: Vec<String>,
    pub error: Option<String>,
}

impl JobSummary {
    pub fn from_snapshot(snapshot: &JobSnapshot, server_url: &str) -> Self {
        Self {
            job_id: snapshot.job_id,
            state: snapshot.state,
            download_urls: snapshot
                .outputs()
                .iter()
                .map(|output| download_url(server_url, &output.file_name))
                .collect(),
            error: snapshot.error().map(str::to_owned),
        }
    }

    pub fn text(&self) -> String {
        match self.state {
            JobState::Succeeded => format!(
                "Audio conversion complete for job {}\n\nConverted files: {}\nDownload links:\n{}",
                self.job_id,
                self.download_urls.len(),
                self.download_urls.join("\n")
            ),
            _ => format!(
                "Audio conversion failed for job {}\n\nReason: {}",
                self.job_id,
                self.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload_job() -> Job {
        Job::new(JobSource::Upload {
            path: PathBuf::from("uploads/interview.wav"),
        })
    }

    #[test]
    fn test_state_machine_only_moves_forward() {
        use JobState::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Succeeded));
        assert!(Running.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Succeeded));
        assert!(!Succeeded.can_transition_to(Running));
        assert!(!Failed.can_transition_to(Succeeded));
        assert!(!Running.can_transition_to(Running));
    }

    #[test]
    fn test_terminal_snapshot_is_immutable() {
        let pending = JobSnapshot::pending(&upload_job());
        let failed = pending.start().unwrap().fail("boom").unwrap();

        let err = failed.start().unwrap_err();
        assert_eq!(err.from, JobState::Failed);
        assert_eq!(err.to, JobState::Running);
        assert!(failed.succeed(vec![]).is_err());
    }

    #[test]
    fn test_snapshot_accessors() {
        let running = JobSnapshot::pending(&upload_job()).start().unwrap();
        let outputs = vec![OutputRef {
            index: 0,
            file_name: "abc_000.mp3".to_string(),
        }];
        let done = running.succeed(outputs.clone()).unwrap();
        assert_eq!(done.outputs(), outputs.as_slice());
        assert_eq!(done.error(), None);

        let failed = running.fail("no audio").unwrap();
        assert!(failed.outputs().is_empty());
        assert_eq!(failed.error(), Some("no audio"));
    }

    #[test]
    fn test_snapshot_serde_shape() {
        let snapshot = JobSnapshot::pending(&upload_job());
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["state"], "PENDING");
        assert_eq!(value["source"]["kind"], "upload");

        let back: JobSnapshot = serde_json::from_value(value).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_job_id_parse() {
        let id = JobId::new();
        assert_eq!(id.to_string().parse::<JobId>().unwrap(), id);
        assert!("not-a-uuid".parse::<JobId>().is_err());
    }

    #[test]
    fn test_summary_lists_download_links() {
        let done = JobSnapshot::pending(&upload_job())
            .start()
            .unwrap()
            .succeed(vec![
                OutputRef {
                    index: 0,
                    file_name: "p_000.mp3".to_string(),
                },
                OutputRef {
                    index: 1,
                    file_name: "p_001.mp3".to_string(),
                },
            ])
            .unwrap();

        let summary = JobSummary::from_snapshot(&done, "http://localhost:3000/");
        assert_eq!(
            summary.download_urls,
            vec![
                "http://localhost:3000/download/p_000.mp3",
                "http://localhost:3000/download/p_001.mp3"
            ]
        );
        let text = summary.text();
        assert!(text.contains("Converted files: 2"));
        assert!(text.contains("http://localhost:3000/download/p_001.mp3"));
    }

    #[test]
    fn test_summary_for_failure_carries_reason() {
        let failed = JobSnapshot::pending(&upload_job())
            .start()
            .unwrap()
            .fail("unreadable source")
            .unwrap();
        let summary = JobSummary::from_snapshot(&failed, "http://host");
        assert!(summary.download_urls.is_empty());
        assert!(summary.text().contains("unreadable source"));
    }
}
