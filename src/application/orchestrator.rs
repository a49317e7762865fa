//! Drives one job from PENDING to a terminal state.

use super::executor::{JobLayout, SegmentExecutor};
use crate::domain::jobs::{InvalidTransition, Job, JobId, JobSnapshot, JobState, JobSummary};
use crate::domain::plan::{plan, SegmentPolicy};
use crate::domain::segments::{aggregate, Aggregate, SuccessPolicy};
use crate::ports::media::{MediaProber, Transcoder};
use crate::ports::notifier::Notifier;
use crate::ports::repository::{JobStateRepository, StoreError};
use crate::ports::storage::SourceStorage;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Errors that leave a job's recorded state unreliable.
///
/// Processing problems are not errors here: they end the job as FAILED.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("state store failed for job {job_id}: {source}")]
    Store {
        job_id: JobId,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    pub segment_policy: SegmentPolicy,
    pub success_policy: SuccessPolicy,
    pub probe_timeout: Duration,
    pub notify_timeout: Duration,
    /// Per-attempt working directories are created under here.
    pub work_root: PathBuf,
    pub output_dir: PathBuf,
    /// Base of the download links put in notifications.
    pub server_url: String,
}

/// Something that can take a dequeued job all the way through.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: &Job) -> Result<JobSnapshot, OrchestratorError>;
}

pub struct ConversionOrchestrator<P, T, S, R, N> {
    prober: P,
    executor: SegmentExecutor<T>,
    storage: S,
    repo: R,
    notifier: N,
    settings: OrchestratorSettings,
}

impl<P, T, S, R, N> ConversionOrchestrator<P, T, S, R, N>
where
    P: MediaProber,
    T: Transcoder,
    S: SourceStorage,
    R: JobStateRepository,
    N: Notifier,
{
    pub fn new(
        prober: P,
        executor: SegmentExecutor<T>,
        storage: S,
        repo: R,
        notifier: N,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            prober,
            executor,
            storage,
            repo,
            notifier,
            settings,
        }
    }

    async fn persist(&self, snapshot: &JobSnapshot) -> Result<(), OrchestratorError> {
        self.repo
            .put_job_state(snapshot)
            .await
            .map_err(|source| OrchestratorError::Store {
                job_id: snapshot.job_id,
                source,
            })
    }

    /// Everything between RUNNING and the terminal write.
    async fn convert(&self, job: &Job, layout: &JobLayout) -> Aggregate {
        for dir in [&layout.work_dir, &layout.output_dir] {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                return Aggregate::failed(format!(
                    "failed to prepare {}: {e}",
                    dir.display()
                ));
            }
        }

        let source = match self.storage.stage(&job.source, &layout.work_dir).await {
            Ok(path) => path,
            Err(e) => return Aggregate::failed(format!("unreadable source: {e}")),
        };

        let info = match self.prober.probe(&source, self.settings.probe_timeout).await {
            Ok(info) => info,
            Err(e) => return Aggregate::failed(e.to_string()),
        };
        if info.bitrate_defaulted {
            warn!(job_id = %job.id, bitrate_kbps = info.bitrate_kbps, "source bitrate unknown, using default");
        }

        let plan = plan(
            info.duration_seconds,
            info.bitrate_kbps,
            self.settings.segment_policy,
        );
        info!(
            job_id = %job.id,
            duration_seconds = plan.source_duration_seconds,
            bitrate_kbps = plan.source_bitrate_kbps,
            segment_seconds = plan.segment_duration_seconds,
            expected_segments = plan.expected_segment_count(),
            "segmentation planned"
        );

        match self.executor.execute(&source, &plan, layout).await {
            Ok(results) => aggregate(results, self.settings.success_policy),
            Err(e) => Aggregate::failed(format!("split failed: {e}")),
        }
    }

    /// Delete what an abandoned attempt left in the work and output directories.
    async fn sweep_attempt(&self, prefix: &str) {
        remove_dir_if_present(&self.settings.work_root.join(prefix)).await;

        let owned = format!("{prefix}_");
        let mut entries = match tokio::fs::read_dir(&self.settings.output_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    warn!(path = %self.settings.output_dir.display(), error = %e, "failed to scan output directory");
                }
                return;
            }
        };
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    if entry.file_name().to_string_lossy().starts_with(&owned) {
                        remove_file_if_present(&entry.path()).await;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "failed to scan output directory");
                    break;
                }
            }
        }
    }

    async fn send_notification(&self, snapshot: &JobSnapshot) {
        let summary = JobSummary::from_snapshot(snapshot, &self.settings.server_url);
        let sent = tokio::time::timeout(
            self.settings.notify_timeout,
            self.notifier.notify(&summary),
        )
        .await;
        match sent {
            Ok(Ok(())) => info!(job_id = %snapshot.job_id, "notification sent"),
            Ok(Err(e)) => warn!(job_id = %snapshot.job_id, error = %e, "notification failed"),
            Err(_) => warn!(job_id = %snapshot.job_id, "notification timed out"),
        }
    }
}

#[async_trait]
impl<P, T, S, R, N> JobRunner for ConversionOrchestrator<P, T, S, R, N>
where
    P: MediaProber,
    T: Transcoder,
    S: SourceStorage,
    R: JobStateRepository,
    N: Notifier,
{
    async fn run(&self, job: &Job) -> Result<JobSnapshot, OrchestratorError> {
        let current = self
            .repo
            .get_job_state(&job.id)
            .await
            .map_err(|source| OrchestratorError::Store {
                job_id: job.id,
                source,
            })?;

        let layout = JobLayout::new(&self.settings.work_root, &self.settings.output_dir);
        let running = match current {
            Some(snapshot) if snapshot.state.is_terminal() => {
                info!(job_id = %job.id, state = %snapshot.state, "job already finished, skipping redelivery");
                return Ok(snapshot);
            }
            Some(snapshot) if snapshot.state == JobState::Running => {
                warn!(job_id = %job.id, "job was left RUNNING, processing it again");
                if let Some(stale) = snapshot.attempt.as_deref() {
                    self.sweep_attempt(stale).await;
                }
                snapshot
            }
            Some(snapshot) => snapshot.start()?,
            None => JobSnapshot::pending(job).start()?,
        }
        .with_attempt(layout.prefix.clone());
        self.persist(&running).await?;
        info!(job_id = %job.id, source = %job.source, attempt = %layout.prefix, "job running");

        let outcome = self.convert(job, &layout).await;
        remove_dir_if_present(&layout.work_dir).await;

        let terminal = match outcome {
            Aggregate::Succeeded(files) => {
                info!(job_id = %job.id, outputs = files.len(), "job succeeded");
                running.succeed(files)?
            }
            Aggregate::Failed { message, discarded } => {
                for output in &discarded {
                    remove_file_if_present(&self.settings.output_dir.join(&output.file_name)).await;
                }
                error!(job_id = %job.id, reason = %message, "job failed");
                running.fail(message)?
            }
        };
        self.persist(&terminal).await?;

        self.send_notification(&terminal).await;
        Ok(terminal)
    }
}

async fn remove_dir_if_present(path: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(path).await {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to remove working directory");
        }
    }
}

async fn remove_file_if_present(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to remove discarded output");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::executor::ExecutorSettings;
    use crate::domain::jobs::JobSource;
    use crate::domain::probe::MediaInfo;
    use crate::ports::media::{MockMediaProber, MockTranscoder, ProbeError, TranscodeError};
    use crate::ports::notifier::{MockNotifier, NotifyError};
    use crate::ports::repository::MockJobStateRepository;
    use crate::ports::storage::{MockSourceStorage, StageError};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tempfile::{tempdir, TempDir};

    /// Keeps every write so tests can check the sequence of states.
    #[derive(Clone, Default)]
    struct RecordingStore {
        writes: Arc<Mutex<Vec<JobSnapshot>>>,
        latest: Arc<Mutex<HashMap<JobId, JobSnapshot>>>,
    }

    impl RecordingStore {
        fn states(&self) -> Vec<JobState> {
            self.writes.lock().unwrap().iter().map(|s| s.state).collect()
        }
    }

    #[async_trait]
    impl JobStateRepository for RecordingStore {
        async fn put_job_state(&self, snapshot: &JobSnapshot) -> Result<(), StoreError> {
            self.writes.lock().unwrap().push(snapshot.clone());
            self.latest
                .lock()
                .unwrap()
                .insert(snapshot.job_id, snapshot.clone());
            Ok(())
        }

        async fn get_job_state(&self, job_id: &JobId) -> Result<Option<JobSnapshot>, StoreError> {
            Ok(self.latest.lock().unwrap().get(job_id).cloned())
        }
    }

    fn job() -> Job {
        Job::new(JobSource::Upload {
            path: PathBuf::from("/uploads/talk.wav"),
        })
    }

    fn settings(dir: &TempDir, success_policy: SuccessPolicy) -> OrchestratorSettings {
        OrchestratorSettings {
            segment_policy: SegmentPolicy::FixedDuration { seconds: 60 },
            success_policy,
            probe_timeout: Duration::from_secs(5),
            notify_timeout: Duration::from_millis(200),
            work_root: dir.path().join("work"),
            output_dir: dir.path().join("out"),
            server_url: "http://localhost:8000".to_string(),
        }
    }

    fn staged() -> MockSourceStorage {
        let mut storage = MockSourceStorage::new();
        storage
            .expect_stage()
            .returning(|_, _| Ok(PathBuf::from("/uploads/talk.wav")));
        storage
    }

    fn probed() -> MockMediaProber {
        let mut prober = MockMediaProber::new();
        prober.expect_probe().returning(|_, _| {
            Ok(MediaInfo {
                duration_seconds: 240.0,
                bitrate_kbps: 128,
                bitrate_defaulted: false,
            })
        });
        prober
    }

    /// Splits into `segments` parts and fails the encode of every index in `fail`.
    fn transcoder(segments: usize, fail: &'static [usize]) -> MockTranscoder {
        let mut transcoder = MockTranscoder::new();
        transcoder.expect_split().returning(move |req| {
            Ok((0..segments)
                .map(|i| req.work_dir.join(format!("{}_part_{:03}.mka", req.prefix, i)))
                .collect())
        });
        transcoder.expect_encode().returning(move |req| {
            let name = req.input.to_string_lossy().to_string();
            let index: usize = name[name.len() - 7..name.len() - 4].parse().unwrap();
            if fail.contains(&index) {
                Err(TranscodeError::Failed {
                    command: "ffmpeg".to_string(),
                    status: "exit code 1".to_string(),
                    exit_code: Some(1),
                    stderr: "corrupt frame".to_string(),
                })
            } else {
                Ok(())
            }
        });
        transcoder
    }

    fn quiet_notifier() -> MockNotifier {
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().returning(|_| Ok(()));
        notifier
    }

    fn orchestrator<P, T, S, R, N>(
        prober: P,
        transcoder: T,
        storage: S,
        repo: R,
        notifier: N,
        settings: OrchestratorSettings,
    ) -> ConversionOrchestrator<P, T, S, R, N>
    where
        P: MediaProber,
        T: Transcoder,
        S: SourceStorage,
        R: JobStateRepository,
        N: Notifier,
    {
        let executor = SegmentExecutor::new(transcoder, ExecutorSettings::default());
        ConversionOrchestrator::new(prober, executor, storage, repo, notifier, settings)
    }

    #[tokio::test]
    async fn test_happy_path_walks_the_state_machine() {
        let dir = tempdir().unwrap();
        let store = RecordingStore::default();
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|summary| {
                summary.state == JobState::Succeeded
                    && summary.download_urls.len() == 4
                    && summary.download_urls[0].starts_with("http://localhost:8000/download/")
            })
            .times(1)
            .returning(|_| Ok(()));

        let orch = orchestrator(
            probed(),
            transcoder(4, &[]),
            staged(),
            store.clone(),
            notifier,
            settings(&dir, SuccessPolicy::AnySegment),
        );
        let job = job();
        let done = orch.run(&job).await.unwrap();

        assert_eq!(done.state, JobState::Succeeded);
        let indices: Vec<usize> = done.outputs().iter().map(|o| o.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(store.states(), vec![JobState::Running, JobState::Succeeded]);
        assert!(!dir.path().join("work").read_dir().unwrap().any(|_| true));
    }

    #[tokio::test]
    async fn test_partial_failure_reports_only_successful_outputs() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(
            probed(),
            transcoder(5, &[1, 3]),
            staged(),
            RecordingStore::default(),
            quiet_notifier(),
            settings(&dir, SuccessPolicy::AnySegment),
        );

        let done = orch.run(&job()).await.unwrap();
        assert_eq!(done.state, JobState::Succeeded);
        let indices: Vec<usize> = done.outputs().iter().map(|o| o.index).collect();
        assert_eq!(indices, vec![0, 2, 4]);
    }

    #[tokio::test]
    async fn test_strict_policy_fails_on_partial_failure() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(
            probed(),
            transcoder(3, &[2]),
            staged(),
            RecordingStore::default(),
            quiet_notifier(),
            settings(&dir, SuccessPolicy::AllSegments),
        );

        let done = orch.run(&job()).await.unwrap();
        assert_eq!(done.state, JobState::Failed);
        assert!(done.error().unwrap().starts_with("1 of 3 segments failed"));
        assert!(done.outputs().is_empty());
    }

    #[tokio::test]
    async fn test_all_segments_failing_fails_the_job() {
        let dir = tempdir().unwrap();
        let store = RecordingStore::default();
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|summary| summary.state == JobState::Failed && summary.error.is_some())
            .times(1)
            .returning(|_| Ok(()));

        let orch = orchestrator(
            probed(),
            transcoder(2, &[0, 1]),
            staged(),
            store.clone(),
            notifier,
            settings(&dir, SuccessPolicy::AnySegment),
        );

        let done = orch.run(&job()).await.unwrap();
        assert_eq!(done.state, JobState::Failed);
        assert!(done.error().unwrap().contains("corrupt frame"));
        assert_eq!(store.states(), vec![JobState::Running, JobState::Failed]);
    }

    #[tokio::test]
    async fn test_unreadable_source_never_reaches_the_transcoder() {
        let dir = tempdir().unwrap();
        let mut prober = MockMediaProber::new();
        prober.expect_probe().returning(|path, _| {
            Err(ProbeError::UnreadableSource {
                path: path.to_path_buf(),
                reason: "Invalid data found when processing input".to_string(),
            })
        });
        let mut transcoder = MockTranscoder::new();
        transcoder.expect_split().times(0);
        transcoder.expect_encode().times(0);

        let orch = orchestrator(
            prober,
            transcoder,
            staged(),
            RecordingStore::default(),
            quiet_notifier(),
            settings(&dir, SuccessPolicy::AnySegment),
        );

        let done = orch.run(&job()).await.unwrap();
        assert_eq!(done.state, JobState::Failed);
        assert!(done.error().unwrap().starts_with("unreadable source"));
    }

    #[tokio::test]
    async fn test_missing_upload_fails_without_probing() {
        let dir = tempdir().unwrap();
        let mut storage = MockSourceStorage::new();
        storage
            .expect_stage()
            .returning(|_, _| Err(StageError::Missing(PathBuf::from("/uploads/talk.wav"))));
        let mut prober = MockMediaProber::new();
        prober.expect_probe().times(0);
        let mut transcoder = MockTranscoder::new();
        transcoder.expect_split().times(0);

        let orch = orchestrator(
            prober,
            transcoder,
            storage,
            RecordingStore::default(),
            quiet_notifier(),
            settings(&dir, SuccessPolicy::AnySegment),
        );

        let done = orch.run(&job()).await.unwrap();
        assert_eq!(done.state, JobState::Failed);
        assert!(done.error().unwrap().contains("does not exist"));
    }

    #[tokio::test]
    async fn test_split_failure_fails_the_job() {
        let dir = tempdir().unwrap();
        let mut transcoder = MockTranscoder::new();
        transcoder.expect_split().returning(|_| {
            Err(TranscodeError::Timeout {
                command: "ffmpeg -f segment".to_string(),
                after: Duration::from_secs(1800),
            })
        });

        let orch = orchestrator(
            probed(),
            transcoder,
            staged(),
            RecordingStore::default(),
            quiet_notifier(),
            settings(&dir, SuccessPolicy::AnySegment),
        );

        let done = orch.run(&job()).await.unwrap();
        assert_eq!(done.state, JobState::Failed);
        assert!(done.error().unwrap().starts_with("split failed"));
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_change_outcome() {
        let dir = tempdir().unwrap();
        let store = RecordingStore::default();
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .times(1)
            .returning(|_| Err(NotifyError::Rejected(500)));

        let orch = orchestrator(
            probed(),
            transcoder(1, &[]),
            staged(),
            store.clone(),
            notifier,
            settings(&dir, SuccessPolicy::AnySegment),
        );

        let job = job();
        let done = orch.run(&job).await.unwrap();
        assert_eq!(done.state, JobState::Succeeded);
        let stored = store.get_job_state(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Succeeded);
    }

    #[tokio::test]
    async fn test_store_failure_is_surfaced() {
        let dir = tempdir().unwrap();
        let mut repo = MockJobStateRepository::new();
        repo.expect_get_job_state().returning(|_| Ok(None));
        repo.expect_put_job_state()
            .returning(|_| Err(StoreError::Unavailable("connection refused".to_string())));
        let mut storage = MockSourceStorage::new();
        storage.expect_stage().times(0);

        let orch = orchestrator(
            MockMediaProber::new(),
            MockTranscoder::new(),
            storage,
            repo,
            MockNotifier::new(),
            settings(&dir, SuccessPolicy::AnySegment),
        );

        let err = orch.run(&job()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Store { .. }));
    }

    #[tokio::test]
    async fn test_redelivered_terminal_job_is_not_reprocessed() {
        let dir = tempdir().unwrap();
        let store = RecordingStore::default();
        let job = job();
        let failed = JobSnapshot::pending(&job)
            .start()
            .unwrap()
            .fail("earlier failure")
            .unwrap();
        store.put_job_state(&failed).await.unwrap();

        let mut storage = MockSourceStorage::new();
        storage.expect_stage().times(0);
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(0);

        let orch = orchestrator(
            MockMediaProber::new(),
            MockTranscoder::new(),
            storage,
            store.clone(),
            notifier,
            settings(&dir, SuccessPolicy::AnySegment),
        );

        let again = orch.run(&job).await.unwrap();
        assert_eq!(again, failed);
        assert_eq!(store.states(), vec![JobState::Failed]);
    }

    #[tokio::test]
    async fn test_taking_over_running_job_sweeps_abandoned_attempt() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        let stale_work = dir.path().join("work").join("deadbeef");
        std::fs::create_dir_all(&out).unwrap();
        std::fs::create_dir_all(&stale_work).unwrap();
        std::fs::write(out.join("deadbeef_000.mp3"), b"half").unwrap();
        std::fs::write(out.join("deadbeef_001.mp3"), b"half").unwrap();
        std::fs::write(out.join("other_000.mp3"), b"keep").unwrap();
        std::fs::write(stale_work.join("deadbeef_part_000.mka"), b"x").unwrap();

        let store = RecordingStore::default();
        let job = job();
        let abandoned = JobSnapshot::pending(&job)
            .start()
            .unwrap()
            .with_attempt("deadbeef");
        store.put_job_state(&abandoned).await.unwrap();

        let orch = orchestrator(
            probed(),
            transcoder(2, &[]),
            staged(),
            store.clone(),
            quiet_notifier(),
            settings(&dir, SuccessPolicy::AnySegment),
        );
        let done = orch.run(&job).await.unwrap();

        assert_eq!(done.state, JobState::Succeeded);
        let attempt = done.attempt.clone().unwrap();
        assert_ne!(attempt, "deadbeef");
        assert!(done.outputs().iter().all(|o| o.file_name.starts_with(&attempt)));
        assert!(!out.join("deadbeef_000.mp3").exists());
        assert!(!out.join("deadbeef_001.mp3").exists());
        assert!(out.join("other_000.mp3").exists());
        assert!(!stale_work.exists());
        assert_eq!(
            store.states(),
            vec![JobState::Running, JobState::Running, JobState::Succeeded]
        );
    }

    #[tokio::test]
    async fn test_pending_snapshot_from_submission_is_advanced() {
        let dir = tempdir().unwrap();
        let store = RecordingStore::default();
        let job = job();
        store.put_job_state(&JobSnapshot::pending(&job)).await.unwrap();

        let orch = orchestrator(
            probed(),
            transcoder(2, &[]),
            staged(),
            store.clone(),
            quiet_notifier(),
            settings(&dir, SuccessPolicy::AnySegment),
        );

        orch.run(&job).await.unwrap();
        assert_eq!(
            store.states(),
            vec![JobState::Pending, JobState::Running, JobState::Succeeded]
        );
    }
}
