//! Split a staged source and encode its segments with bounded concurrency.

use crate::domain::jobs::OutputRef;
use crate::domain::plan::SegmentPlan;
use crate::domain::profile::EncodingProfile;
use crate::domain::segments::SegmentResult;
use crate::ports::media::{EncodeRequest, SplitRequest, TranscodeError, Transcoder};
use futures::stream::{self, StreamExt};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorSettings {
    /// Segments encoded at the same time; zero is treated as one.
    pub segment_concurrency: usize,
    pub split_timeout: Duration,
    pub segment_timeout: Duration,
    pub profile: EncodingProfile,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            segment_concurrency: 2,
            split_timeout: Duration::from_secs(1800),
            segment_timeout: Duration::from_secs(900),
            profile: EncodingProfile::default(),
        }
    }
}

/// Where one processing attempt keeps its files.
///
/// The prefix is fresh per attempt so concurrent or repeated runs of the same
/// job never write to the same paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLayout {
    pub prefix: String,
    pub work_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl JobLayout {
    pub fn new(work_root: &Path, output_dir: &Path) -> Self {
        let prefix = Uuid::new_v4().simple().to_string();
        Self {
            work_dir: work_root.join(&prefix),
            output_dir: output_dir.to_path_buf(),
            prefix,
        }
    }

    pub fn output_file_name(&self, index: usize, extension: &str) -> String {
        format!("{}_{:03}.{}", self.prefix, index, extension)
    }
}

pub struct SegmentExecutor<T> {
    transcoder: T,
    settings: ExecutorSettings,
}

impl<T> SegmentExecutor<T>
where
    T: Transcoder,
{
    pub fn new(transcoder: T, settings: ExecutorSettings) -> Self {
        Self {
            transcoder,
            settings,
        }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Produce one result per split segment, ordered by index.
    ///
    /// Only a failed split is an error; individual encode failures are
    /// reported in the returned results.
    pub async fn execute(
        &self,
        source: &Path,
        plan: &SegmentPlan,
        layout: &JobLayout,
    ) -> Result<Vec<SegmentResult>, TranscodeError> {
        let split = SplitRequest {
            source: source.to_path_buf(),
            work_dir: layout.work_dir.clone(),
            prefix: layout.prefix.clone(),
            segment_seconds: plan.segment_duration_seconds,
            timeout: self.settings.split_timeout,
        };
        let parts = self.transcoder.split(&split).await?;
        info!(
            prefix = %layout.prefix,
            segments = parts.len(),
            segment_seconds = plan.segment_duration_seconds,
            "source split"
        );

        let concurrency = self.settings.segment_concurrency.max(1);
        let mut results: Vec<SegmentResult> = stream::iter(parts.into_iter().enumerate())
            .map(|(index, part)| self.encode_segment(index, part, layout))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        results.sort_by_key(|result| result.index);
        Ok(results)
    }

    async fn encode_segment(&self, index: usize, part: PathBuf, layout: &JobLayout) -> SegmentResult {
        let profile = &self.settings.profile;
        let file_name = layout.output_file_name(index, &profile.extension);
        let request = EncodeRequest {
            input: part,
            output: layout.output_dir.join(&file_name),
            profile: profile.clone(),
            timeout: self.settings.segment_timeout,
        };

        debug!(index, output = %request.output.display(), "encoding segment");
        let outcome = self.transcoder.encode(&request).await;
        remove_if_present(&request.input).await;

        match outcome {
            Ok(()) => SegmentResult::succeeded(index, OutputRef { index, file_name }),
            Err(e) => {
                warn!(index, error = %e, "segment failed");
                remove_if_present(&request.output).await;
                SegmentResult::failed(index, e.to_failure())
            }
        }
    }
}

async fn remove_if_present(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to remove file");
        }
    }
}
