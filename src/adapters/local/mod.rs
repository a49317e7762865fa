//! Local adapters: filesystem, subprocess media tools, webhook, HTTP, and
//! Redis or in-process queue and state store.

pub mod cmd;
pub mod ffmpeg;
pub mod fs;
pub mod http;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod webhook;

pub use ffmpeg::{FfmpegTranscoder, FfprobeProber};
pub use fs::FsAdapter;
pub use memory::{InMemoryQueue, InMemoryStore};
#[cfg(feature = "redis")]
pub use redis::RedisPool;
pub use webhook::WebhookNotifier;

use crate::application::executor::SegmentExecutor;
use crate::application::orchestrator::ConversionOrchestrator;
use crate::config::AppConfig;
use crate::ports::repository::JobStateRepository;

pub type LocalOrchestrator<R> =
    ConversionOrchestrator<FfprobeProber, FfmpegTranscoder, FsAdapter, R, WebhookNotifier>;

/// Orchestrator running ffmpeg on this host and storing state in `repo`.
pub fn local_orchestrator<R>(config: &AppConfig, repo: R) -> Result<LocalOrchestrator<R>, reqwest::Error>
where
    R: JobStateRepository,
{
    Ok(ConversionOrchestrator::new(
        FfprobeProber::new(),
        SegmentExecutor::new(FfmpegTranscoder::new(), config.executor_settings()),
        FsAdapter::new(config.fetch_timeout)?,
        repo,
        WebhookNotifier::new(config.webhook_url.clone(), config.notify_timeout)?,
        config.orchestrator_settings(),
    ))
}
