//! Configuration loaded from the environment.

use crate::application::executor::ExecutorSettings;
use crate::application::orchestrator::OrchestratorSettings;
use crate::domain::plan::SegmentPolicy;
use crate::domain::profile::EncodingProfile;
use crate::domain::segments::SuccessPolicy;
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("{0} and {1} cannot both be set")]
    Conflict(&'static str, &'static str),
}

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    /// HTTP server bind address
    pub addr: String,
    pub port: u16,
    /// Redis connection URL; `None` selects the in-memory queue and store.
    pub redis_url: Option<String>,
    /// Where uploaded sources are written
    pub upload_dir: PathBuf,
    /// Where final artifacts are written and served from
    pub output_dir: PathBuf,
    /// Root of the per-job scratch directories
    pub work_dir: PathBuf,
    /// Public base URL used in download links
    pub server_url: String,
    pub webhook_url: Option<String>,
    pub worker_count: usize,
    pub segment_concurrency: usize,
    pub segment_policy: SegmentPolicy,
    pub success_policy: SuccessPolicy,
    pub split_timeout: Duration,
    pub segment_timeout: Duration,
    pub probe_timeout: Duration,
    pub notify_timeout: Duration,
    pub fetch_timeout: Duration,
    pub queue_poll_interval: Duration,
    pub profile: EncodingProfile,
    /// Expiry of stored job snapshots; `None` keeps them forever.
    pub result_ttl: Option<Duration>,
}

impl AppConfig {
    /// Load configuration from environment variables (and `.env`).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let addr = get("ADDR").unwrap_or_else(|| String::from("127.0.0.1"));
        let port = parse_or(&get, "PORT", 8000u16)?;
        let server_url = get("SERVER_URL").unwrap_or_else(|| format!("http://{addr}:{port}"));

        let segment_policy = match (get("SEGMENT_SECONDS"), get("MAX_SEGMENT_MB")) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::Conflict("SEGMENT_SECONDS", "MAX_SEGMENT_MB"))
            }
            (None, Some(raw)) => {
                let megabytes: f64 = parse("MAX_SEGMENT_MB", &raw)?;
                if !megabytes.is_finite() || megabytes <= 0.0 {
                    return Err(invalid("MAX_SEGMENT_MB", &raw, "must be a positive number"));
                }
                SegmentPolicy::MaxSize { megabytes }
            }
            (Some(raw), None) => SegmentPolicy::FixedDuration {
                seconds: positive("SEGMENT_SECONDS", &raw)?,
            },
            (None, None) => SegmentPolicy::FixedDuration { seconds: 900 },
        };

        let defaults = EncodingProfile::default();
        let profile = EncodingProfile {
            codec: get("TARGET_CODEC").unwrap_or(defaults.codec),
            bitrate: get("TARGET_BITRATE").unwrap_or(defaults.bitrate),
            sample_rate: parse_or(&get, "TARGET_SAMPLE_RATE", defaults.sample_rate)?,
            channels: parse_or(&get, "TARGET_CHANNELS", defaults.channels)?,
            extension: get("OUTPUT_EXTENSION")
                .map(|ext| ext.trim_start_matches('.').to_string())
                .unwrap_or(defaults.extension),
        };

        let config = Self {
            redis_url: get("REDIS_URL"),
            upload_dir: PathBuf::from(get("UPLOAD_DIR").unwrap_or_else(|| String::from("./uploads"))),
            output_dir: PathBuf::from(get("OUTPUT_DIR").unwrap_or_else(|| String::from("./converted"))),
            work_dir: PathBuf::from(get("WORK_DIR").unwrap_or_else(|| String::from("./work"))),
            webhook_url: get("WEBHOOK_URL").or_else(|| get("SLACK_WEBHOOK_URL")),
            worker_count: parse_or(&get, "WORKER_COUNT", 4usize)?,
            segment_concurrency: parse_or(&get, "SEGMENT_CONCURRENCY", 2usize)?,
            segment_policy,
            success_policy: parse_or(&get, "SUCCESS_POLICY", SuccessPolicy::AnySegment)?,
            split_timeout: seconds_or(&get, "SPLIT_TIMEOUT_SECS", 1800)?,
            segment_timeout: seconds_or(&get, "SEGMENT_TIMEOUT_SECS", 900)?,
            probe_timeout: seconds_or(&get, "PROBE_TIMEOUT_SECS", 30)?,
            notify_timeout: seconds_or(&get, "NOTIFY_TIMEOUT_SECS", 10)?,
            fetch_timeout: seconds_or(&get, "FETCH_TIMEOUT_SECS", 600)?,
            queue_poll_interval: seconds_or(&get, "QUEUE_POLL_SECS", 5)?,
            result_ttl: get("RESULT_TTL_SECS")
                .map(|raw| positive::<u64>("RESULT_TTL_SECS", &raw).map(Duration::from_secs))
                .transpose()?,
            profile,
            addr,
            port,
            server_url,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("WORKER_COUNT", self.worker_count),
            ("SEGMENT_CONCURRENCY", self.segment_concurrency),
            ("TARGET_SAMPLE_RATE", self.profile.sample_rate as usize),
            ("TARGET_CHANNELS", self.profile.channels as usize),
        ];
        for (key, value) in non_zero {
            if value == 0 {
                return Err(invalid(key, "0", "must be greater than zero"));
            }
        }
        let timeouts = [
            ("SPLIT_TIMEOUT_SECS", self.split_timeout),
            ("SEGMENT_TIMEOUT_SECS", self.segment_timeout),
            ("PROBE_TIMEOUT_SECS", self.probe_timeout),
            ("NOTIFY_TIMEOUT_SECS", self.notify_timeout),
            ("FETCH_TIMEOUT_SECS", self.fetch_timeout),
            ("QUEUE_POLL_SECS", self.queue_poll_interval),
        ];
        for (key, value) in timeouts {
            if value.is_zero() {
                return Err(invalid(key, "0", "must be greater than zero"));
            }
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }

    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            segment_concurrency: self.segment_concurrency,
            split_timeout: self.split_timeout,
            segment_timeout: self.segment_timeout,
            profile: self.profile.clone(),
        }
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            segment_policy: self.segment_policy,
            success_policy: self.success_policy,
            probe_timeout: self.probe_timeout,
            notify_timeout: self.notify_timeout,
            work_root: self.work_dir.clone(),
            output_dir: self.output_dir.clone(),
            server_url: self.server_url.clone(),
        }
    }
}

fn invalid(key: &'static str, value: &str, reason: impl Display) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse::<T>().map_err(|e| invalid(key, raw, e))
}

fn positive<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr + Default + PartialEq,
    T::Err: Display,
{
    let value = parse::<T>(key, raw)?;
    if value == T::default() {
        return Err(invalid(key, raw, "must be greater than zero"));
    }
    Ok(value)
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => parse(key, &raw),
        None => Ok(default),
    }
}

fn seconds_or<G>(get: &G, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    parse_or(get, key, default).map(Duration::from_secs)
}
