//! ffprobe / ffmpeg backed media capabilities.

use super::cmd::run_command;
use crate::domain::probe::MediaInfo;
use crate::ports::media::{
    EncodeRequest, MediaProber, ProbeError, SplitRequest, TranscodeError, Transcoder,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Container for raw split intermediates. Matroska accepts any audio codec
/// under stream copy.
const INTERMEDIATE_EXTENSION: &str = "mka";

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FfprobeProber {
    binary: String,
}

impl FfprobeProber {
    pub fn new() -> Self {
        Self::with_binary("ffprobe")
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for FfprobeProber {
    fn default() -> Self {
        Self::new()
    }
}

pub fn probe_args(path: &Path) -> Vec<String> {
    vec![
        "-v".to_string(),
        "error".to_string(),
        "-show_entries".to_string(),
        "format=duration,bit_rate".to_string(),
        "-of".to_string(),
        "json".to_string(),
        path.to_string_lossy().into_owned(),
    ]
}

/// Parse ffprobe's JSON. Anything unusable degrades to the defaults of
/// [`MediaInfo::from_raw`].
pub fn parse_probe_output(stdout: &[u8]) -> MediaInfo {
    match serde_json::from_slice::<FfprobeOutput>(stdout) {
        Ok(FfprobeOutput {
            format: Some(format),
        }) => MediaInfo::from_raw(format.duration.as_deref(), format.bit_rate.as_deref()),
        Ok(_) => MediaInfo::from_raw(None, None),
        Err(e) => {
            warn!(error = %e, "unparsable ffprobe output");
            MediaInfo::from_raw(None, None)
        }
    }
}

#[async_trait]
impl MediaProber for FfprobeProber {
    async fn probe(&self, path: &Path, timeout: Duration) -> Result<MediaInfo, ProbeError> {
        let unreadable = |reason: String| ProbeError::UnreadableSource {
            path: path.to_path_buf(),
            reason,
        };

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| unreadable(e.to_string()))?;
        if !metadata.is_file() {
            return Err(unreadable("not a regular file".to_string()));
        }
        if metadata.len() == 0 {
            return Err(unreadable("file is empty".to_string()));
        }

        let output = run_command(&self.binary, &probe_args(path), timeout, true)
            .await
            .map_err(|e| match e {
                TranscodeError::Failed { stderr, status, .. } if !stderr.is_empty() => {
                    unreadable(format!("{status}: {stderr}"))
                }
                other => unreadable(other.to_string()),
            })?;

        let info = parse_probe_output(&output.stdout);
        debug!(
            path = %path.display(),
            duration_seconds = info.duration_seconds,
            bitrate_kbps = info.bitrate_kbps,
            "probed"
        );
        Ok(info)
    }
}

#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    binary: String,
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self::with_binary("ffmpeg")
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

fn part_prefix(prefix: &str) -> String {
    format!("{prefix}_part_")
}

/// Stream-copy the audio into fixed-length intermediates.
pub fn split_args(request: &SplitRequest) -> Vec<String> {
    let pattern = request.work_dir.join(format!(
        "{}%03d.{}",
        part_prefix(&request.prefix),
        INTERMEDIATE_EXTENSION
    ));
    vec![
        "-hide_banner".to_string(),
        "-nostdin".to_string(),
        "-y".to_string(),
        "-v".to_string(),
        "error".to_string(),
        "-i".to_string(),
        request.source.to_string_lossy().into_owned(),
        "-vn".to_string(),
        "-c".to_string(),
        "copy".to_string(),
        "-f".to_string(),
        "segment".to_string(),
        "-segment_time".to_string(),
        request.segment_seconds.to_string(),
        "-reset_timestamps".to_string(),
        "1".to_string(),
        pattern.to_string_lossy().into_owned(),
    ]
}

/// Re-encode one intermediate into the target profile.
pub fn encode_args(request: &EncodeRequest) -> Vec<String> {
    let profile = &request.profile;
    vec![
        "-hide_banner".to_string(),
        "-nostdin".to_string(),
        "-y".to_string(),
        "-v".to_string(),
        "error".to_string(),
        "-fflags".to_string(),
        "+genpts".to_string(),
        "-i".to_string(),
        request.input.to_string_lossy().into_owned(),
        "-vn".to_string(),
        "-c:a".to_string(),
        profile.codec.clone(),
        "-b:a".to_string(),
        profile.bitrate.clone(),
        "-ar".to_string(),
        profile.sample_rate.to_string(),
        "-ac".to_string(),
        profile.channels.to_string(),
        "-avoid_negative_ts".to_string(),
        "make_zero".to_string(),
        request.output.to_string_lossy().into_owned(),
    ]
}

/// Intermediates written for `prefix`, in playback order.
pub async fn list_split_parts(work_dir: &Path, prefix: &str) -> std::io::Result<Vec<PathBuf>> {
    let wanted = part_prefix(prefix);
    let suffix = format!(".{INTERMEDIATE_EXTENSION}");
    let mut parts = Vec::new();
    let mut entries = tokio::fs::read_dir(work_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        let number = name
            .strip_prefix(&wanted)
            .and_then(|rest| rest.strip_suffix(&suffix))
            .and_then(|digits| digits.parse::<u64>().ok());
        if let Some(number) = number {
            parts.push((number, entry.path()));
        }
    }
    // %03d grows past three digits after 999, so sort numerically
    parts.sort_by_key(|(number, _)| *number);
    Ok(parts.into_iter().map(|(_, path)| path).collect())
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn split(&self, request: &SplitRequest) -> Result<Vec<PathBuf>, TranscodeError> {
        tokio::fs::create_dir_all(&request.work_dir).await?;
        run_command(&self.binary, &split_args(request), request.timeout, false).await?;
        Ok(list_split_parts(&request.work_dir, &request.prefix).await?)
    }

    async fn encode(&self, request: &EncodeRequest) -> Result<(), TranscodeError> {
        run_command(&self.binary, &encode_args(request), request.timeout, false).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::plan::DEFAULT_BITRATE_KBPS;
    use crate::domain::profile::EncodingProfile;
    use tempfile::tempdir;

    #[test]
    fn test_parse_probe_output() {
        let info = parse_probe_output(
            br#"{"format": {"duration": "1800.000000", "bit_rate": "320000"}}"#,
        );
        assert_eq!(info.duration_seconds, 1800.0);
        assert_eq!(info.bitrate_kbps, 320);
        assert!(!info.bitrate_defaulted);
    }

    #[test]
    fn test_parse_probe_output_degrades() {
        for raw in [
            &br#"{"format": {"duration": "12.5"}}"#[..],
            &br#"{"format": {"duration": "12.5", "bit_rate": "N/A"}}"#[..],
            &br#"{}"#[..],
            &b"not json"[..],
        ] {
            let info = parse_probe_output(raw);
            assert_eq!(info.bitrate_kbps, DEFAULT_BITRATE_KBPS);
            assert!(info.bitrate_defaulted);
        }
    }

    #[test]
    fn test_split_args() {
        let request = SplitRequest {
            source: PathBuf::from("/up/in.wav"),
            work_dir: PathBuf::from("/work/abc"),
            prefix: "abc".to_string(),
            segment_seconds: 1280,
            timeout: Duration::from_secs(60),
        };
        let args = split_args(&request);
        let joined = args.join(" ");
        assert!(joined.contains("-i /up/in.wav"));
        assert!(joined.contains("-c copy -f segment -segment_time 1280"));
        assert_eq!(args.last().unwrap(), "/work/abc/abc_part_%03d.mka");
    }

    #[test]
    fn test_encode_args_follow_profile() {
        let request = EncodeRequest {
            input: PathBuf::from("/work/abc/abc_part_001.mka"),
            output: PathBuf::from("/out/abc_001.mp3"),
            profile: EncodingProfile::default(),
            timeout: Duration::from_secs(60),
        };
        let joined = encode_args(&request).join(" ");
        assert!(joined.contains("-c:a libmp3lame -b:a 128k -ar 44100 -ac 2"));
        assert!(joined.contains("-fflags +genpts"));
        assert!(joined.ends_with("-avoid_negative_ts make_zero /out/abc_001.mp3"));
    }

    #[tokio::test]
    async fn test_list_split_parts_filters_and_orders() {
        let dir = tempdir().unwrap();
        for name in [
            "abc_part_002.mka",
            "abc_part_000.mka",
            "abc_part_001.mka",
            "xyz_part_000.mka",
            "abc_part_000.tmp",
        ] {
            tokio::fs::write(dir.path().join(name), b"").await.unwrap();
        }

        let parts = list_split_parts(dir.path(), "abc").await.unwrap();
        let names: Vec<String> = parts
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["abc_part_000.mka", "abc_part_001.mka", "abc_part_002.mka"]
        );
    }

    #[tokio::test]
    async fn test_list_split_parts_past_999_keeps_playback_order() {
        let dir = tempdir().unwrap();
        for i in 0..=1001 {
            let name = format!("abc_part_{i:03}.mka");
            tokio::fs::write(dir.path().join(name), b"").await.unwrap();
        }

        let parts = list_split_parts(dir.path(), "abc").await.unwrap();
        assert_eq!(parts.len(), 1002);
        for (i, part) in parts.iter().enumerate() {
            assert_eq!(
                part.file_name().unwrap().to_string_lossy(),
                format!("abc_part_{i:03}.mka")
            );
        }
    }

    #[tokio::test]
    async fn test_probe_rejects_missing_and_empty_files() {
        let dir = tempdir().unwrap();
        let prober = FfprobeProber::new();

        let missing = prober
            .probe(&dir.path().join("nope.wav"), Duration::from_secs(1))
            .await;
        assert!(matches!(missing, Err(ProbeError::UnreadableSource { .. })));

        let empty = dir.path().join("empty.wav");
        tokio::fs::write(&empty, b"").await.unwrap();
        let err = prober.probe(&empty, Duration::from_secs(1)).await.unwrap_err();
        assert!(err.to_string().contains("file is empty"));
    }

    #[tokio::test]
    async fn test_probe_failure_is_unreadable_source() {
        let dir = tempdir().unwrap();
        let garbage = dir.path().join("garbage.wav");
        tokio::fs::write(&garbage, b"definitely not audio").await.unwrap();

        // `false` exits non-zero whatever its arguments
        let prober = FfprobeProber::with_binary("false");
        let err = prober.probe(&garbage, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, ProbeError::UnreadableSource { .. }));
    }
}
