use super::plan::DEFAULT_BITRATE_KBPS;
use serde::{Deserialize, Serialize};

/// What the probe learned about a source file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub duration_seconds: f64,
    pub bitrate_kbps: u32,
    /// Set when `bitrate_kbps` is the fallback rather than a measurement.
    pub bitrate_defaulted: bool,
}

impl MediaInfo {
    /// Build from the raw textual values reported by the inspection tool.
    ///
    /// `bit_rate` is in bits per second. Anything missing, non-numeric or
    /// non-positive degrades to [`DEFAULT_BITRATE_KBPS`]; a bad duration
    /// degrades to zero.
    pub fn from_raw(duration: Option<&str>, bit_rate: Option<&str>) -> Self {
        let duration_seconds = duration
            .and_then(parse_positive)
            .unwrap_or(0.0);

        let measured = bit_rate
            .and_then(parse_positive)
            .map(|bps| (bps / 1000.0).round())
            .filter(|kbps| *kbps >= 1.0)
            .map(|kbps| kbps.min(f64::from(u32::MAX)) as u32);

        Self {
            duration_seconds,
            bitrate_kbps: measured.unwrap_or(DEFAULT_BITRATE_KBPS),
            bitrate_defaulted: measured.is_none(),
        }
    }
}

fn parse_positive(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value > 0.0)
}
