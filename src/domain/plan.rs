//! Segment sizing.
//!
//! The planner only decides how long each segment should be. The number of
//! segments is whatever the split stage yields for that duration.

use serde::{Deserialize, Serialize};

/// Bitrate assumed when the probe cannot tell.
pub const DEFAULT_BITRATE_KBPS: u32 = 128;

/// Lower bound for a planned segment, in seconds.
pub const MIN_SEGMENT_SECONDS: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum SegmentPolicy {
    /// Cut every `seconds`, whatever the bitrate.
    FixedDuration { seconds: u32 },
    /// Keep every artifact under `megabytes` at the measured bitrate.
    MaxSize { megabytes: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentPlan {
    pub source_duration_seconds: f64,
    pub source_bitrate_kbps: u32,
    pub segment_duration_seconds: u32,
}

/// One expected slice of the source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentSpan {
    pub index: usize,
    pub start_seconds: f64,
    pub length_seconds: f64,
}

/// Replace an unknown bitrate with [`DEFAULT_BITRATE_KBPS`].
pub fn effective_bitrate(bitrate_kbps: u32) -> u32 {
    if bitrate_kbps == 0 {
        DEFAULT_BITRATE_KBPS
    } else {
        bitrate_kbps
    }
}

pub fn plan(duration_seconds: f64, bitrate_kbps: u32, policy: SegmentPolicy) -> SegmentPlan {
    let source_duration_seconds = if duration_seconds.is_finite() && duration_seconds > 0.0 {
        duration_seconds
    } else {
        0.0
    };
    let source_bitrate_kbps = effective_bitrate(bitrate_kbps);

    let segment_duration_seconds = match policy {
        SegmentPolicy::FixedDuration { seconds } => seconds.max(MIN_SEGMENT_SECONDS),
        SegmentPolicy::MaxSize { megabytes } => size_bounded_seconds(megabytes, source_bitrate_kbps),
    };

    SegmentPlan {
        source_duration_seconds,
        source_bitrate_kbps,
        segment_duration_seconds,
    }
}

/// `floor(S * 8 * 1024 / b)`, clamped to at least one second.
fn size_bounded_seconds(megabytes: f64, bitrate_kbps: u32) -> u32 {
    if !megabytes.is_finite() || megabytes <= 0.0 {
        return MIN_SEGMENT_SECONDS;
    }
    let raw = (megabytes * 8.0 * 1024.0 / f64::from(effective_bitrate(bitrate_kbps))).floor();
    if raw >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        (raw as u32).max(MIN_SEGMENT_SECONDS)
    }
}

impl SegmentPlan {
    pub fn expected_segment_count(&self) -> usize {
        (self.source_duration_seconds / f64::from(self.segment_duration_seconds)).ceil() as usize
    }

    pub fn segment_boundaries(&self) -> Vec<SegmentSpan> {
        let step = f64::from(self.segment_duration_seconds);
        let mut spans = Vec::with_capacity(self.expected_segment_count());
        let mut start = 0.0;
        while start < self.source_duration_seconds {
            spans.push(SegmentSpan {
                index: spans.len(),
                start_seconds: start,
                length_seconds: step.min(self.source_duration_seconds - start),
            });
            start += step;
        }
        spans
    }
}
