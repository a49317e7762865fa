use serde::{Deserialize, Serialize};

/// Target encoding applied to every segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingProfile {
    pub codec: String,
    pub bitrate: String,
    pub sample_rate: u32,
    pub channels: u32,
    pub extension: String,
}

impl Default for EncodingProfile {
    fn default() -> Self {
        Self {
            codec: "libmp3lame".to_string(),
            bitrate: "128k".to_string(),
            sample_rate: 44_100,
            channels: 2,
            extension: "mp3".to_string(),
        }
    }
}
