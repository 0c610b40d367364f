//! Output codec selection for composed clips

use crate::error::{Result, TranslateError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Video codec enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    /// H.264 codec (most compatible)
    #[default]
    H264,
    /// H.265/HEVC codec (better compression)
    H265,
    /// MPEG-4 Part 2, built into every FFmpeg (`mp4v`)
    Mpeg4,
    /// VP9 codec (WebM)
    VP9,
}

impl VideoCodec {
    /// Get FFmpeg encoder name
    #[must_use]
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            Self::H264 => "libx264",
            Self::H265 => "libx265",
            Self::Mpeg4 => "mpeg4",
            Self::VP9 => "libvpx-vp9",
        }
    }

    /// Whether the encoder understands x264-style `preset` options
    #[must_use]
    pub fn supports_preset(&self) -> bool {
        matches!(self, Self::H264 | Self::H265)
    }

    /// Parse codec from string
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "h264" | "libx264" | "avc" => Ok(Self::H264),
            "h265" | "libx265" | "hevc" => Ok(Self::H265),
            "mpeg4" | "mp4v" => Ok(Self::Mpeg4),
            "vp9" | "libvpx-vp9" => Ok(Self::VP9),
            _ => Err(TranslateError::invalid_config(format!(
                "Unsupported video codec: {s}. Supported: h264, h265, mpeg4, vp9"
            ))),
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ffmpeg_name())
    }
}

/// Encoder speed preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    /// Fastest encoding, largest file size
    #[default]
    UltraFast,
    /// Balanced encoding speed and quality
    Medium,
    /// Slow encoding, best quality/size ratio
    Slow,
}

impl QualityPreset {
    /// Get FFmpeg preset name
    #[must_use]
    pub fn ffmpeg_preset(&self) -> &'static str {
        match self {
            Self::UltraFast => "ultrafast",
            Self::Medium => "medium",
            Self::Slow => "slow",
        }
    }
}

/// Video encoding configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoEncodingConfig {
    /// Video codec to use
    pub codec: VideoCodec,
    /// Encoder speed preset (ignored by codecs without preset support)
    pub preset: QualityPreset,
    /// Bitrate in kbps (None lets the encoder choose)
    pub bitrate: Option<u32>,
}

impl VideoEncodingConfig {
    /// Create new encoding config with defaults
    #[must_use]
    pub fn new(codec: VideoCodec) -> Self {
        Self {
            codec,
            preset: QualityPreset::default(),
            bitrate: None,
        }
    }

    /// Set quality preset
    #[must_use]
    pub fn with_preset(mut self, preset: QualityPreset) -> Self {
        self.preset = preset;
        self
    }

    /// Set bitrate for bitrate-based encoding
    #[must_use]
    pub fn with_bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = Some(bitrate);
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.bitrate == Some(0) {
            return Err(TranslateError::invalid_config("Bitrate cannot be zero"));
        }
        Ok(())
    }
}

impl Default for VideoEncodingConfig {
    fn default() -> Self {
        Self::new(VideoCodec::default())
    }
}
