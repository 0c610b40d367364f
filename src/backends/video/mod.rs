//! Video backend module
//!
//! Clip decoding for the classifier's frame sampler and clip encoding for the
//! compositor sit behind [`VideoBackend`], so the pipelines never talk to FFmpeg
//! directly. The FFmpeg implementation is only compiled with `video-support`.

pub mod codec;
pub mod frame;

#[cfg(feature = "video-support")]
pub mod ffmpeg;

pub use codec::*;
pub use frame::*;

#[cfg(feature = "video-support")]
pub use ffmpeg::*;

use crate::error::Result;
use image::RgbImage;
use serde::Serialize;
use std::path::Path;

/// Container formats recognized as reference clips
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    /// MP4 format (H.264/H.265)
    Mp4,
    /// AVI format
    Avi,
    /// MOV format (QuickTime)
    Mov,
    /// MKV format (Matroska)
    Mkv,
    /// WebM format
    WebM,
}

impl VideoFormat {
    /// Get file extension for the video format
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Avi => "avi",
            Self::Mov => "mov",
            Self::Mkv => "mkv",
            Self::WebM => "webm",
        }
    }

    /// Detect format from file extension, ignoring case (`.MOV` is common on phones)
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "mp4" | "m4v" => Some(Self::Mp4),
            "avi" => Some(Self::Avi),
            "mov" => Some(Self::Mov),
            "mkv" => Some(Self::Mkv),
            "webm" => Some(Self::WebM),
            _ => None,
        }
    }

    /// Detect format from a path's extension
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// All recognized formats
    #[must_use]
    pub fn all() -> &'static [Self] {
        &[Self::Mp4, Self::Avi, Self::Mov, Self::Mkv, Self::WebM]
    }
}

/// Basic facts about a decodable clip
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClipInfo {
    /// Number of decodable frames (never zero for a clip returned by `probe`)
    pub frame_count: usize,
    /// Average frame rate; `0.0` when the container does not declare one
    pub fps: f64,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

/// Parameters for a new output clip
#[derive(Debug, Clone)]
pub struct WriterSettings {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub encoding: VideoEncodingConfig,
}

/// Sink for RGB frames that become one output clip
pub trait FrameWriter {
    /// Append a frame; its dimensions must match the writer's settings
    ///
    /// # Errors
    /// - Frame dimensions differ from the configured output size
    /// - Encoder or muxer failures
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;

    /// Flush pending data and close the container, returning the frame count
    ///
    /// # Errors
    /// - Encoder flush or trailer write failures
    fn finish(self: Box<Self>) -> Result<u64>;
}

/// Decoding and encoding of clips addressed by path
pub trait VideoBackend: Send + Sync {
    /// Open a clip and report its frame count, rate and dimensions
    ///
    /// # Errors
    /// - `ClipUnreadable` if the file is missing, undecodable or has zero frames
    fn probe(&self, path: &Path) -> Result<ClipInfo>;

    /// Decode the frames at `indices` (ascending, repeats allowed), one image per index
    ///
    /// Indices past the last decodable frame repeat the last frame returned.
    ///
    /// # Errors
    /// - `ClipUnreadable` if the clip cannot be opened or yields no frames
    fn read_frames(&self, path: &Path, indices: &[usize]) -> Result<Vec<RgbImage>>;

    /// Decode every frame in order, handing each to `visit`; returns the frame count
    ///
    /// Decoding stops at the first error returned by `visit`.
    ///
    /// # Errors
    /// - `ClipUnreadable` if the clip cannot be opened
    /// - Any error returned by `visit`
    fn for_each_frame(
        &self,
        path: &Path,
        visit: &mut dyn FnMut(RgbImage) -> Result<()>,
    ) -> Result<usize>;

    /// Create the output container at `output_path`
    ///
    /// # Errors
    /// - No usable encoder, or the container cannot be created
    fn create_writer(
        &self,
        output_path: &Path,
        settings: &WriterSettings,
    ) -> Result<Box<dyn FrameWriter>>;

    /// Get supported video formats
    fn supported_formats(&self) -> &[VideoFormat] {
        VideoFormat::all()
    }
}
