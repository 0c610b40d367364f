//! Fixed-length temporal sampling of clips

use crate::backends::video::{ClipInfo, VideoBackend};
use crate::error::{Result, TranslateError};
use image::RgbImage;
use ndarray::Array4;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Frames per sampled clip used by the released models
pub const DEFAULT_MAX_FRAMES: usize = 16;

/// How `max_frames` indices are chosen from a clip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SamplingStrategy {
    /// Evenly spaced across the whole clip, first and last frame included
    #[default]
    Uniform,
    /// The first `max_frames` frames, padded by repeating the last one
    Leading,
}

/// Exactly `max_frames` frames drawn from one clip
#[derive(Debug, Clone)]
pub struct SampledClip {
    /// Source frame index of each sampled frame
    pub indices: Vec<usize>,
    /// Decoded frames, one per index
    pub frames: Vec<RgbImage>,
    /// What the backend reported about the clip
    pub info: ClipInfo,
}

impl SampledClip {
    /// Stack frames into an `(F, H, W, C)` `u8` array
    ///
    /// # Errors
    /// - Frames of differing dimensions
    pub fn to_array(&self) -> Result<Array4<u8>> {
        let (width, height) = self
            .frames
            .first()
            .map(RgbImage::dimensions)
            .ok_or_else(|| TranslateError::processing("sampled clip has no frames"))?;

        let mut data = Vec::with_capacity(self.frames.len() * (width * height * 3) as usize);
        for frame in &self.frames {
            if frame.dimensions() != (width, height) {
                return Err(TranslateError::processing(format!(
                    "frame size changed mid-clip: {}x{} vs {}x{}",
                    frame.width(),
                    frame.height(),
                    width,
                    height
                )));
            }
            data.extend_from_slice(frame.as_raw());
        }

        Array4::from_shape_vec(
            (self.frames.len(), height as usize, width as usize, 3),
            data,
        )
        .map_err(|e| TranslateError::processing(format!("failed to stack frames: {e}")))
    }
}

/// Deterministic frame index selection
#[derive(Debug, Clone, Copy)]
pub struct FrameSampler {
    max_frames: usize,
    strategy: SamplingStrategy,
}

impl FrameSampler {
    /// # Errors
    /// - `max_frames` is zero
    pub fn new(max_frames: usize, strategy: SamplingStrategy) -> Result<Self> {
        if max_frames == 0 {
            return Err(TranslateError::config_value_error(
                "max_frames",
                max_frames,
                ">= 1",
                Some(DEFAULT_MAX_FRAMES),
            ));
        }
        Ok(Self {
            max_frames,
            strategy,
        })
    }

    #[must_use]
    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    #[must_use]
    pub fn strategy(&self) -> SamplingStrategy {
        self.strategy
    }

    /// Frame indices to decode from a clip of `total_frames` frames
    ///
    /// Always returns exactly `max_frames` non-decreasing indices below
    /// `total_frames`. Uniform sampling picks `round(i * (total - 1) / (F - 1))`,
    /// which repeats indices when the clip is shorter than `F`. Halfway
    /// positions round up (6 frames sampled to 3 gives `[0, 3, 5]`), unlike a
    /// truncating `linspace(..).astype(int)` which gives `[0, 2, 5]`.
    ///
    /// # Errors
    /// - `total_frames` is zero
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn indices(&self, total_frames: usize) -> Result<Vec<usize>> {
        if total_frames == 0 {
            return Err(TranslateError::processing("cannot sample a clip with zero frames"));
        }

        let last = total_frames - 1;
        let indices = match self.strategy {
            SamplingStrategy::Uniform if self.max_frames == 1 => vec![0],
            SamplingStrategy::Uniform => {
                let step = last as f64 / (self.max_frames - 1) as f64;
                (0..self.max_frames)
                    .map(|i| ((i as f64 * step).round() as usize).min(last))
                    .collect()
            },
            SamplingStrategy::Leading => (0..self.max_frames).map(|i| i.min(last)).collect(),
        };
        Ok(indices)
    }

    /// Probe `path`, pick indices and decode those frames
    ///
    /// # Errors
    /// - `ClipUnreadable` if the clip is missing, undecodable or empty
    #[tracing::instrument(skip(self, video), fields(max_frames = self.max_frames))]
    pub fn sample(&self, video: &dyn VideoBackend, path: &Path) -> Result<SampledClip> {
        let info = video.probe(path)?;
        let indices = self
            .indices(info.frame_count)
            .map_err(|e| TranslateError::clip_unreadable(path, e.to_string()))?;
        let frames = video.read_frames(path, &indices)?;

        if frames.len() != indices.len() {
            return Err(TranslateError::clip_unreadable(
                path,
                format!("decoded {} of {} sampled frames", frames.len(), indices.len()),
            ));
        }

        log::debug!(
            "Sampled {} frames from {} ({} total)",
            frames.len(),
            path.display(),
            info.frame_count
        );
        Ok(SampledClip {
            indices,
            frames,
            info,
        })
    }
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self {
            max_frames: DEFAULT_MAX_FRAMES,
            strategy: SamplingStrategy::default(),
        }
    }
}
