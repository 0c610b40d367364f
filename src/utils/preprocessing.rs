//! Clip tensor preparation for the video classifier

use crate::error::{Result, TranslateError};
use image::{imageops, RgbImage};
use ndarray::{s, Array4, Array5, ArrayView4};
use serde::{Deserialize, Serialize};

/// Spatial size and normalization expected by the network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// Output frame height and width
    pub target_size: [u32; 2],
    /// Per-channel mean subtracted after scaling to `[0, 1]`
    pub normalization_mean: [f32; 3],
    /// Per-channel divisor applied after the mean
    pub normalization_std: [f32; 3],
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        // The released models were trained on plain [0, 1] pixels
        Self {
            target_size: [112, 112],
            normalization_mean: [0.0; 3],
            normalization_std: [1.0; 3],
        }
    }
}

impl PreprocessingConfig {
    /// # Errors
    /// - Zero target size or a zero / non-finite std
    pub fn validate(&self) -> Result<()> {
        if self.target_size.contains(&0) {
            return Err(TranslateError::invalid_config(format!(
                "target size must be non-zero, got {}x{}",
                self.target_size[0], self.target_size[1]
            )));
        }
        if self
            .normalization_std
            .iter()
            .any(|s| !s.is_finite() || *s == 0.0)
        {
            return Err(TranslateError::invalid_config(
                "normalization std must be finite and non-zero",
            ));
        }
        Ok(())
    }
}

/// Turns sampled `(F, H, W, C)` frames into a `(1, C, F, H', W')` float tensor
#[derive(Debug, Clone, Default)]
pub struct ClipPreprocessor {
    config: PreprocessingConfig,
}

impl ClipPreprocessor {
    /// # Errors
    /// - Invalid preprocessing configuration
    pub fn new(config: PreprocessingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &PreprocessingConfig {
        &self.config
    }

    /// Resize each frame bilinearly, scale to `[0, 1]`, normalize and move
    /// channels first with a leading batch axis of one
    ///
    /// # Errors
    /// - Input that is not 3-channel or has an empty axis
    #[allow(clippy::cast_possible_truncation)]
    pub fn preprocess(&self, frames: ArrayView4<'_, u8>) -> Result<Array5<f32>> {
        let (num_frames, src_h, src_w, channels) = frames.dim();
        if channels != 3 {
            return Err(TranslateError::processing(format!(
                "expected 3 colour channels, got {channels}"
            )));
        }
        if num_frames == 0 || src_h == 0 || src_w == 0 {
            return Err(TranslateError::processing(format!(
                "empty frame stack: {num_frames}x{src_h}x{src_w}"
            )));
        }

        let [target_h, target_w] = self.config.target_size;
        let (out_h, out_w) = (target_h as usize, target_w as usize);
        let mean = self.config.normalization_mean;
        let std = self.config.normalization_std;
        let mut tensor = Array5::<f32>::zeros((1, 3, num_frames, out_h, out_w));

        for f in 0..num_frames {
            let frame = frames.slice(s![f, .., .., ..]);
            let raw: Vec<u8> = frame.iter().copied().collect();
            let image = RgbImage::from_raw(src_w as u32, src_h as u32, raw)
                .ok_or_else(|| TranslateError::processing("frame buffer size mismatch"))?;
            let resized = if (src_h, src_w) == (out_h, out_w) {
                image
            } else {
                imageops::resize(&image, target_w, target_h, imageops::FilterType::Triangle)
            };

            for (x, y, pixel) in resized.enumerate_pixels() {
                for c in 0..3 {
                    let value = f32::from(pixel[c]) / 255.0;
                    tensor[[0, c, f, y as usize, x as usize]] = (value - mean[c]) / std[c];
                }
            }
        }

        Ok(tensor)
    }

    /// Convenience wrapper taking owned frames
    ///
    /// # Errors
    /// - See [`ClipPreprocessor::preprocess`]
    pub fn preprocess_owned(&self, frames: &Array4<u8>) -> Result<Array5<f32>> {
        self.preprocess(frames.view())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_shape_and_range() {
        let frames = Array4::<u8>::from_elem((16, 240, 320, 3), 255);
        let tensor = ClipPreprocessor::default().preprocess(frames.view()).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 16, 112, 112]);
        assert!(tensor.iter().all(|v| (*v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_channels_first_layout() {
        let mut frames = Array4::<u8>::zeros((2, 4, 4, 3));
        frames.slice_mut(s![.., .., .., 1]).fill(51);
        frames.slice_mut(s![1, .., .., 2]).fill(255);

        let config = PreprocessingConfig {
            target_size: [4, 4],
            ..PreprocessingConfig::default()
        };
        let tensor = ClipPreprocessor::new(config).unwrap().preprocess(frames.view()).unwrap();
        assert!((tensor[[0, 0, 0, 0, 0]]).abs() < 1e-6);
        assert!((tensor[[0, 1, 0, 2, 3]] - 0.2).abs() < 1e-6);
        assert!((tensor[[0, 2, 0, 1, 1]]).abs() < 1e-6);
        assert!((tensor[[0, 2, 1, 1, 1]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalization_applied() {
        let frames = Array4::<u8>::from_elem((1, 2, 2, 3), 255);
        let config = PreprocessingConfig {
            target_size: [2, 2],
            normalization_mean: [0.5, 0.5, 0.5],
            normalization_std: [0.25, 0.5, 1.0],
        };
        let tensor = ClipPreprocessor::new(config).unwrap().preprocess(frames.view()).unwrap();
        assert!((tensor[[0, 0, 0, 0, 0]] - 2.0).abs() < 1e-6);
        assert!((tensor[[0, 1, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 2, 0, 0, 0]] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_bad_input() {
        let frames = Array4::<u8>::zeros((2, 4, 4, 1));
        assert!(ClipPreprocessor::default().preprocess(frames.view()).is_err());

        let bad = PreprocessingConfig {
            normalization_std: [1.0, 0.0, 1.0],
            ..PreprocessingConfig::default()
        };
        assert!(ClipPreprocessor::new(bad).is_err());
    }
}
