//! Concatenation of reference clips into one output video

use crate::backends::video::{
    even_dimensions, fit_frame, ClipInfo, FrameWriter, VideoBackend, VideoEncodingConfig,
    WriterSettings,
};
use crate::config::{CompositionConfig, DEFAULT_FALLBACK_FPS};
use crate::error::{Result, TranslateError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A clip left out of the output, with the reason
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedClip {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of a successful composition
#[derive(Debug, Clone, Serialize)]
pub struct CompositionReport {
    pub output_path: PathBuf,
    /// Clips whose frames were written, in output order
    pub clips_used: Vec<PathBuf>,
    /// Clips that could not be opened, or failed part-way through decoding
    pub skipped: Vec<SkippedClip>,
    pub frames_written: u64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

struct OpenOutput {
    writer: Box<dyn FrameWriter>,
    width: u32,
    height: u32,
    fps: f64,
    frames_written: u64,
}

/// Writes an ordered list of clips into a single container
///
/// Output geometry and frame rate come from the first clip that opens.
/// Later clips with other dimensions are letterboxed to fit.
pub struct VideoCompositor {
    video: Arc<dyn VideoBackend>,
    encoding: VideoEncodingConfig,
    fallback_fps: f64,
}

impl std::fmt::Debug for VideoCompositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoCompositor")
            .field("encoding", &self.encoding)
            .field("fallback_fps", &self.fallback_fps)
            .finish_non_exhaustive()
    }
}

impl VideoCompositor {
    #[must_use]
    pub fn new(video: Arc<dyn VideoBackend>, config: &CompositionConfig) -> Self {
        Self {
            video,
            encoding: config.encoding.clone(),
            fallback_fps: config.fallback_fps,
        }
    }

    /// Concatenate `clips` into `output_path`
    ///
    /// Missing output directories are created. A clip that cannot be opened
    /// is skipped with a warning; a clip that fails mid-decode keeps the
    /// frames written before the failure and is reported as skipped too.
    ///
    /// # Errors
    /// - `NoValidClips` when no clip contributed a frame; no output file is left behind
    /// - Output directory, encoder or muxer failures; the partial output is removed
    #[tracing::instrument(skip(self, clips, output_path), fields(clips = clips.len(), output = %output_path.display()))]
    pub fn compose<P: AsRef<Path>>(
        &self,
        clips: &[P],
        output_path: &Path,
    ) -> Result<CompositionReport> {
        let mut output: Option<OpenOutput> = None;
        let mut clips_used = Vec::new();
        let mut skipped = Vec::new();

        for clip in clips {
            let clip = clip.as_ref();
            let info = match self.video.probe(clip) {
                Ok(info) => info,
                Err(e) => {
                    log::warn!("Skipping clip {}: {}", clip.display(), e);
                    skipped.push(SkippedClip {
                        path: clip.to_path_buf(),
                        reason: e.to_string(),
                    });
                    continue;
                },
            };

            if output.is_none() {
                match self.open_output(output_path, &info) {
                    Ok(state) => output = Some(state),
                    Err(e) => {
                        // The muxer may have created the file before the encoder failed
                        discard_output(output_path);
                        return Err(e);
                    },
                }
            }
            let Some(state) = output.as_mut() else {
                continue;
            };

            match self.append_clip(state, clip) {
                Ok(frames) => {
                    log::debug!("Appended {} frames from {}", frames, clip.display());
                    clips_used.push(clip.to_path_buf());
                },
                Err(AppendError::Decode { written, error }) => {
                    log::warn!(
                        "Clip {} failed after {} frames: {}",
                        clip.display(),
                        written,
                        error
                    );
                    skipped.push(SkippedClip {
                        path: clip.to_path_buf(),
                        reason: error.to_string(),
                    });
                },
                Err(AppendError::Write(error)) => {
                    drop(output);
                    discard_output(output_path);
                    return Err(error);
                },
            }
        }

        let Some(state) = output else {
            return Err(TranslateError::NoValidClips {
                attempted: clips.len(),
            });
        };

        if state.frames_written == 0 {
            drop(state);
            discard_output(output_path);
            return Err(TranslateError::NoValidClips {
                attempted: clips.len(),
            });
        }

        let OpenOutput {
            writer,
            width,
            height,
            fps,
            frames_written,
        } = state;
        if let Err(e) = writer.finish() {
            discard_output(output_path);
            return Err(e);
        }

        log::info!(
            "Wrote {} frames from {} clips to {} ({} skipped)",
            frames_written,
            clips_used.len(),
            output_path.display(),
            skipped.len()
        );

        Ok(CompositionReport {
            output_path: output_path.to_path_buf(),
            clips_used,
            skipped,
            frames_written,
            fps,
            width,
            height,
        })
    }

    fn open_output(&self, output_path: &Path, first: &ClipInfo) -> Result<OpenOutput> {
        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| TranslateError::file_io_error("create output directory", parent, e))?;
        }

        let (width, height) = even_dimensions(first.width, first.height);
        let fps = if first.fps.is_finite() && first.fps > 0.0 {
            first.fps
        } else if self.fallback_fps.is_finite() && self.fallback_fps > 0.0 {
            log::debug!("First clip declares no frame rate, using {}", self.fallback_fps);
            self.fallback_fps
        } else {
            DEFAULT_FALLBACK_FPS
        };

        let settings = WriterSettings {
            width,
            height,
            fps,
            encoding: self.encoding.clone(),
        };
        let writer = self.video.create_writer(output_path, &settings)?;
        Ok(OpenOutput {
            writer,
            width,
            height,
            fps,
            frames_written: 0,
        })
    }

    fn append_clip(&self, state: &mut OpenOutput, clip: &Path) -> std::result::Result<u64, AppendError> {
        let mut write_error = None;
        let mut written = 0u64;

        let decoded = self.video.for_each_frame(clip, &mut |frame| {
            let frame = fit_frame(frame, state.width, state.height);
            if let Err(e) = state.writer.write_frame(&frame) {
                write_error = Some(e);
                return Err(TranslateError::internal("frame write aborted"));
            }
            state.frames_written += 1;
            written += 1;
            Ok(())
        });

        if let Some(error) = write_error {
            return Err(AppendError::Write(error));
        }
        match decoded {
            Ok(_) => Ok(written),
            Err(error) => Err(AppendError::Decode { written, error }),
        }
    }
}

enum AppendError {
    Decode { written: u64, error: TranslateError },
    Write(TranslateError),
}

fn discard_output(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            log::warn!("Failed to remove partial output {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::InMemoryVideoBackend;

    fn compositor(video: &Arc<InMemoryVideoBackend>) -> VideoCompositor {
        VideoCompositor::new(video.clone(), &CompositionConfig::default())
    }

    #[test]
    fn test_valid_clips_in_order_with_invalid_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let video = Arc::new(InMemoryVideoBackend::new());
        let a = dir.path().join("a.mov");
        let b = dir.path().join("b.mov");
        let c = dir.path().join("c.mov");
        video.add_clip(&a, 2, 16, 8, 24.0);
        video.add_clip(&b, 3, 16, 8, 30.0);
        video.add_clip(&c, 1, 16, 8, 30.0);
        let missing = dir.path().join("missing.mov");

        let output = dir.path().join("out").join("sentence.mp4");
        let report = compositor(&video)
            .compose(&[a.clone(), missing.clone(), b.clone(), c.clone()], &output)
            .unwrap();

        assert_eq!(report.clips_used, vec![a, b, c]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].path, missing);
        assert_eq!(report.frames_written, 6);
        assert!((report.fps - 24.0).abs() < f64::EPSILON);
        assert!(output.exists());

        let written = video.written(&output).unwrap();
        assert_eq!(written.frame_marks, vec![0, 1, 0, 1, 2, 0]);
        assert!(written.finished);
    }

    #[test]
    fn test_no_valid_clips() {
        let dir = tempfile::tempdir().unwrap();
        let video = Arc::new(InMemoryVideoBackend::new());
        let output = dir.path().join("out.mp4");
        let clips = [dir.path().join("x.mov"), dir.path().join("y.mov")];

        let err = compositor(&video).compose(&clips, &output).unwrap_err();
        assert!(matches!(err, TranslateError::NoValidClips { attempted: 2 }));
        assert!(!output.exists());

        let none: [PathBuf; 0] = [];
        let err = compositor(&video).compose(&none, &output).unwrap_err();
        assert!(matches!(err, TranslateError::NoValidClips { attempted: 0 }));
    }

    #[test]
    fn test_clip_failing_before_first_frame_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let video = Arc::new(InMemoryVideoBackend::new());
        let broken = dir.path().join("broken.mov");
        video.add_corrupt_clip(&broken, 5, 0);
        let output = dir.path().join("out.mp4");

        let err = compositor(&video).compose(&[&broken], &output).unwrap_err();
        assert!(matches!(err, TranslateError::NoValidClips { attempted: 1 }));
        assert!(!output.exists());
    }

    #[test]
    fn test_mid_clip_failure_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let video = Arc::new(InMemoryVideoBackend::new());
        let good = dir.path().join("good.mov");
        let corrupt = dir.path().join("corrupt.mov");
        video.add_clip(&good, 2, 8, 8, 25.0);
        video.add_corrupt_clip(&corrupt, 5, 3);
        let output = dir.path().join("out.mp4");

        let report = compositor(&video)
            .compose(&[&good, &corrupt, &good], &output)
            .unwrap();
        assert_eq!(report.clips_used.len(), 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].path, corrupt);
        // Frames decoded before the failure are kept
        assert_eq!(video.written(&output).unwrap().frame_marks, vec![0, 1, 0, 1, 2, 0, 1]);
    }

    #[test]
    fn test_writer_setup_failure_removes_output() {
        let dir = tempfile::tempdir().unwrap();
        let video = Arc::new(InMemoryVideoBackend::new().with_failing_writer_setup());
        let clip = dir.path().join("clip.mov");
        video.add_clip(&clip, 2, 8, 8, 25.0);
        let output = dir.path().join("out").join("sentence.mp4");

        let err = compositor(&video).compose(&[&clip], &output).unwrap_err();
        assert!(matches!(err, TranslateError::Processing(_)));
        assert!(!output.exists());
    }

    #[test]
    fn test_later_clips_letterboxed_to_first_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let video = Arc::new(InMemoryVideoBackend::new());
        let first = dir.path().join("first.mov");
        let wide = dir.path().join("wide.mov");
        video.add_clip(&first, 1, 33, 21, 0.0);
        video.add_clip(&wide, 2, 64, 16, 60.0);
        let output = dir.path().join("out.mp4");

        let report = compositor(&video).compose(&[&first, &wide], &output).unwrap();
        assert_eq!((report.width, report.height), (32, 20));
        assert!((report.fps - DEFAULT_FALLBACK_FPS).abs() < f64::EPSILON);

        let written = video.written(&output).unwrap();
        assert_eq!((written.width, written.height), (32, 20));
        assert_eq!(written.frame_marks.len(), 3);
    }
}
