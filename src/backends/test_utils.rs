//! Test utilities and mock backends
//!
//! Mock implementations of `InferenceBackend` and `VideoBackend` so both
//! pipelines can be exercised without model files, ONNX Runtime or FFmpeg.

use crate::{
    backends::video::{ClipInfo, FrameWriter, VideoBackend, WriterSettings},
    bundle::ModelBundle,
    config::ClassifierConfig,
    error::{Result, TranslateError},
    inference::InferenceBackend,
};
use image::{Rgb, RgbImage};
use ndarray::{Array2, Array5};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock inference backend returning deterministic logits
#[derive(Debug, Clone)]
pub struct MockInferenceBackend {
    initialized: bool,
    num_classes: usize,
    reported_width: Option<usize>,
    fixed_logits: Option<Vec<f32>>,
    call_history: Arc<Mutex<Vec<String>>>,
    should_fail_init: bool,
    should_fail_inference: bool,
}

impl MockInferenceBackend {
    /// Backend emitting `num_classes` logits and reporting that width
    #[must_use]
    pub fn new(num_classes: usize) -> Self {
        Self {
            initialized: false,
            num_classes,
            reported_width: Some(num_classes),
            fixed_logits: None,
            call_history: Arc::new(Mutex::new(Vec::new())),
            should_fail_init: false,
            should_fail_inference: false,
        }
    }

    /// Backend that always returns `logits`
    #[must_use]
    pub fn with_logits(logits: Vec<f32>) -> Self {
        let mut backend = Self::new(logits.len());
        backend.fixed_logits = Some(logits);
        backend
    }

    /// Override the width reported after initialization
    #[must_use]
    pub fn reporting_width(mut self, width: Option<usize>) -> Self {
        self.reported_width = width;
        self
    }

    #[must_use]
    pub fn new_failing_init(num_classes: usize) -> Self {
        let mut backend = Self::new(num_classes);
        backend.should_fail_init = true;
        backend
    }

    #[must_use]
    pub fn new_failing_inference(num_classes: usize) -> Self {
        let mut backend = Self::new(num_classes);
        backend.should_fail_inference = true;
        backend
    }

    /// Shared handle on the call history, usable after the backend is boxed
    #[must_use]
    pub fn call_history(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.call_history)
    }

    fn record_call(&self, method: &str) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(method.to_string());
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn generate_logits(&self, input: &Array5<f32>) -> Vec<f32> {
        let mean = input.mean().unwrap_or(0.0);
        (0..self.num_classes)
            .map(|k| ((k as f32 + 1.0) * (mean + 0.5)).sin())
            .collect()
    }
}

impl InferenceBackend for MockInferenceBackend {
    fn initialize(
        &mut self,
        _bundle: &ModelBundle,
        _config: &ClassifierConfig,
    ) -> Result<Option<Duration>> {
        self.record_call("initialize");
        if self.should_fail_init {
            return Err(TranslateError::model_load("Mock initialization failure"));
        }
        if self.initialized {
            return Ok(None);
        }
        self.initialized = true;
        Ok(Some(Duration::from_millis(1)))
    }

    fn infer(&mut self, input: &Array5<f32>) -> Result<Array2<f32>> {
        self.record_call("infer");
        if !self.initialized {
            return Err(TranslateError::internal("Backend not initialized"));
        }
        if self.should_fail_inference {
            return Err(TranslateError::inference("Mock inference failure"));
        }
        let logits = self
            .fixed_logits
            .clone()
            .unwrap_or_else(|| self.generate_logits(input));
        let width = logits.len();
        Array2::from_shape_vec((1, width), logits)
            .map_err(|e| TranslateError::internal(e.to_string()))
    }

    fn output_width(&self) -> Option<usize> {
        self.initialized.then_some(self.reported_width).flatten()
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[derive(Debug, Clone)]
struct MemoryClip {
    frame_count: usize,
    width: u32,
    height: u32,
    fps: f64,
    fail_at: Option<usize>,
}

/// What a mock writer received
#[derive(Debug, Clone, Default)]
pub struct WrittenVideo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Red channel of the top-left pixel of each frame, in write order
    pub frame_marks: Vec<u8>,
    pub finished: bool,
}

/// In-memory video backend
///
/// Frame `i` of every clip is a solid image with all channels set to `i % 256`,
/// which lets tests check which frames were sampled or written. Writers
/// create a placeholder file at the output path when opened, like a real
/// muxer writing its header.
#[derive(Debug, Default)]
pub struct InMemoryVideoBackend {
    clips: Mutex<HashMap<PathBuf, MemoryClip>>,
    outputs: Arc<Mutex<HashMap<PathBuf, WrittenVideo>>>,
    writer_setup_fails: bool,
}

impl InMemoryVideoBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writers create the output file and then fail to open the encoder
    #[must_use]
    pub fn with_failing_writer_setup(mut self) -> Self {
        self.writer_setup_fails = true;
        self
    }

    /// Register a decodable clip
    pub fn add_clip(&self, path: &Path, frame_count: usize, width: u32, height: u32, fps: f64) {
        self.insert(path, MemoryClip {
            frame_count,
            width,
            height,
            fps,
            fail_at: None,
        });
    }

    /// Register a clip whose decoding fails at frame `fail_at`
    pub fn add_corrupt_clip(&self, path: &Path, frame_count: usize, fail_at: usize) {
        self.insert(path, MemoryClip {
            frame_count,
            width: 8,
            height: 8,
            fps: 25.0,
            fail_at: Some(fail_at),
        });
    }

    fn insert(&self, path: &Path, clip: MemoryClip) {
        if let Ok(mut clips) = self.clips.lock() {
            clips.insert(path.to_path_buf(), clip);
        }
    }

    /// Snapshot of what was written to `path`
    #[must_use]
    pub fn written(&self, path: &Path) -> Option<WrittenVideo> {
        self.outputs.lock().ok()?.get(path).cloned()
    }

    fn clip(&self, path: &Path) -> Result<MemoryClip> {
        let clip = self
            .clips
            .lock()
            .map_err(|_| TranslateError::internal("clip registry poisoned"))?
            .get(path)
            .cloned()
            .ok_or_else(|| TranslateError::clip_unreadable(path, "file not found"))?;
        if clip.frame_count == 0 {
            return Err(TranslateError::clip_unreadable(path, "clip has zero frames"));
        }
        Ok(clip)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn frame(clip: &MemoryClip, index: usize) -> RgbImage {
        let value = (index % 256) as u8;
        RgbImage::from_pixel(clip.width, clip.height, Rgb([value, value, value]))
    }
}

impl VideoBackend for InMemoryVideoBackend {
    fn probe(&self, path: &Path) -> Result<ClipInfo> {
        let clip = self.clip(path)?;
        if clip.fail_at == Some(0) {
            return Err(TranslateError::clip_unreadable(path, "cannot create decoder"));
        }
        Ok(ClipInfo {
            frame_count: clip.frame_count,
            fps: clip.fps,
            width: clip.width,
            height: clip.height,
        })
    }

    fn read_frames(&self, path: &Path, indices: &[usize]) -> Result<Vec<RgbImage>> {
        let clip = self.clip(path)?;
        let last = clip.frame_count - 1;
        indices
            .iter()
            .map(|&i| {
                let i = i.min(last);
                match clip.fail_at {
                    Some(fail) if i >= fail => {
                        Err(TranslateError::clip_unreadable(path, "corrupt packet"))
                    },
                    _ => Ok(Self::frame(&clip, i)),
                }
            })
            .collect()
    }

    fn for_each_frame(
        &self,
        path: &Path,
        visit: &mut dyn FnMut(RgbImage) -> Result<()>,
    ) -> Result<usize> {
        let clip = self.clip(path)?;
        for i in 0..clip.frame_count {
            if clip.fail_at == Some(i) {
                return Err(TranslateError::clip_unreadable(path, "corrupt packet"));
            }
            visit(Self::frame(&clip, i))?;
        }
        Ok(clip.frame_count)
    }

    fn create_writer(
        &self,
        output_path: &Path,
        settings: &WriterSettings,
    ) -> Result<Box<dyn FrameWriter>> {
        std::fs::write(output_path, b"")
            .map_err(|e| TranslateError::file_io_error("create output", output_path, e))?;
        if self.writer_setup_fails {
            return Err(TranslateError::processing("Failed to open encoder"));
        }
        let video = WrittenVideo {
            width: settings.width,
            height: settings.height,
            fps: settings.fps,
            ..WrittenVideo::default()
        };
        if let Ok(mut outputs) = self.outputs.lock() {
            outputs.insert(output_path.to_path_buf(), video);
        }
        Ok(Box::new(MemoryWriter {
            path: output_path.to_path_buf(),
            width: settings.width,
            height: settings.height,
            outputs: Arc::clone(&self.outputs),
            frames: 0,
        }))
    }
}

struct MemoryWriter {
    path: PathBuf,
    width: u32,
    height: u32,
    outputs: Arc<Mutex<HashMap<PathBuf, WrittenVideo>>>,
    frames: u64,
}

impl FrameWriter for MemoryWriter {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(TranslateError::processing("frame size does not match writer"));
        }
        let mark = frame.get_pixel(0, 0)[0];
        let mut outputs = self
            .outputs
            .lock()
            .map_err(|_| TranslateError::internal("output registry poisoned"))?;
        if let Some(video) = outputs.get_mut(&self.path) {
            video.frame_marks.push(mark);
        }
        self.frames += 1;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<u64> {
        let mut outputs = self
            .outputs
            .lock()
            .map_err(|_| TranslateError::internal("output registry poisoned"))?;
        if let Some(video) = outputs.get_mut(&self.path) {
            video.finished = true;
        }
        Ok(self.frames)
    }
}
