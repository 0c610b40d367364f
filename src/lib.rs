#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Sign Translate
//!
//! Bidirectional sign language translation on top of ONNX Runtime, Tract and
//! FFmpeg.
//!
//! - **Sign to text**: a clip is sampled to a fixed number of frames, run
//!   through a 3D CNN video classifier and decoded into ranked labels.
//! - **Text to sign**: a sentence is decomposed into phrases found in a
//!   directory of reference clips, and those clips are concatenated into one
//!   video.
//!
//! ## Features
//!
//! - **Model bundles**: weights, labels and input geometry validated together at load time
//! - **Multiple Backends**: ONNX Runtime (CUDA, `CoreML`, CPU) and Tract (pure Rust)
//! - **Matching strategies**: maximum phrase count (skips unknown words) or greedy longest window
//! - **Video I/O**: FFmpeg decoding and encoding behind a swappable trait
//! - **CLI Integration**: Optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sign_translate::{ClassifierConfig, ExecutionProvider, SignClassifier};
//! use std::path::Path;
//!
//! # #[cfg(feature = "video-support")]
//! # fn example() -> sign_translate::Result<()> {
//! let config = ClassifierConfig::builder()
//!     .bundle_dir("models/wlasl100")
//!     .execution_provider(ExecutionProvider::Auto)
//!     .build()?;
//! let mut classifier = SignClassifier::new(&config)?;
//!
//! for prediction in classifier.classify(Path::new("clip.mov"), 3)? {
//!     println!("{}: {:.1}%", prediction.label, prediction.confidence * 100.0);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ```rust,no_run
//! use sign_translate::{CompositionConfig, MatchStrategy, TextToSignPipeline};
//! use std::path::Path;
//!
//! # #[cfg(feature = "video-support")]
//! # fn example() -> sign_translate::Result<()> {
//! let config = CompositionConfig::builder()
//!     .strategy(MatchStrategy::DynamicProgramming)
//!     .build()?;
//! let pipeline = TextToSignPipeline::new(&config)?;
//! let report = pipeline.generate("how are you", Path::new("dataset"), Path::new("out/how.mp4"))?;
//! println!("{} clips, {} frames", report.composition.clips_used.len(), report.composition.frames_written);
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with GPU acceleration support
//! - `tract` (default): Pure Rust backend
//! - `video-support` (default): FFmpeg clip decoding and encoding
//! - `cli` (default): Command-line interface
//! - `tracing-json`, `tracing-files`: extra log output formats for the CLI

pub mod backends;
pub mod bundle;
pub mod classifier;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod error;
pub mod inference;
pub mod labels;
pub mod phrases;
pub mod sampling;
pub mod store;
pub mod text_to_sign;
pub mod tracing_config;
pub mod utils;

#[cfg(feature = "video-support")]
use std::path::Path;

// Public API exports
pub use backends::video::{ClipInfo, FrameWriter, VideoBackend, VideoCodec, VideoFormat};
#[cfg(feature = "video-support")]
pub use backends::video::FFmpegBackend;
#[cfg(feature = "onnx")]
pub use backends::OnnxBackend;
#[cfg(feature = "tract")]
pub use backends::TractBackend;
pub use bundle::{Backbone, BundleManifest, BundleOptions, InputGeometry, ModelBundle};
pub use classifier::{Prediction, SignClassifier};
pub use compositor::{CompositionReport, SkippedClip, VideoCompositor};
pub use config::{
    BackendType, ClassifierConfig, CompositionConfig, ExecutionProvider, TranslatorConfig,
};
pub use error::{ErrorKind, Result, TranslateError};
pub use inference::{BackendFactory, DefaultBackendFactory, InferenceBackend};
pub use labels::LabelCodec;
pub use phrases::{DatasetLayout, MatchSegment, MatchStrategy, PhraseLibrary, PhraseMatcher};
pub use sampling::{FrameSampler, SamplingStrategy};
pub use store::{TranslationRecord, TranslationStore};
pub use text_to_sign::{GenerationReport, TextToSignPipeline};
pub use tracing_config::{spans, TracingConfig, TracingFormat, TracingOutput};
pub use utils::{ExecutionProviderManager, ProviderInfo};

/// Classify one clip with a freshly loaded model
///
/// Loads the bundle on every call; keep a [`SignClassifier`] around to
/// classify many clips.
///
/// # Errors
/// - `ModelLoad` for bundle problems
/// - `ClipUnreadable` for a missing or undecodable clip
/// - `Inference` for runtime failures
#[cfg(feature = "video-support")]
pub fn classify_clip(clip: &Path, config: &ClassifierConfig) -> Result<Vec<Prediction>> {
    let mut classifier = SignClassifier::new(config)?;
    classifier.classify(clip, config.top_k)
}

/// Compose the sign video for `sentence` from the clips in `dataset_dir`
///
/// # Errors
/// - `NoPhraseMatch` when the sentence cannot be decomposed
/// - `NoValidClips` when none of the matched clips can be opened
/// - Dataset, output directory or encoder failures
#[cfg(feature = "video-support")]
pub fn generate_sign_video(
    sentence: &str,
    dataset_dir: &Path,
    output_path: &Path,
    config: &CompositionConfig,
) -> Result<GenerationReport> {
    TextToSignPipeline::new(config)?.generate(sentence, dataset_dir, output_path)
}
