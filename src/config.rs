//! Configuration types for both translation pipelines

use crate::backends::video::{VideoCodec, VideoEncodingConfig};
use crate::error::{Result, TranslateError};
use crate::phrases::{DatasetLayout, MatchStrategy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

/// Inference engine used to run the exported network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// ONNX Runtime backend (supports GPU acceleration)
    #[default]
    Onnx,
    /// Tract backend (pure Rust, no external dependencies)
    Tract,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
        }
    }
}

/// Default number of predictions returned by `classify`
pub const DEFAULT_TOP_K: usize = 1;

/// Frame rate used when the first clip does not report a usable one
pub const DEFAULT_FALLBACK_FPS: f64 = 30.0;

/// Configuration for the sign-to-text pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Directory holding `model.onnx`, `labels.json` and `bundle.json`
    pub bundle_dir: PathBuf,

    /// Inference engine
    pub backend_type: BackendType,

    /// Execution provider, resolved once when the model is loaded
    pub execution_provider: ExecutionProvider,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Number of inter-op threads for inference (0 = auto)
    pub inter_threads: usize,

    /// Number of predictions returned when the caller does not ask for a count
    pub top_k: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            bundle_dir: PathBuf::from("models/sign"),
            backend_type: BackendType::default(),
            execution_provider: ExecutionProvider::default(),
            intra_threads: 0,
            inter_threads: 0,
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl ClassifierConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    /// ```rust
    /// use sign_translate::{BackendType, ClassifierConfig, ExecutionProvider};
    ///
    /// let config = ClassifierConfig::builder()
    ///     .bundle_dir("models/asl-r3d")
    ///     .backend_type(BackendType::Tract)
    ///     .execution_provider(ExecutionProvider::Cpu)
    ///     .top_k(3)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.top_k, 3);
    /// ```
    #[must_use]
    pub fn builder() -> ClassifierConfigBuilder {
        ClassifierConfigBuilder::default()
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - `top_k` is zero
    /// - Tract backend combined with a GPU execution provider
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(TranslateError::config_value_error(
                "top_k",
                self.top_k,
                ">= 1",
                Some(DEFAULT_TOP_K),
            ));
        }

        if self.backend_type == BackendType::Tract
            && matches!(
                self.execution_provider,
                ExecutionProvider::Cuda | ExecutionProvider::CoreMl
            )
        {
            return Err(TranslateError::invalid_config(format!(
                "Tract backend only runs on CPU, got execution provider '{}'",
                self.execution_provider
            )));
        }

        Ok(())
    }
}

/// Builder for `ClassifierConfig`
#[derive(Debug, Default)]
pub struct ClassifierConfigBuilder {
    config: ClassifierConfig,
}

impl ClassifierConfigBuilder {
    /// Set the model bundle directory
    #[must_use]
    pub fn bundle_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.bundle_dir = dir.into();
        self
    }

    /// Set the inference engine
    #[must_use]
    pub fn backend_type(mut self, backend_type: BackendType) -> Self {
        self.config.backend_type = backend_type;
        self
    }

    /// Set execution provider
    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    /// Set both intra and inter threads (inter = half of intra, minimum 1; 0 = auto)
    #[must_use]
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self.config.inter_threads = if threads > 0 { (threads / 2).max(1) } else { 0 };
        self
    }

    /// Set default number of predictions
    #[must_use]
    pub fn top_k(mut self, top_k: usize) -> Self {
        self.config.top_k = top_k;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Any failure reported by [`ClassifierConfig::validate`]
    pub fn build(self) -> Result<ClassifierConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration for the text-to-sign pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositionConfig {
    /// How reference clips are arranged under the dataset directory
    pub layout: DatasetLayout,

    /// Sentence decomposition strategy
    pub strategy: MatchStrategy,

    /// Output encoder settings
    pub encoding: VideoEncodingConfig,

    /// Frame rate used when the first clip does not declare one
    pub fallback_fps: f64,
}

impl Default for CompositionConfig {
    fn default() -> Self {
        Self {
            layout: DatasetLayout::default(),
            strategy: MatchStrategy::default(),
            encoding: VideoEncodingConfig::new(VideoCodec::Mpeg4),
            fallback_fps: DEFAULT_FALLBACK_FPS,
        }
    }
}

impl CompositionConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> CompositionConfigBuilder {
        CompositionConfigBuilder::default()
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Greedy window of zero
    /// - Non-positive or non-finite fallback frame rate
    /// - Invalid encoder settings
    pub fn validate(&self) -> Result<()> {
        if let MatchStrategy::Greedy { max_window } = self.strategy {
            if max_window == 0 {
                return Err(TranslateError::config_value_error(
                    "max_window",
                    max_window,
                    ">= 1",
                    Some(crate::phrases::DEFAULT_MAX_WINDOW),
                ));
            }
        }

        if !self.fallback_fps.is_finite() || self.fallback_fps <= 0.0 {
            return Err(TranslateError::config_value_error(
                "fallback_fps",
                self.fallback_fps,
                "> 0",
                Some(DEFAULT_FALLBACK_FPS),
            ));
        }

        self.encoding.validate()
    }
}

/// Builder for `CompositionConfig`
#[derive(Debug, Default)]
pub struct CompositionConfigBuilder {
    config: CompositionConfig,
}

impl CompositionConfigBuilder {
    #[must_use]
    pub fn layout(mut self, layout: DatasetLayout) -> Self {
        self.config.layout = layout;
        self
    }

    #[must_use]
    pub fn strategy(mut self, strategy: MatchStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    #[must_use]
    pub fn codec(mut self, codec: VideoCodec) -> Self {
        self.config.encoding.codec = codec;
        self
    }

    #[must_use]
    pub fn encoding(mut self, encoding: VideoEncodingConfig) -> Self {
        self.config.encoding = encoding;
        self
    }

    #[must_use]
    pub fn fallback_fps(mut self, fps: f64) -> Self {
        self.config.fallback_fps = fps;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Any failure reported by [`CompositionConfig::validate`]
    pub fn build(self) -> Result<CompositionConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Top-level configuration file covering both directions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    pub classifier: ClassifierConfig,
    pub composition: CompositionConfig,
}

impl TranslatorConfig {
    /// Load and validate a JSON configuration file
    ///
    /// Missing sections and fields take their defaults.
    ///
    /// # Errors
    /// - File cannot be read
    /// - Malformed JSON or unknown enum values
    /// - Validation failures in either section
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| TranslateError::file_io_error("read configuration", path, e))?;
        let config: Self = serde_json::from_slice(&bytes).map_err(|e| {
            TranslateError::invalid_config(format!(
                "Failed to parse configuration '{}': {e}",
                path.display()
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON
    ///
    /// # Errors
    /// - Serialization or write failures
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| TranslateError::internal(format!("Failed to serialize configuration: {e}")))?;
        std::fs::write(path, json)
            .map_err(|e| TranslateError::file_io_error("write configuration", path, e))
    }

    /// Validate both sections
    ///
    /// # Errors
    /// - Any failure from the classifier or composition section
    pub fn validate(&self) -> Result<()> {
        self.classifier.validate()?;
        self.composition.validate()
    }
}
