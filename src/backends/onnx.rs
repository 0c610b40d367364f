//! ONNX Runtime backend for the exported video classifier
//!
//! Supports CPU, CUDA and CoreML execution providers. The provider is resolved
//! once when the session is created; an unavailable accelerator falls back to
//! CPU with a warning rather than failing the load.

use crate::bundle::ModelBundle;
use crate::config::{ClassifierConfig, ExecutionProvider};
use crate::error::{Result, TranslateError};
use crate::inference::{logits_to_array2, InferenceBackend};
use ndarray::{Array2, Array5};
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::{Value, ValueType};
use std::time::{Duration, Instant};

/// ONNX Runtime backend
#[derive(Debug, Default)]
pub struct OnnxBackend {
    session: Option<Session>,
    output_width: Option<usize>,
}

fn cuda_available() -> bool {
    OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false)
}

fn coreml_available() -> bool {
    OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default()).unwrap_or(false)
}

impl OnnxBackend {
    /// Create an uninitialized backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// List ONNX Runtime execution providers as `(name, available, description)`
    pub fn list_providers() -> Vec<(String, bool, String)> {
        log::debug!(
            "Platform: {} / {}, {} CPU cores",
            std::env::consts::OS,
            std::env::consts::ARCH,
            std::thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(1)
        );

        vec![
            (
                "CPU".to_string(),
                true,
                "Always available, uses CPU for inference".to_string(),
            ),
            (
                "CUDA".to_string(),
                cuda_available(),
                "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
            ),
            (
                "CoreML".to_string(),
                coreml_available(),
                "Apple Silicon GPU acceleration (macOS only)".to_string(),
            ),
        ]
    }

    /// Execution providers to register for the requested provider
    fn resolve_providers(requested: ExecutionProvider) -> Vec<ExecutionProviderDispatch> {
        let mut providers = Vec::new();
        match requested {
            ExecutionProvider::Auto => {
                if cuda_available() {
                    log::info!("CUDA execution provider is available and will be used");
                    providers.push(CUDAExecutionProvider::default().build());
                }
                if coreml_available() {
                    log::info!("CoreML execution provider is available and will be used");
                    providers.push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
                }
                if providers.is_empty() {
                    log::info!("No hardware acceleration available, using CPU");
                }
            },
            ExecutionProvider::Cpu => log::info!("Using CPU execution provider"),
            ExecutionProvider::Cuda => {
                if cuda_available() {
                    log::info!("Using CUDA execution provider");
                    providers.push(CUDAExecutionProvider::default().build());
                } else {
                    log::warn!("CUDA execution provider requested but not available, falling back to CPU");
                }
            },
            ExecutionProvider::CoreMl => {
                if coreml_available() {
                    log::info!("Using CoreML execution provider");
                    providers.push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
                } else {
                    log::warn!("CoreML execution provider requested but not available, falling back to CPU");
                }
            },
        }
        providers
    }

    fn load_model(&mut self, bundle: &ModelBundle, config: &ClassifierConfig) -> Result<Duration> {
        let start = Instant::now();
        let model_data = bundle.model_bytes()?;

        let mut builder = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .map_err(|e| TranslateError::inference(format!("Failed to create session builder: {e}")))?;

        let providers = Self::resolve_providers(config.execution_provider);
        if !providers.is_empty() {
            builder = builder.with_execution_providers(providers).map_err(|e| {
                TranslateError::inference_error_with_provider(
                    &config.execution_provider.to_string(),
                    "Session setup",
                    &e.to_string(),
                    &["--execution-provider onnx:cpu"],
                )
            })?;
        }

        let cores = std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(8);
        let intra_threads = if config.intra_threads > 0 { config.intra_threads } else { cores };
        let inter_threads = if config.inter_threads > 0 {
            config.inter_threads
        } else {
            (cores / 4).max(1)
        };

        let session = builder
            .with_intra_threads(intra_threads)
            .and_then(|b| b.with_inter_threads(inter_threads))
            .and_then(|b| b.commit_from_memory(&model_data))
            .map_err(|e| {
                TranslateError::model_error_with_context(
                    "create session for",
                    bundle.root(),
                    &e.to_string(),
                    &["check that model.onnx is a valid ONNX export"],
                )
            })?;

        self.output_width = session.outputs.first().and_then(|output| {
            if let ValueType::Tensor { shape, .. } = &output.output_type {
                shape.last().and_then(|d| usize::try_from(*d).ok()).filter(|d| *d > 0)
            } else {
                None
            }
        });

        log::debug!(
            "ONNX session created: provider {}, {} intra / {} inter threads, output width {:?}",
            config.execution_provider,
            intra_threads,
            inter_threads,
            self.output_width
        );

        self.session = Some(session);
        Ok(start.elapsed())
    }
}

impl InferenceBackend for OnnxBackend {
    fn initialize(
        &mut self,
        bundle: &ModelBundle,
        config: &ClassifierConfig,
    ) -> Result<Option<Duration>> {
        if self.session.is_some() {
            return Ok(None);
        }
        self.load_model(bundle, config).map(Some)
    }

    fn infer(&mut self, input: &Array5<f32>) -> Result<Array2<f32>> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| TranslateError::internal("ONNX session not initialized"))?;

        let start = Instant::now();
        let input_value = Value::from_array(input.clone())
            .map_err(|e| TranslateError::processing(format!("Failed to convert input tensor: {e}")))?;

        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| TranslateError::inference(format!("ONNX inference failed: {e}")))?;

        let first_key = outputs
            .keys()
            .next()
            .ok_or_else(|| TranslateError::inference("No output tensors found"))?;
        let logits = outputs
            .get(first_key)
            .ok_or_else(|| TranslateError::inference("First output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| TranslateError::inference(format!("Failed to extract output tensor: {e}")))?;

        let result = logits_to_array2(logits.shape(), logits.iter().copied().collect());
        log::debug!(
            "ONNX inference on {:?} took {:.2}ms",
            input.dim(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        result
    }

    fn output_width(&self) -> Option<usize> {
        self.output_width
    }

    fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    fn name(&self) -> &'static str {
        "onnx"
    }
}
