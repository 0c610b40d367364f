//! Tract backend for the exported video classifier
//!
//! Pure Rust inference with no native runtime to install. The input fact is
//! pinned to the bundle's `(1, 3, F, H, W)` geometry so Tract can fully type
//! and optimize the 3D convolutions ahead of time.

use crate::bundle::ModelBundle;
use crate::config::{ClassifierConfig, ExecutionProvider};
use crate::error::{Result, TranslateError};
use crate::inference::{logits_to_array2, InferenceBackend};
use ndarray::{Array2, Array5};
use std::time::{Duration, Instant};
use tract_onnx::prelude::*;

type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Tract backend
#[derive(Debug, Default)]
pub struct TractBackend {
    model: Option<TractModel>,
    output_width: Option<usize>,
}

impl TractBackend {
    /// Create an uninitialized backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tract execution providers as `(name, available, description)`
    pub fn list_providers() -> Vec<(String, bool, String)> {
        vec![(
            "CPU".to_string(),
            true,
            "Pure Rust CPU inference via Tract".to_string(),
        )]
    }

    fn load_model(&mut self, bundle: &ModelBundle, config: &ClassifierConfig) -> Result<Duration> {
        let start = Instant::now();
        if config.execution_provider != ExecutionProvider::Cpu
            && config.execution_provider != ExecutionProvider::Auto
        {
            log::warn!(
                "Tract only runs on CPU, ignoring execution provider '{}'",
                config.execution_provider
            );
        }

        let model_data = bundle.model_bytes()?;
        let shape = bundle.input_shape();
        let load_error = |stage: &str, e: TractError| {
            TranslateError::model_error_with_context(stage, bundle.root(), &e.to_string(), &[])
        };

        let optimized = onnx()
            .model_for_read(&mut std::io::Cursor::new(model_data))
            .map_err(|e| load_error("parse model in", e))?
            .with_input_fact(0, f32::fact(shape).into())
            .map_err(|e| load_error("set input shape for", e))?
            .into_optimized()
            .map_err(|e| load_error("optimize model in", e))?;

        self.output_width = optimized
            .output_fact(0)
            .ok()
            .and_then(|fact| fact.shape.as_concrete().and_then(|dims| dims.last().copied()));

        let model = optimized
            .into_runnable()
            .map_err(|e| load_error("prepare model in", e))?;

        log::debug!(
            "Tract model ready for input {:?}, output width {:?}",
            shape,
            self.output_width
        );

        self.model = Some(model);
        Ok(start.elapsed())
    }
}

impl InferenceBackend for TractBackend {
    fn initialize(
        &mut self,
        bundle: &ModelBundle,
        config: &ClassifierConfig,
    ) -> Result<Option<Duration>> {
        if self.model.is_some() {
            return Ok(None);
        }
        self.load_model(bundle, config).map(Some)
    }

    fn infer(&mut self, input: &Array5<f32>) -> Result<Array2<f32>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| TranslateError::inference("Tract model not initialized"))?;

        let start = Instant::now();
        let input_tensor = Tensor::from(input.clone());
        let outputs = model
            .run(tvec![input_tensor.into()])
            .map_err(|e| TranslateError::inference(format!("Tract inference failed: {e}")))?;

        let output = outputs
            .into_iter()
            .next()
            .ok_or_else(|| TranslateError::inference("No output tensor found"))?
            .into_arc_tensor();
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| TranslateError::inference(format!("Failed to convert output tensor: {e}")))?;

        let logits = logits_to_array2(view.shape(), view.iter().copied().collect())?;

        log::debug!(
            "Tract inference took {:.2}ms",
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(logits)
    }

    fn output_width(&self) -> Option<usize> {
        self.output_width
    }

    fn is_initialized(&self) -> bool {
        self.model.is_some()
    }

    fn name(&self) -> &'static str {
        "tract"
    }
}
