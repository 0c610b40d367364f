//! Inference backend abstraction and factory

use crate::{
    bundle::ModelBundle,
    config::{BackendType, ClassifierConfig},
    error::{Result, TranslateError},
};
use ndarray::{Array2, Array5};
use std::time::Duration;

/// Trait for inference backends
///
/// A backend runs the exported network on one `(1, C, T, H, W)` clip tensor
/// and returns raw `(1, num_classes)` logits. Softmax and label decoding
/// happen in the classifier.
pub trait InferenceBackend: Send {
    /// Load the bundle's weights and resolve the execution provider
    ///
    /// Returns the load time, or `None` if the backend was already initialized.
    ///
    /// # Errors
    /// - `ModelLoad` for unreadable or tampered weights
    /// - `Inference` when the runtime rejects the model
    fn initialize(&mut self, bundle: &ModelBundle, config: &ClassifierConfig)
        -> Result<Option<Duration>>;

    /// Run inference on one clip tensor
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Runtime failures or an unexpected output rank
    fn infer(&mut self, input: &Array5<f32>) -> Result<Array2<f32>>;

    /// Number of classes the loaded model emits, if statically known
    fn output_width(&self) -> Option<usize>;

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}

/// Creates inference backends by type
pub trait BackendFactory: Send + Sync {
    /// # Errors
    /// - The backend type was not compiled into this build
    fn create_backend(&self, backend_type: BackendType) -> Result<Box<dyn InferenceBackend>>;

    /// Backend types this factory can create
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Factory for the backends enabled by crate features
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(&self, backend_type: BackendType) -> Result<Box<dyn InferenceBackend>> {
        match backend_type {
            #[cfg(feature = "onnx")]
            BackendType::Onnx => Ok(Box::new(crate::backends::OnnxBackend::new())),
            #[cfg(feature = "tract")]
            BackendType::Tract => Ok(Box::new(crate::backends::TractBackend::new())),
            #[allow(unreachable_patterns)]
            other => Err(TranslateError::invalid_config(format!(
                "{other} backend not available in this build. Enable the '{other}' feature"
            ))),
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = Vec::new();
        if cfg!(feature = "onnx") {
            backends.push(BackendType::Onnx);
        }
        if cfg!(feature = "tract") {
            backends.push(BackendType::Tract);
        }
        backends
    }
}

/// Build and initialize a backend for `bundle`, checking its output width
///
/// # Errors
/// - Backend creation or initialization failures
/// - `ModelLoad` when the model's class count differs from the label codec
pub fn load_backend(
    factory: &dyn BackendFactory,
    bundle: &ModelBundle,
    config: &ClassifierConfig,
) -> Result<Box<dyn InferenceBackend>> {
    let mut backend = factory.create_backend(config.backend_type)?;
    if let Some(elapsed) = backend.initialize(bundle, config)? {
        log::info!(
            "{} backend ready in {:.0}ms",
            backend.name(),
            elapsed.as_secs_f64() * 1000.0
        );
    }
    bundle.validate_output_width(backend.output_width())?;
    Ok(backend)
}

/// Reshape raw logits of shape `[N]` or `[1, N]` into `(1, N)`
///
/// # Errors
/// - `Inference` for any other shape
pub fn logits_to_array2(shape: &[usize], data: Vec<f32>) -> Result<Array2<f32>> {
    let width = match shape {
        [n] | [1, n] => *n,
        other => {
            return Err(TranslateError::inference(format!(
                "Expected (1, num_classes) logits, got shape {other:?}"
            )))
        },
    };
    Array2::from_shape_vec((1, width), data)
        .map_err(|e| TranslateError::inference(format!("Failed to reshape logits: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_backends_match_features() {
        let factory = DefaultBackendFactory;
        let available = factory.available_backends();
        assert_eq!(available.contains(&BackendType::Onnx), cfg!(feature = "onnx"));
        assert_eq!(available.contains(&BackendType::Tract), cfg!(feature = "tract"));

        for backend_type in available {
            let backend = factory.create_backend(backend_type).unwrap();
            assert!(!backend.is_initialized());
        }
    }

    #[test]
    fn test_logits_reshape() {
        let logits = logits_to_array2(&[1, 3], vec![0.1, 0.2, 0.3]).unwrap();
        assert_eq!(logits.shape(), &[1, 3]);
        assert!(logits_to_array2(&[3], vec![0.1, 0.2, 0.3]).is_ok());
        assert!(logits_to_array2(&[2, 3], vec![0.0; 6]).is_err());
        assert!(logits_to_array2(&[1, 3], vec![0.0; 2]).is_err());
    }
}
