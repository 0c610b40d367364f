//! Sign-to-text: classify a clip into ranked labels

use crate::backends::video::VideoBackend;
use crate::bundle::ModelBundle;
use crate::config::ClassifierConfig;
use crate::error::{Result, TranslateError};
#[cfg(feature = "video-support")]
use crate::inference::DefaultBackendFactory;
use crate::inference::{load_backend, BackendFactory, InferenceBackend};
use crate::labels::LabelCodec;
use crate::sampling::FrameSampler;
use crate::utils::preprocessing::ClipPreprocessor;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// One ranked prediction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub label: String,
    /// Softmax probability in `[0, 1]`
    pub confidence: f32,
    pub class_index: usize,
}

/// Numerically stable softmax
#[must_use]
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        exps.into_iter().map(|v| v / sum).collect()
    } else {
        exps
    }
}

/// Indices and values of the `k` largest probabilities, highest first
///
/// The sort is stable, so equal probabilities keep ascending class order.
#[must_use]
pub fn top_k(probabilities: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = probabilities.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(k);
    ranked
}

/// Video classifier: sampler, preprocessor, network and label codec
pub struct SignClassifier {
    bundle: ModelBundle,
    backend: Box<dyn InferenceBackend>,
    video: Arc<dyn VideoBackend>,
    sampler: FrameSampler,
    preprocessor: ClipPreprocessor,
    default_top_k: usize,
}

impl std::fmt::Debug for SignClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignClassifier")
            .field("bundle", &self.bundle.root())
            .field("backend", &self.backend.name())
            .field("sampler", &self.sampler)
            .finish_non_exhaustive()
    }
}

impl SignClassifier {
    /// Load the bundle named by `config` with the FFmpeg video backend
    ///
    /// # Errors
    /// - `ModelLoad` for any bundle or weight problem
    /// - `InvalidConfig` for invalid settings or a backend not compiled in
    #[cfg(feature = "video-support")]
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        let video = Arc::new(crate::backends::video::FFmpegBackend::new()?);
        Self::with_factory(config, &DefaultBackendFactory, video)
    }

    /// Load the bundle named by `config` using backends from `factory`
    ///
    /// # Errors
    /// - See [`SignClassifier::new`]
    pub fn with_factory(
        config: &ClassifierConfig,
        factory: &dyn BackendFactory,
        video: Arc<dyn VideoBackend>,
    ) -> Result<Self> {
        config.validate()?;
        let bundle = ModelBundle::load(&config.bundle_dir)?;
        let backend = load_backend(factory, &bundle, config)?;
        Self::assemble(bundle, backend, video, config.top_k)
    }

    /// Wrap an already initialized backend
    ///
    /// # Errors
    /// - Backend not initialized, or its output width disagrees with the labels
    pub fn with_backends(
        bundle: ModelBundle,
        backend: Box<dyn InferenceBackend>,
        video: Arc<dyn VideoBackend>,
    ) -> Result<Self> {
        if !backend.is_initialized() {
            return Err(TranslateError::internal(format!(
                "{} backend must be initialized before use",
                backend.name()
            )));
        }
        bundle.validate_output_width(backend.output_width())?;
        Self::assemble(bundle, backend, video, crate::config::DEFAULT_TOP_K)
    }

    fn assemble(
        bundle: ModelBundle,
        backend: Box<dyn InferenceBackend>,
        video: Arc<dyn VideoBackend>,
        default_top_k: usize,
    ) -> Result<Self> {
        let manifest = bundle.manifest();
        let sampler = FrameSampler::new(manifest.input.frames, manifest.sampling)?;
        let preprocessor = ClipPreprocessor::new(bundle.preprocessing_config())?;
        Ok(Self {
            bundle,
            backend,
            video,
            sampler,
            preprocessor,
            default_top_k,
        })
    }

    #[must_use]
    pub fn labels(&self) -> &LabelCodec {
        self.bundle.labels()
    }

    #[must_use]
    pub fn bundle(&self) -> &ModelBundle {
        &self.bundle
    }

    #[must_use]
    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }

    /// Class probabilities for the clip at `path`, in class-index order
    ///
    /// # Errors
    /// - `ClipUnreadable` for a missing, undecodable or empty clip
    /// - `Inference` for runtime failures
    /// - `ModelLoad` if the logits width disagrees with the label codec
    pub fn probabilities(&mut self, path: &Path) -> Result<Vec<f32>> {
        let sampled = self.sampler.sample(self.video.as_ref(), path)?;
        let frames = sampled.to_array()?;
        let input = self.preprocessor.preprocess(frames.view())?;
        let logits = self.backend.infer(&input)?;

        let num_labels = self.bundle.labels().len();
        if logits.len() != num_labels {
            return Err(TranslateError::model_load(format!(
                "model produced {} logits for {} labels",
                logits.len(),
                num_labels
            )));
        }

        let logits: Vec<f32> = logits.iter().copied().collect();
        if let Some((index, value)) = logits.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(TranslateError::inference(format!(
                "model produced a non-finite logit ({value}) for class {index}"
            )));
        }

        Ok(softmax(&logits))
    }

    /// Classify the clip at `path`, returning the `top_k` most likely labels
    ///
    /// `top_k` larger than the label count returns every label.
    ///
    /// # Errors
    /// - `InvalidConfig` for `top_k == 0`
    /// - Any failure from [`SignClassifier::probabilities`]
    #[tracing::instrument(skip(self, path), fields(clip = %path.display()))]
    pub fn classify(&mut self, path: &Path, top_k: usize) -> Result<Vec<Prediction>> {
        if top_k == 0 {
            return Err(TranslateError::config_value_error("top_k", top_k, ">= 1", Some(1)));
        }

        let probabilities = self.probabilities(path)?;
        let labels = self.bundle.labels();
        let predictions = top_k_predictions(&probabilities, top_k, labels)?;

        if let Some(best) = predictions.first() {
            log::info!(
                "Classified {} as '{}' ({:.1}%)",
                path.display(),
                best.label,
                best.confidence * 100.0
            );
        }
        Ok(predictions)
    }
}

fn top_k_predictions(
    probabilities: &[f32],
    k: usize,
    labels: &LabelCodec,
) -> Result<Vec<Prediction>> {
    top_k(probabilities, k)
        .into_iter()
        .map(|(class_index, confidence)| {
            Ok(Prediction {
                label: labels.decode(class_index)?.to_string(),
                confidence,
                class_index,
            })
        })
        .collect()
}
