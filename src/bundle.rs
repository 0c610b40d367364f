//! Model bundle: exported weights, label codec and the manifest that ties them together
//!
//! A bundle directory contains:
//!
//! - `model.onnx`: the exported video classifier, `(1, 3, F, H, W)` in, `(1, N)` logits out
//! - `labels.json`: the label codec the model was trained with
//! - `bundle.json`: the manifest described by [`BundleManifest`]
//!
//! Loading checks the manifest against both files so a model paired with the
//! wrong label list is rejected up front instead of producing wrong labels.

use crate::error::{Result, TranslateError};
use crate::labels::LabelCodec;
use crate::sampling::{SamplingStrategy, DEFAULT_MAX_FRAMES};
use crate::utils::preprocessing::PreprocessingConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Manifest schema understood by this crate
pub const BUNDLE_SCHEMA_VERSION: u32 = 1;

pub const MANIFEST_FILE: &str = "bundle.json";
pub const MODEL_FILE: &str = "model.onnx";
pub const LABELS_FILE: &str = "labels.json";

/// 3D CNN architecture the weights belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Backbone {
    /// 3D ResNet-18
    #[serde(rename = "r3d_18")]
    R3d18,
    /// Mixed-convolution ResNet-18
    #[serde(rename = "mc3_18")]
    Mc318,
    /// (2+1)D ResNet-18
    #[serde(rename = "r2plus1d_18")]
    R2Plus1d18,
}

impl Backbone {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::R3d18 => "r3d_18",
            Self::Mc318 => "mc3_18",
            Self::R2Plus1d18 => "r2plus1d_18",
        }
    }

    /// Parse a backbone id
    ///
    /// # Errors
    /// - Unknown backbone id
    pub fn parse(id: &str) -> Result<Self> {
        match id.to_lowercase().as_str() {
            "r3d_18" | "r3d18" => Ok(Self::R3d18),
            "mc3_18" | "mc318" => Ok(Self::Mc318),
            "r2plus1d_18" | "r2plus1d18" => Ok(Self::R2Plus1d18),
            other => Err(TranslateError::invalid_config(format!(
                "Unknown backbone: {other}. Supported: r3d_18, mc3_18, r2plus1d_18"
            ))),
        }
    }
}

impl std::fmt::Display for Backbone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Temporal and spatial size of the network input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputGeometry {
    pub frames: usize,
    pub height: u32,
    pub width: u32,
}

impl Default for InputGeometry {
    fn default() -> Self {
        Self {
            frames: DEFAULT_MAX_FRAMES,
            height: 112,
            width: 112,
        }
    }
}

/// Per-channel normalization applied after scaling pixels to `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

/// Contents of `bundle.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub schema_version: u32,
    pub backbone: Backbone,
    pub num_classes: usize,
    pub input: InputGeometry,
    #[serde(default)]
    pub sampling: SamplingStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalization: Option<Normalization>,
    pub model_sha256: String,
    pub labels_sha256: String,
    pub created_at: DateTime<Utc>,
}

/// Options for [`ModelBundle::create`]
#[derive(Debug, Clone)]
pub struct BundleOptions {
    pub backbone: Backbone,
    pub input: InputGeometry,
    pub sampling: SamplingStrategy,
    pub normalization: Option<Normalization>,
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self {
            backbone: Backbone::R3d18,
            input: InputGeometry::default(),
            sampling: SamplingStrategy::Uniform,
            normalization: None,
        }
    }
}

/// A validated model bundle on disk
#[derive(Debug, Clone)]
pub struct ModelBundle {
    root: PathBuf,
    manifest: BundleManifest,
    labels: LabelCodec,
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn read_bundle_file(root: &Path, name: &str) -> Result<Vec<u8>> {
    let path = root.join(name);
    std::fs::read(&path).map_err(|e| {
        TranslateError::model_error_with_context(
            &format!("read {name} from"),
            root,
            &e.to_string(),
            &["check the bundle directory", "re-export the bundle"],
        )
    })
}

impl ModelBundle {
    /// Load and validate the bundle in `dir`
    ///
    /// The model file's hash is checked when its bytes are read by
    /// [`ModelBundle::model_bytes`], so the weights are only read once.
    ///
    /// # Errors
    /// - `ModelLoad` for missing files, an unknown schema version, a labels hash
    ///   mismatch, a class count mismatch or invalid geometry
    #[tracing::instrument(skip(dir), fields(bundle = %dir.display()))]
    pub fn load(dir: &Path) -> Result<Self> {
        let manifest_bytes = read_bundle_file(dir, MANIFEST_FILE)?;
        let manifest: BundleManifest = serde_json::from_slice(&manifest_bytes).map_err(|e| {
            TranslateError::model_error_with_context("parse", dir, &e.to_string(), &[])
        })?;

        if manifest.schema_version != BUNDLE_SCHEMA_VERSION {
            return Err(TranslateError::model_load(format!(
                "unsupported bundle schema version {} (expected {BUNDLE_SCHEMA_VERSION})",
                manifest.schema_version
            )));
        }

        let label_bytes = read_bundle_file(dir, LABELS_FILE)?;
        let labels_hash = sha256_hex(&label_bytes);
        if !labels_hash.eq_ignore_ascii_case(&manifest.labels_sha256) {
            return Err(TranslateError::model_error_with_context(
                "verify labels of",
                dir,
                "labels.json does not match the manifest hash",
                &["the label file was edited or belongs to another model"],
            ));
        }
        let labels = LabelCodec::from_json(&label_bytes)?;

        if labels.len() != manifest.num_classes {
            return Err(TranslateError::model_load(format!(
                "bundle declares {} classes but labels.json has {}",
                manifest.num_classes,
                labels.len()
            )));
        }

        let input = manifest.input;
        if input.frames == 0 || input.height == 0 || input.width == 0 {
            return Err(TranslateError::model_load(format!(
                "invalid input geometry {}x{}x{}",
                input.frames, input.height, input.width
            )));
        }

        if !dir.join(MODEL_FILE).is_file() {
            return Err(TranslateError::model_error_with_context(
                "find model in",
                dir,
                "model.onnx is missing",
                &["re-export the bundle"],
            ));
        }

        log::info!(
            "Loaded {} bundle with {} classes from {}",
            manifest.backbone,
            manifest.num_classes,
            dir.display()
        );

        Ok(Self {
            root: dir.to_path_buf(),
            manifest,
            labels,
        })
    }

    /// Write a bundle to `dir` from exported weights and a fitted codec
    ///
    /// # Errors
    /// - Model file unreadable, or any write failure
    pub fn create(
        dir: &Path,
        model_path: &Path,
        labels: &LabelCodec,
        options: &BundleOptions,
    ) -> Result<Self> {
        let model_bytes = std::fs::read(model_path)
            .map_err(|e| TranslateError::file_io_error("read model", model_path, e))?;
        let label_bytes = labels.to_json()?;

        std::fs::create_dir_all(dir)
            .map_err(|e| TranslateError::file_io_error("create bundle directory", dir, e))?;

        let model_dest = dir.join(MODEL_FILE);
        std::fs::write(&model_dest, &model_bytes)
            .map_err(|e| TranslateError::file_io_error("write model", &model_dest, e))?;
        let labels_dest = dir.join(LABELS_FILE);
        std::fs::write(&labels_dest, &label_bytes)
            .map_err(|e| TranslateError::file_io_error("write labels", &labels_dest, e))?;

        let manifest = BundleManifest {
            schema_version: BUNDLE_SCHEMA_VERSION,
            backbone: options.backbone,
            num_classes: labels.len(),
            input: options.input,
            sampling: options.sampling,
            normalization: options.normalization,
            model_sha256: sha256_hex(&model_bytes),
            labels_sha256: sha256_hex(&label_bytes),
            created_at: Utc::now(),
        };
        let manifest_json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| TranslateError::internal(format!("failed to serialize manifest: {e}")))?;
        let manifest_dest = dir.join(MANIFEST_FILE);
        std::fs::write(&manifest_dest, manifest_json)
            .map_err(|e| TranslateError::file_io_error("write manifest", &manifest_dest, e))?;

        log::info!(
            "Wrote {} bundle with {} classes to {}",
            options.backbone,
            labels.len(),
            dir.display()
        );

        Ok(Self {
            root: dir.to_path_buf(),
            manifest,
            labels: labels.clone(),
        })
    }

    /// Read the model weights, verifying them against the manifest hash
    ///
    /// # Errors
    /// - `ModelLoad` if the file is unreadable or its hash does not match
    pub fn model_bytes(&self) -> Result<Vec<u8>> {
        let bytes = read_bundle_file(&self.root, MODEL_FILE)?;
        if !sha256_hex(&bytes).eq_ignore_ascii_case(&self.manifest.model_sha256) {
            return Err(TranslateError::model_error_with_context(
                "verify weights of",
                &self.root,
                "model.onnx does not match the manifest hash",
                &["re-export the bundle"],
            ));
        }
        Ok(bytes)
    }

    /// Check the class count reported by a loaded backend
    ///
    /// `None` means the backend could not determine it statically; the
    /// classifier then checks the first logits it receives instead.
    ///
    /// # Errors
    /// - `ModelLoad` when the width differs from the label count
    pub fn validate_output_width(&self, width: Option<usize>) -> Result<()> {
        match width {
            Some(width) if width != self.labels.len() => Err(TranslateError::model_error_with_context(
                "validate",
                &self.root,
                &format!(
                    "model outputs {width} classes but the label codec has {}",
                    self.labels.len()
                ),
                &["pair the model with the labels it was trained on"],
            )),
            _ => Ok(()),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn manifest(&self) -> &BundleManifest {
        &self.manifest
    }

    #[must_use]
    pub fn labels(&self) -> &LabelCodec {
        &self.labels
    }

    /// Network input shape `(1, 3, F, H, W)`
    #[must_use]
    pub fn input_shape(&self) -> [usize; 5] {
        let input = self.manifest.input;
        [1, 3, input.frames, input.height as usize, input.width as usize]
    }

    /// Preprocessing matching the manifest's geometry and normalization
    #[must_use]
    pub fn preprocessing_config(&self) -> PreprocessingConfig {
        let defaults = PreprocessingConfig::default();
        let input = self.manifest.input;
        PreprocessingConfig {
            target_size: [input.height, input.width],
            normalization_mean: self
                .manifest
                .normalization
                .map_or(defaults.normalization_mean, |n| n.mean),
            normalization_std: self
                .manifest
                .normalization
                .map_or(defaults.normalization_std, |n| n.std),
        }
    }
}
