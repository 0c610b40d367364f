//! Bidirectional label codec persisted alongside the model weights

use crate::error::{Result, TranslateError};
use crate::utils::text::training_label;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use walkdir::WalkDir;

/// Mapping between string labels and the model's class indices
///
/// Class ids are positions in a sorted, deduplicated label list, which is
/// the ordering the training job used when it fitted its encoder. The codec
/// is immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelCodec {
    classes: Vec<String>,
    index: HashMap<String, usize>,
}

#[derive(Serialize, Deserialize)]
struct LabelFile {
    classes: Vec<String>,
}

impl LabelCodec {
    /// Fit a codec from raw (possibly repeated, unordered) labels
    pub fn fit<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut classes: Vec<String> = labels.into_iter().map(Into::into).collect();
        classes.sort();
        classes.dedup();
        Self::from_classes(classes)
    }

    /// Build a codec from an already ordered class list
    ///
    /// Fails if the list is empty or contains duplicates, since either would make
    /// index decoding ambiguous.
    pub fn from_classes(classes: Vec<String>) -> Result<Self> {
        if classes.is_empty() {
            return Err(TranslateError::model_load("label codec has no classes"));
        }

        let mut index = HashMap::with_capacity(classes.len());
        for (i, label) in classes.iter().enumerate() {
            if index.insert(label.clone(), i).is_some() {
                return Err(TranslateError::model_load(format!(
                    "duplicate label '{label}' in codec"
                )));
            }
        }

        Ok(Self { classes, index })
    }

    /// Load a codec from its JSON artifact
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| TranslateError::file_io_error("read label codec", path, e))?;
        Self::from_json(&bytes)
    }

    /// Parse the JSON representation (`{"classes": [...]}`)
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let file: LabelFile = serde_json::from_slice(bytes)
            .map_err(|e| TranslateError::model_load(format!("invalid label codec: {e}")))?;
        Self::from_classes(file.classes)
    }

    /// Serialize to the JSON representation
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let file = LabelFile {
            classes: self.classes.clone(),
        };
        serde_json::to_vec_pretty(&file)
            .map_err(|e| TranslateError::internal(format!("failed to serialize labels: {e}")))
    }

    /// Class index of `label`
    pub fn encode(&self, label: &str) -> Result<usize> {
        self.index
            .get(label)
            .copied()
            .ok_or_else(|| TranslateError::UnknownLabel(label.to_string()))
    }

    /// Label for class `index`
    pub fn decode(&self, index: usize) -> Result<&str> {
        self.classes
            .get(index)
            .map(String::as_str)
            .ok_or(TranslateError::IndexOutOfRange {
                index,
                len: self.classes.len(),
            })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Labels in class-index order
    #[must_use]
    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

/// Collect training labels from a nested dataset (`category/label_folder/*.mov`)
///
/// Returns one label per clip found, so the result can be fed straight into
/// [`LabelCodec::fit`]. Folders without any video clip contribute nothing.
pub fn labels_from_dataset(root: &Path) -> Result<Vec<String>> {
    let mut labels = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(3)
        .max_depth(3)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            TranslateError::processing(format!("failed to scan '{}': {e}", root.display()))
        })?;
        if !entry.file_type().is_file() || !is_training_clip(entry.path()) {
            continue;
        }
        if let Some(folder) = entry
            .path()
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy())
        {
            labels.push(training_label(&folder));
        }
    }

    log::info!(
        "Loaded {} clips with labels from {}",
        labels.len(),
        root.display()
    );
    Ok(labels)
}

// The training loader only ever globbed `*.mov`.
fn is_training_clip(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e == "mov")
}
