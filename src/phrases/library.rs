//! Index of reference clips keyed by normalized phrase

use crate::backends::video::VideoFormat;
use crate::error::{Result, TranslateError};
use crate::utils::text::{normalize_phrase, phrase_from_file_name};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// How reference clips are arranged under the dataset directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatasetLayout {
    /// `dataset/<Phrase>.<ext>`: phrase from the file name
    #[default]
    Flat,
    /// `dataset/<category>/<label folder>/<clip>.<ext>`: phrase from the label folder
    Nested,
    /// Flat entries first, then nested ones
    Auto,
}

impl std::fmt::Display for DatasetLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flat => write!(f, "flat"),
            Self::Nested => write!(f, "nested"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

/// Mapping from normalized phrase to one representative clip
///
/// When several clips normalize to the same phrase, the first one in sorted
/// path order is kept, so lookups are reproducible across runs and platforms.
#[derive(Debug, Clone, Default)]
pub struct PhraseLibrary {
    entries: BTreeMap<String, PathBuf>,
    max_words: usize,
}

impl PhraseLibrary {
    /// Scan `dataset_dir` and index every recognized video clip
    ///
    /// # Errors
    /// - `dataset_dir` does not exist or is not a directory
    /// - Directory traversal failures
    pub fn build(dataset_dir: &Path, layout: DatasetLayout) -> Result<Self> {
        if !dataset_dir.is_dir() {
            return Err(TranslateError::file_io_error(
                "read dataset directory",
                dataset_dir,
                std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            ));
        }

        let mut library = Self::default();
        if matches!(layout, DatasetLayout::Flat | DatasetLayout::Auto) {
            for path in scan_clips(dataset_dir, 1)? {
                if let Some(phrase) = phrase_from_file_name(&path) {
                    library.insert(phrase, path);
                }
            }
        }
        if matches!(layout, DatasetLayout::Nested | DatasetLayout::Auto) {
            for path in scan_clips(dataset_dir, 3)? {
                // Label folders look like "12. Thank you"; the extension rule must not apply
                let phrase = path
                    .parent()
                    .and_then(Path::file_name)
                    .map(|folder| normalize_phrase(&folder.to_string_lossy()))
                    .unwrap_or_default();
                if !phrase.is_empty() {
                    library.insert(phrase, path);
                }
            }
        }

        log::info!(
            "Indexed {} phrases from {} ({} layout)",
            library.len(),
            dataset_dir.display(),
            layout
        );
        Ok(library)
    }

    /// Build a library from explicit `(phrase, clip)` pairs
    ///
    /// Phrases are normalized; empty ones are dropped and the first clip wins on collision.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, PathBuf)>,
        S: AsRef<str>,
    {
        let mut library = Self::default();
        for (phrase, path) in entries {
            let phrase = normalize_phrase(phrase.as_ref());
            if !phrase.is_empty() {
                library.insert(phrase, path);
            }
        }
        library
    }

    fn insert(&mut self, phrase: String, path: PathBuf) {
        if let Some(existing) = self.entries.get(&phrase) {
            log::debug!(
                "Phrase '{}' already maps to {}, ignoring {}",
                phrase,
                existing.display(),
                path.display()
            );
            return;
        }
        self.max_words = self.max_words.max(phrase.split(' ').count());
        self.entries.insert(phrase, path);
    }

    /// Clip for an already normalized phrase
    #[must_use]
    pub fn get(&self, phrase: &str) -> Option<&Path> {
        self.entries.get(phrase).map(PathBuf::as_path)
    }

    #[must_use]
    pub fn contains(&self, phrase: &str) -> bool {
        self.entries.contains_key(phrase)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Word count of the longest indexed phrase
    #[must_use]
    pub fn max_phrase_words(&self) -> usize {
        self.max_words
    }

    /// Phrases in lexicographic order
    pub fn phrases(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.entries
            .iter()
            .map(|(phrase, path)| (phrase.as_str(), path.as_path()))
    }
}

/// Video files exactly `depth` levels below `root`, in sorted path order
fn scan_clips(root: &Path, depth: usize) -> Result<Vec<PathBuf>> {
    let mut clips = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(depth)
        .max_depth(depth)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            TranslateError::processing(format!("failed to scan '{}': {e}", root.display()))
        })?;
        if entry.file_type().is_file() && VideoFormat::from_path(entry.path()).is_some() {
            clips.push(entry.into_path());
        }
    }
    Ok(clips)
}
