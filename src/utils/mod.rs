//! Shared utilities: text normalization, clip preprocessing and provider handling

pub mod preprocessing;
pub mod providers;
pub mod text;

pub use preprocessing::{ClipPreprocessor, PreprocessingConfig};
pub use providers::{ExecutionProviderManager, ProviderInfo};
pub use text::{normalize_phrase, phrase_from_file_name, sentence_words, training_label};
