//! Error types for sign translation operations

use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for sign translation operations
pub type Result<T> = std::result::Result<T, TranslateError>;

/// Error types surfaced by both translation pipelines
#[derive(Error, Debug)]
pub enum TranslateError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image buffer errors while resizing or converting frames
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Clip missing, not decodable, or without any frames
    #[error("Clip unreadable '{}': {reason}", path.display())]
    ClipUnreadable { path: PathBuf, reason: String },

    /// Model bundle missing, corrupt, or inconsistent with its label codec
    #[error("Model load error: {0}")]
    ModelLoad(String),

    /// Label not present in the codec
    #[error("Unknown label: '{0}'")]
    UnknownLabel(String),

    /// Class index outside `[0, len)`
    #[error("Class index {index} out of range for {len} labels")]
    IndexOutOfRange { index: usize, len: usize },

    /// Sentence could not be decomposed into known phrases
    #[error("No phrase match: {0}")]
    NoPhraseMatch(String),

    /// None of the clips handed to the compositor could be opened
    #[error("No valid clips to compose ({attempted} attempted)")]
    NoValidClips { attempted: usize },

    /// Backend inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Frame or tensor processing errors
    #[error("Processing error: {0}")]
    Processing(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Stable, transport-neutral classification of a [`TranslateError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Io,
    ClipUnreadable,
    ModelLoad,
    UnknownLabel,
    IndexOutOfRange,
    NoPhraseMatch,
    NoValidClips,
    Inference,
    InvalidConfig,
    Processing,
    Internal,
}

impl ErrorKind {
    /// Snake-case identifier, identical to the serde representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Io => "io",
            Self::ClipUnreadable => "clip_unreadable",
            Self::ModelLoad => "model_load",
            Self::UnknownLabel => "unknown_label",
            Self::IndexOutOfRange => "index_out_of_range",
            Self::NoPhraseMatch => "no_phrase_match",
            Self::NoValidClips => "no_valid_clips",
            Self::Inference => "inference",
            Self::InvalidConfig => "invalid_config",
            Self::Processing => "processing",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TranslateError {
    /// Kind of this error, for callers that map failures onto their own transport
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Io,
            Self::Image(_) | Self::Processing(_) => ErrorKind::Processing,
            Self::ClipUnreadable { .. } => ErrorKind::ClipUnreadable,
            Self::ModelLoad(_) => ErrorKind::ModelLoad,
            Self::UnknownLabel(_) => ErrorKind::UnknownLabel,
            Self::IndexOutOfRange { .. } => ErrorKind::IndexOutOfRange,
            Self::NoPhraseMatch(_) => ErrorKind::NoPhraseMatch,
            Self::NoValidClips { .. } => ErrorKind::NoValidClips,
            Self::Inference(_) => ErrorKind::Inference,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Create a new clip unreadable error
    pub fn clip_unreadable<P: AsRef<Path>, S: Into<String>>(path: P, reason: S) -> Self {
        Self::ClipUnreadable {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Create a new model load error
    pub fn model_load<S: Into<String>>(msg: S) -> Self {
        Self::ModelLoad(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new no phrase match error
    pub fn no_phrase_match<S: Into<String>>(msg: S) -> Self {
        Self::NoPhraseMatch(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<Path>>(operation: &str, path: P, error: std::io::Error) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create model error with troubleshooting context
    pub fn model_error_with_context<P: AsRef<Path>>(
        operation: &str,
        bundle_path: P,
        error: &str,
        suggestions: &[&str],
    ) -> Self {
        let path_display = bundle_path.as_ref().display();
        let suggestion_text = if suggestions.is_empty() {
            String::new()
        } else {
            format!(" Suggestions: {}", suggestions.join(", "))
        };

        Self::ModelLoad(format!(
            "Failed to {} bundle '{}': {}.{}",
            operation, path_display, error, suggestion_text
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Create inference error with provider context
    pub fn inference_error_with_provider(
        provider: &str,
        operation: &str,
        error: &str,
        fallback_suggestions: &[&str],
    ) -> Self {
        let suggestions = if fallback_suggestions.is_empty() {
            String::new()
        } else {
            format!(" Try: {}", fallback_suggestions.join(" or "))
        };

        Self::Inference(format!(
            "{} failed using '{}' provider: {}.{}",
            operation, provider, error, suggestions
        ))
    }
}
