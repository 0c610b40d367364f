//! Phrase library indexing and sentence decomposition for text-to-sign

pub mod library;
pub mod matcher;

pub use library::{DatasetLayout, PhraseLibrary};
pub use matcher::{MatchSegment, MatchStrategy, PhraseMatcher, DEFAULT_MAX_WINDOW};
