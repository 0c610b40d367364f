//! Sentence decomposition into indexed phrases

use crate::error::{Result, TranslateError};
use crate::phrases::PhraseLibrary;
use crate::utils::text::sentence_words;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default largest window tried by the greedy matcher
pub const DEFAULT_MAX_WINDOW: usize = 3;

fn default_max_window() -> usize {
    DEFAULT_MAX_WINDOW
}

/// Sentence decomposition strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Maximum phrase count; unmatched words are skipped
    #[default]
    DynamicProgramming,
    /// Longest window first, left to right; fails on the first unmatched word
    Greedy {
        #[serde(default = "default_max_window")]
        max_window: usize,
    },
}

impl MatchStrategy {
    /// Parse a strategy name (`dp` or `greedy`) from the command line
    ///
    /// # Errors
    /// - Unknown strategy name or a zero window
    pub fn parse(name: &str, max_window: usize) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "dp" | "dynamic" | "dynamic_programming" => Ok(Self::DynamicProgramming),
            "greedy" if max_window > 0 => Ok(Self::Greedy { max_window }),
            "greedy" => Err(TranslateError::invalid_config("max_window must be at least 1")),
            other => Err(TranslateError::invalid_config(format!(
                "Unknown match strategy: {other}. Supported: dp, greedy"
            ))),
        }
    }
}

/// One matched phrase and where it sits in the sentence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchSegment {
    /// Normalized phrase as indexed in the library
    pub phrase: String,
    /// Reference clip for the phrase
    pub clip_path: PathBuf,
    /// Index of the first covered word
    pub start_word: usize,
    /// Number of covered words
    pub word_count: usize,
}

/// Decomposes sentences with a fixed strategy
#[derive(Debug, Clone, Copy, Default)]
pub struct PhraseMatcher {
    strategy: MatchStrategy,
}

impl PhraseMatcher {
    #[must_use]
    pub fn new(strategy: MatchStrategy) -> Self {
        Self { strategy }
    }

    #[must_use]
    pub fn strategy(&self) -> MatchStrategy {
        self.strategy
    }

    /// Normalize `sentence` and decompose it against `library`
    ///
    /// An empty sentence yields an empty decomposition with either strategy.
    ///
    /// # Errors
    /// - `NoPhraseMatch` from the greedy strategy when a word cannot be covered
    #[tracing::instrument(skip(self, library), fields(strategy = ?self.strategy))]
    pub fn match_sentence(
        &self,
        sentence: &str,
        library: &PhraseLibrary,
    ) -> Result<Vec<MatchSegment>> {
        let words = sentence_words(sentence);
        match self.strategy {
            MatchStrategy::DynamicProgramming => Ok(match_dynamic(&words, library)),
            MatchStrategy::Greedy { max_window } => match_greedy(&words, library, max_window),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Start,
    /// Carried forward from the previous prefix; the word is dropped
    Skip,
    /// Extended the prefix ending at this word index with one phrase
    Phrase(usize),
}

/// Maximum phrase-count decomposition of normalized `words`
///
/// `count[i]` is the best number of phrases covering the first `i` words.
/// Split points are tried from the left and only a strictly larger count
/// replaces the current best, so ties resolve to the earliest split. A prefix
/// with no phrase ending at its last word inherits the previous prefix's
/// decomposition and the word is skipped.
#[must_use]
pub fn match_dynamic(words: &[String], library: &PhraseLibrary) -> Vec<MatchSegment> {
    let n = words.len();
    let max_words = library.max_phrase_words();
    let mut count = vec![0usize; n + 1];
    let mut step = vec![Step::Start; n + 1];

    for i in 1..=n {
        let mut best: Option<(usize, usize)> = None;
        for j in i.saturating_sub(max_words)..i {
            let phrase = words[j..i].join(" ");
            if library.contains(&phrase) {
                let candidate = count[j] + 1;
                if best.map_or(true, |(_, best_count)| candidate > best_count) {
                    best = Some((j, candidate));
                }
            }
        }

        match best {
            Some((j, phrases)) => {
                count[i] = phrases;
                step[i] = Step::Phrase(j);
            },
            None => {
                log::debug!("No phrase ends at word '{}', skipping it", words[i - 1]);
                count[i] = count[i - 1];
                step[i] = Step::Skip;
            },
        }
    }

    let mut segments = Vec::with_capacity(count[n]);
    let mut i = n;
    while i > 0 {
        match step[i] {
            Step::Phrase(j) => {
                let phrase = words[j..i].join(" ");
                if let Some(path) = library.get(&phrase) {
                    segments.push(MatchSegment {
                        phrase,
                        clip_path: path.to_path_buf(),
                        start_word: j,
                        word_count: i - j,
                    });
                }
                i = j;
            },
            Step::Skip | Step::Start => i -= 1,
        }
    }
    segments.reverse();
    segments
}

/// Left-to-right longest-window decomposition of normalized `words`
///
/// At each position windows of `max_window` down to one word are tried and
/// the first one found in the library is taken.
///
/// # Errors
/// - `NoPhraseMatch` naming the first word no window can cover
pub fn match_greedy(
    words: &[String],
    library: &PhraseLibrary,
    max_window: usize,
) -> Result<Vec<MatchSegment>> {
    let mut segments = Vec::new();
    let mut start = 0;

    while start < words.len() {
        let longest = max_window.min(words.len() - start);
        let found = (1..=longest).rev().find_map(|width| {
            let phrase = words[start..start + width].join(" ");
            library
                .get(&phrase)
                .map(|path| (phrase.clone(), path.to_path_buf(), width))
        });

        let Some((phrase, clip_path, width)) = found else {
            return Err(TranslateError::no_phrase_match(format!(
                "no phrase in the library covers '{}' (word {})",
                words[start],
                start + 1
            )));
        };

        segments.push(MatchSegment {
            phrase,
            clip_path,
            start_word: start,
            word_count: width,
        });
        start += width;
    }

    Ok(segments)
}
