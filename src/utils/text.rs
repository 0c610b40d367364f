//! Text normalization shared by the phrase library and the matcher
//!
//! Library keys and sentence fragments must go through the same rules or
//! lookups silently miss, so both sides call into this module.

use std::path::Path;

/// Normalize free text into a phrase key
///
/// Lowercases, drops digit and ASCII punctuation characters, and collapses
/// runs of whitespace into a single space with no leading or trailing blanks.
///
/// ```rust
/// use sign_translate::utils::normalize_phrase;
///
/// assert_eq!(normalize_phrase("  How ARE you?? "), "how are you");
/// assert_eq!(normalize_phrase("Thank-you 2"), "thankyou");
/// ```
#[must_use]
pub fn normalize_phrase(text: &str) -> String {
    let filtered: String = text
        .chars()
        .filter(|c| !c.is_numeric() && !c.is_ascii_punctuation())
        .flat_map(char::to_lowercase)
        .collect();

    filtered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Phrase key for a reference clip file: the file stem, normalized
///
/// Returns `None` when nothing is left after normalization (e.g. `"123.mov"`).
#[must_use]
pub fn phrase_from_file_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_string_lossy();
    let phrase = normalize_phrase(&stem);
    (!phrase.is_empty()).then_some(phrase)
}

/// Label for a training folder name: digits and `.` removed, otherwise verbatim
///
/// This is the labelling rule the offline training job applied when it fitted
/// the label encoder, so bundles created from a dataset reuse it unchanged.
#[must_use]
pub fn training_label(folder_name: &str) -> String {
    folder_name
        .chars()
        .filter(|c| !c.is_numeric() && *c != '.')
        .collect()
}

/// Split a sentence into normalized words
#[must_use]
pub fn sentence_words(sentence: &str) -> Vec<String> {
    normalize_phrase(sentence)
        .split(' ')
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_normalize_phrase() {
        assert_eq!(normalize_phrase("Hello"), "hello");
        assert_eq!(normalize_phrase("I am sad, how are you?"), "i am sad how are you");
        assert_eq!(normalize_phrase("\tgood   morning\n"), "good morning");
        assert_eq!(normalize_phrase("..."), "");
        assert_eq!(normalize_phrase(""), "");
    }

    #[test]
    fn test_phrase_from_file_name() {
        let path = PathBuf::from("/data/clips/Good Morning 2.MOV");
        assert_eq!(phrase_from_file_name(&path).as_deref(), Some("good morning"));

        let path = PathBuf::from("how_are_you.mp4");
        assert_eq!(phrase_from_file_name(&path).as_deref(), Some("howareyou"));

        let path = PathBuf::from("42.mov");
        assert_eq!(phrase_from_file_name(&path), None);
    }

    #[test]
    fn test_training_label_keeps_case_and_spaces() {
        assert_eq!(training_label("12. Thank You"), " Thank You");
        assert_eq!(training_label("Hello"), "Hello");
    }

    #[test]
    fn test_sentence_words() {
        assert_eq!(sentence_words("Hello, world!"), vec!["hello", "world"]);
        assert!(sentence_words("   ").is_empty());
    }
}
