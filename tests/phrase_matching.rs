//! Phrase library indexing and sentence decomposition against real directories

use sign_translate::{
    error::{Result, TranslateError},
    DatasetLayout, MatchStrategy, PhraseLibrary, PhraseMatcher,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn touch(path: &Path) -> PathBuf {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, b"clip").unwrap();
    path.to_path_buf()
}

fn flat_dataset(names: &[&str]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for name in names {
        touch(&dir.path().join(name));
    }
    dir
}

fn phrases(segments: &[sign_translate::MatchSegment]) -> Vec<&str> {
    segments.iter().map(|s| s.phrase.as_str()).collect()
}

#[test]
fn test_flat_layout_indexes_normalized_file_names() -> Result<()> {
    let dir = flat_dataset(&["Hello.mov", "How Are You.MP4", "thank-you 2.avi", "notes.txt", "42.mov"]);
    let library = PhraseLibrary::build(dir.path(), DatasetLayout::Flat)?;

    assert_eq!(library.len(), 3);
    assert!(library.contains("hello"));
    assert!(library.contains("how are you"));
    assert!(library.contains("thankyou"));
    assert!(!library.contains("notes"));
    assert_eq!(library.max_phrase_words(), 3);
    assert_eq!(library.get("hello"), Some(dir.path().join("Hello.mov").as_path()));
    Ok(())
}

#[test]
fn test_nested_layout_uses_label_folder() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let first = touch(&dir.path().join("Greetings/1. Hello/a.mov"));
    touch(&dir.path().join("Greetings/1. Hello/b.mov"));
    touch(&dir.path().join("Greetings/2. Good Morning/clip.mp4"));
    touch(&dir.path().join("stray.mov"));

    let library = PhraseLibrary::build(dir.path(), DatasetLayout::Nested)?;
    assert_eq!(library.len(), 2);
    assert_eq!(library.get("hello"), Some(first.as_path()));
    assert!(library.contains("good morning"));
    assert!(!library.contains("stray"));

    let auto = PhraseLibrary::build(dir.path(), DatasetLayout::Auto)?;
    assert_eq!(auto.len(), 3);
    Ok(())
}

#[test]
fn test_library_build_is_idempotent() -> Result<()> {
    let dir = flat_dataset(&["b.mov", "A.mov", "c d.mp4", "a.mp4"]);
    let first: Vec<(String, PathBuf)> = PhraseLibrary::build(dir.path(), DatasetLayout::Flat)?
        .iter()
        .map(|(p, c)| (p.to_string(), c.to_path_buf()))
        .collect();
    let second: Vec<(String, PathBuf)> = PhraseLibrary::build(dir.path(), DatasetLayout::Flat)?
        .iter()
        .map(|(p, c)| (p.to_string(), c.to_path_buf()))
        .collect();
    assert_eq!(first, second);
    // "A.mov" sorts before "a.mp4" and wins the collision
    let library = PhraseLibrary::build(dir.path(), DatasetLayout::Flat)?;
    assert_eq!(library.get("a"), Some(dir.path().join("A.mov").as_path()));
    Ok(())
}

#[test]
fn test_missing_dataset_is_an_io_error() {
    let dir = TempDir::new().unwrap();
    let err = PhraseLibrary::build(&dir.path().join("absent"), DatasetLayout::Flat).unwrap_err();
    assert!(matches!(err, TranslateError::Io(_)));
}

#[test]
fn test_dp_skips_unknown_word() -> Result<()> {
    let dir = flat_dataset(&["hello.mov", "world.mov"]);
    let library = PhraseLibrary::build(dir.path(), DatasetLayout::Flat)?;
    let segments = PhraseMatcher::new(MatchStrategy::DynamicProgramming)
        .match_sentence("hello unknownword world", &library)?;

    assert_eq!(phrases(&segments), vec!["hello", "world"]);
    assert_eq!(segments[0].clip_path, dir.path().join("hello.mov"));
    assert_eq!(segments[1].clip_path, dir.path().join("world.mov"));
    assert_eq!(segments[1].start_word, 2);
    Ok(())
}

#[test]
fn test_dp_full_coverage_with_single_words() -> Result<()> {
    let dir = flat_dataset(&["i.mov", "am.mov", "fine.mov", "i am.mov"]);
    let library = PhraseLibrary::build(dir.path(), DatasetLayout::Flat)?;
    let segments = PhraseMatcher::new(MatchStrategy::DynamicProgramming)
        .match_sentence("I am fine!", &library)?;

    // Maximum phrase count prefers three single words over "i am" + "fine"
    assert_eq!(phrases(&segments), vec!["i", "am", "fine"]);
    Ok(())
}

#[test]
fn test_greedy_prefers_longest_window() -> Result<()> {
    let dir = flat_dataset(&["i.mov", "am.mov", "fine.mov", "i am.mov"]);
    let library = PhraseLibrary::build(dir.path(), DatasetLayout::Flat)?;
    let segments = PhraseMatcher::new(MatchStrategy::Greedy { max_window: 3 })
        .match_sentence("I am fine", &library)?;
    assert_eq!(phrases(&segments), vec!["i am", "fine"]);
    Ok(())
}

#[test]
fn test_greedy_fails_on_unknown_word() -> Result<()> {
    let dir = flat_dataset(&["hello.mov", "world.mov"]);
    let library = PhraseLibrary::build(dir.path(), DatasetLayout::Flat)?;
    let err = PhraseMatcher::new(MatchStrategy::Greedy { max_window: 3 })
        .match_sentence("hello unknownword world", &library)
        .unwrap_err();

    assert!(matches!(err, TranslateError::NoPhraseMatch(_)));
    assert!(err.to_string().contains("unknownword"));
    Ok(())
}

#[test]
fn test_empty_sentence_yields_no_segments() -> Result<()> {
    let dir = flat_dataset(&["hello.mov"]);
    let library = PhraseLibrary::build(dir.path(), DatasetLayout::Flat)?;
    for strategy in [
        MatchStrategy::DynamicProgramming,
        MatchStrategy::Greedy { max_window: 3 },
    ] {
        assert!(PhraseMatcher::new(strategy).match_sentence(" ?! 12 ", &library)?.is_empty());
    }
    Ok(())
}
