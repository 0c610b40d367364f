//! Latest translation result, shared between a producer and its readers
//!
//! A single-slot [`tokio::sync::watch`] channel holds the most recent
//! [`TranslationRecord`]. Every publish bumps the version, so readers can tell
//! a new result from a repeated one even when the text is identical.

use crate::error::{ErrorKind, TranslateError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

/// Failure recorded in place of a translation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedError {
    pub kind: ErrorKind,
    pub message: String,
}

/// One published result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationRecord {
    /// Zero before anything was published, then incremented per publish
    pub version: u64,
    pub text: Option<String>,
    pub error: Option<RecordedError>,
    /// Identifier of the source clip, e.g. its storage key
    pub clip_id: Option<String>,
    /// First path component of `clip_id`, when it has more than one
    pub folder: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl TranslationRecord {
    fn empty() -> Self {
        Self {
            version: 0,
            text: None,
            error: None,
            clip_id: None,
            folder: None,
            updated_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.version == 0
    }
}

/// Owner of the latest-result slot
#[derive(Debug)]
pub struct TranslationStore {
    sender: watch::Sender<TranslationRecord>,
}

impl Default for TranslationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TranslationStore {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(TranslationRecord::empty());
        Self { sender }
    }

    /// Record a successful translation of `clip_id`
    pub fn publish_success(&self, clip_id: &str, text: impl Into<String>) -> TranslationRecord {
        let text = text.into();
        self.publish(clip_id, Some(text), None)
    }

    /// Record that translating `clip_id` failed
    pub fn publish_failure(&self, clip_id: &str, error: &TranslateError) -> TranslationRecord {
        let recorded = RecordedError {
            kind: error.kind(),
            message: error.to_string(),
        };
        self.publish(clip_id, None, Some(recorded))
    }

    fn publish(
        &self,
        clip_id: &str,
        text: Option<String>,
        error: Option<RecordedError>,
    ) -> TranslationRecord {
        let mut snapshot = TranslationRecord::empty();
        self.sender.send_modify(|record| {
            record.version += 1;
            record.text = text;
            record.error = error;
            record.clip_id = Some(clip_id.to_string());
            record.folder = folder_of(clip_id);
            record.updated_at = Utc::now();
            // Copy under the channel lock so concurrent publishers keep their own record
            snapshot = record.clone();
        });
        log::debug!("Published translation v{} for {}", snapshot.version, clip_id);
        snapshot
    }

    /// Snapshot of the current record
    #[must_use]
    pub fn latest(&self) -> TranslationRecord {
        self.sender.borrow().clone()
    }

    /// Receiver notified on every publish
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TranslationRecord> {
        self.sender.subscribe()
    }
}

fn folder_of(clip_id: &str) -> Option<String> {
    let (folder, rest) = clip_id.split_once('/')?;
    (!folder.is_empty() && !rest.is_empty()).then(|| folder.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_initial_record_is_empty() {
        let store = TranslationStore::new();
        let record = store.latest();
        assert!(record.is_empty());
        assert_eq!(record.text, None);
        assert_eq!(record.error, None);
    }

    #[test]
    fn test_versions_increase_on_identical_text() {
        let store = TranslationStore::new();
        let first = store.publish_success("user1/clip.mov", "hello");
        let second = store.publish_success("user1/clip.mov", "hello");
        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        assert_eq!(second.text.as_deref(), Some("hello"));
        assert_eq!(second.folder.as_deref(), Some("user1"));
        assert!(second.updated_at >= first.updated_at);
    }

    #[test]
    fn test_failure_replaces_text() {
        let store = TranslationStore::new();
        store.publish_success("a/b.mov", "thank you");
        let error = TranslateError::clip_unreadable(PathBuf::from("b.mov"), "corrupt");
        let record = store.publish_failure("a/b.mov", &error);

        assert_eq!(record.text, None);
        let recorded = record.error.unwrap();
        assert_eq!(recorded.kind, ErrorKind::ClipUnreadable);
        assert!(recorded.message.contains("corrupt"));

        let json = serde_json::to_value(store.latest()).unwrap();
        assert_eq!(json["error"]["kind"], "clip_unreadable");
    }

    #[test]
    fn test_folder_of() {
        assert_eq!(folder_of("uploads/x.mov").as_deref(), Some("uploads"));
        assert_eq!(folder_of("x.mov"), None);
        assert_eq!(folder_of("/x.mov"), None);
        assert_eq!(folder_of("dir/"), None);
    }

    #[test]
    fn test_concurrent_publishers_get_their_own_record() {
        let store = std::sync::Arc::new(TranslationStore::new());
        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let store = std::sync::Arc::clone(&store);
                std::thread::spawn(move || {
                    (0..100)
                        .map(|n| {
                            let clip_id = format!("w{worker}/{n}.mov");
                            let record = store.publish_success(&clip_id, clip_id.clone());
                            assert_eq!(record.clip_id.as_deref(), Some(clip_id.as_str()));
                            assert_eq!(record.text.as_deref(), Some(clip_id.as_str()));
                            record.version
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut versions: Vec<u64> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();
        versions.sort_unstable();
        assert_eq!(versions, (1..=400).collect::<Vec<u64>>());
        assert_eq!(store.latest().version, 400);
    }

    #[tokio::test]
    async fn test_subscribers_see_latest() {
        let store = TranslationStore::new();
        let mut receiver = store.subscribe();

        store.publish_success("f/one.mov", "hello");
        receiver.changed().await.unwrap();
        assert_eq!(receiver.borrow_and_update().text.as_deref(), Some("hello"));

        // Only the latest value is retained between reads
        store.publish_success("f/two.mov", "sorry");
        store.publish_success("f/three.mov", "world");
        receiver.changed().await.unwrap();
        let record = receiver.borrow_and_update().clone();
        assert_eq!(record.version, 3);
        assert_eq!(record.clip_id.as_deref(), Some("f/three.mov"));
    }
}
