//! Checkpoint store: per-conversation progress that gates re-processing
//!
//! For every conversation the checkpoint keeps a high-water mark (largest
//! timestamp fully processed) and the set of message ids already emitted.
//! A message at or below the mark, or whose id was already emitted, is never
//! bucketed again.
//!
//! The store is only ever written after every publish of a run succeeded,
//! and always through a temp-file rename.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::RecapError;
use crate::types::{ConversationId, MessageEvent};

/// Current on-disk layout version.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Durable progress record, persisted as `state.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Conversation → high-water mark. Absent means no timestamp processed yet.
    #[serde(default)]
    pub conv_hwm: BTreeMap<ConversationId, f64>,
    /// Conversation → message ids already emitted.
    #[serde(default)]
    pub seen: BTreeMap<ConversationId, BTreeSet<String>>,
}

fn default_version() -> u32 {
    CHECKPOINT_VERSION
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            conv_hwm: BTreeMap::new(),
            seen: BTreeMap::new(),
        }
    }
}

impl Checkpoint {
    pub fn high_water_mark(&self, conversation: &str) -> Option<f64> {
        self.conv_hwm.get(conversation).copied()
    }

    pub fn has_seen(&self, conversation: &str, message_id: &str) -> bool {
        self.seen
            .get(conversation)
            .is_some_and(|ids| ids.contains(message_id))
    }

    /// Whether an event still needs to be processed.
    pub fn is_eligible(&self, event: &MessageEvent) -> bool {
        if let (Some(ts), Some(hwm)) = (
            event.timestamp,
            self.high_water_mark(&event.conversation_id),
        ) {
            if ts <= hwm {
                return false;
            }
        }
        !self.has_seen(&event.conversation_id, &event.message_id)
    }

    /// Fold a run's progress into a new checkpoint. `self` is left untouched.
    pub fn merged(&self, progress: &RunProgress) -> Checkpoint {
        let mut next = self.clone();
        for (conversation, entry) in progress.iter() {
            next.seen
                .entry(conversation.clone())
                .or_default()
                .extend(entry.new_ids.iter().cloned());
            if let Some(max_ts) = entry.max_timestamp {
                let raise = next
                    .conv_hwm
                    .get(conversation)
                    .map_or(true, |current| max_ts > *current);
                if raise {
                    next.conv_hwm.insert(conversation.clone(), max_ts);
                }
            }
        }
        next
    }
}

/// Progress of one conversation during the current run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationProgress {
    pub new_ids: HashSet<String>,
    /// Largest timestamp seen, starting from the conversation's existing mark.
    pub max_timestamp: Option<f64>,
}

/// Transient per-run progress; discarded if the run fails before commit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunProgress {
    conversations: HashMap<ConversationId, ConversationProgress>,
}

impl RunProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `event` was bucketed. `existing_hwm` seeds the running max
    /// the first time a conversation is touched.
    pub fn record(&mut self, event: &MessageEvent, existing_hwm: Option<f64>) {
        let entry = self
            .conversations
            .entry(event.conversation_id.clone())
            .or_insert_with(|| ConversationProgress {
                new_ids: HashSet::new(),
                max_timestamp: existing_hwm,
            });
        entry.new_ids.insert(event.message_id.clone());
        if let Some(ts) = event.timestamp {
            if entry.max_timestamp.map_or(true, |max| ts > max) {
                entry.max_timestamp = Some(ts);
            }
        }
    }

    /// Whether `event` was already recorded in this run.
    pub fn contains(&self, event: &MessageEvent) -> bool {
        self.conversations
            .get(&event.conversation_id)
            .is_some_and(|p| p.new_ids.contains(&event.message_id))
    }

    pub fn get(&self, conversation: &str) -> Option<&ConversationProgress> {
        self.conversations.get(conversation)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ConversationId, &ConversationProgress)> {
        self.conversations.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    /// Total number of message ids recorded across conversations.
    pub fn message_count(&self) -> usize {
        self.conversations.values().map(|p| p.new_ids.len()).sum()
    }
}

/// File-backed checkpoint store.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the checkpoint, or an empty one when none was written yet.
    pub fn load(&self) -> Result<Checkpoint, RecapError> {
        if !self.path.exists() {
            log::info!(
                "No checkpoint at {}, starting from scratch",
                self.path.display()
            );
            return Ok(Checkpoint::default());
        }
        let content = std::fs::read_to_string(&self.path)?;
        let checkpoint: Checkpoint =
            serde_json::from_str(&content).map_err(|e| RecapError::CorruptState {
                path: self.path.clone(),
                message: e.to_string(),
            })?;
        if checkpoint.version > CHECKPOINT_VERSION {
            return Err(RecapError::CorruptState {
                path: self.path.clone(),
                message: format!(
                    "unsupported checkpoint version {} (expected <= {})",
                    checkpoint.version, CHECKPOINT_VERSION
                ),
            });
        }
        Ok(checkpoint)
    }

    /// Merge `progress` into `current` and persist the result atomically.
    ///
    /// Returns the committed checkpoint. On error nothing observable changed
    /// and `current` remains the source of truth.
    pub fn commit(
        &self,
        current: &Checkpoint,
        progress: &RunProgress,
    ) -> Result<Checkpoint, RecapError> {
        let mut next = current.merged(progress);
        next.version = CHECKPOINT_VERSION;
        let content = serde_json::to_string_pretty(&next)?;
        crate::util::atomic_write_str(&self.path, &content)?;
        log::info!(
            "Checkpoint committed: {} conversation(s), {} new message(s)",
            progress.len(),
            progress.message_count()
        );
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn event(conv: &str, id: &str, ts: Option<f64>) -> MessageEvent {
        MessageEvent {
            conversation_id: conv.to_string(),
            role: Role::User,
            text: "hi".to_string(),
            timestamp: ts,
            message_id: id.to_string(),
            conversation_title: String::new(),
        }
    }

    #[test]
    fn test_empty_checkpoint_accepts_everything() {
        let cp = Checkpoint::default();
        assert!(cp.is_eligible(&event("c", "m", Some(1.0))));
        assert!(cp.is_eligible(&event("c", "m", None)));
    }

    #[test]
    fn test_high_water_mark_gates_timestamps() {
        let mut cp = Checkpoint::default();
        cp.conv_hwm.insert("c".to_string(), 100.0);
        assert!(!cp.is_eligible(&event("c", "old", Some(99.0))));
        assert!(!cp.is_eligible(&event("c", "same", Some(100.0))));
        assert!(cp.is_eligible(&event("c", "new", Some(100.5))));
        // Other conversations are unaffected
        assert!(cp.is_eligible(&event("d", "old", Some(1.0))));
    }

    #[test]
    fn test_untimestamped_messages_dedupe_by_id() {
        let mut cp = Checkpoint::default();
        cp.seen
            .entry("c".to_string())
            .or_default()
            .insert("m1".to_string());
        assert!(!cp.is_eligible(&event("c", "m1", None)));
        assert!(cp.is_eligible(&event("c", "m2", None)));
    }

    #[test]
    fn test_progress_seeds_max_from_existing_mark() {
        let mut progress = RunProgress::new();
        progress.record(&event("c", "m1", Some(50.0)), Some(80.0));
        progress.record(&event("c", "m2", None), Some(80.0));
        let entry = progress.get("c").unwrap();
        assert_eq!(entry.max_timestamp, Some(80.0));
        assert_eq!(entry.new_ids.len(), 2);

        progress.record(&event("c", "m3", Some(120.0)), Some(80.0));
        assert_eq!(progress.get("c").unwrap().max_timestamp, Some(120.0));
        assert_eq!(progress.message_count(), 3);
    }

    #[test]
    fn test_merge_never_lowers_mark() {
        let mut cp = Checkpoint::default();
        cp.conv_hwm.insert("c".to_string(), 200.0);
        let mut progress = RunProgress::new();
        progress.record(&event("c", "late-id", None), None);
        progress.record(&event("c", "m", Some(150.0)), None);

        let next = cp.merged(&progress);
        assert_eq!(next.high_water_mark("c"), Some(200.0));
        assert!(next.has_seen("c", "late-id"));
        assert!(next.has_seen("c", "m"));
        // Original is untouched
        assert!(!cp.has_seen("c", "m"));
    }

    #[test]
    fn test_store_load_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("state.json"));
        assert_eq!(store.load().unwrap(), Checkpoint::default());
    }

    #[test]
    fn test_store_commit_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("state.json"));
        let mut progress = RunProgress::new();
        progress.record(&event("c", "m1", Some(10.0)), None);

        let committed = store.commit(&Checkpoint::default(), &progress).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(committed, loaded);
        assert_eq!(loaded.high_water_mark("c"), Some(10.0));
    }

    #[test]
    fn test_store_reads_legacy_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(
            &path,
            r#"{"version": 1, "conv_hwm": {"c": 1758844800.5}, "seen": {"c": ["a", "b"]}}"#,
        )
        .unwrap();
        let cp = CheckpointStore::new(&path).load().unwrap();
        assert_eq!(cp.high_water_mark("c"), Some(1_758_844_800.5));
        assert!(cp.has_seen("c", "b"));
    }

    #[test]
    fn test_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            CheckpointStore::new(&path).load(),
            Err(RecapError::CorruptState { .. })
        ));
    }
}
