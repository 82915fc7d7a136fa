//! Whole-corpus undo/redo.
//!
//! Snapshots share the corpus `Arc`, so taking one is O(1); the corpus is copied only when the
//! live side is next mutated.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::ir::TranslationUnit;

pub type Corpus = Arc<Vec<TranslationUnit>>;

#[derive(Clone, Debug)]
pub struct HistoryItem {
    pub id: u64,
    pub units: Corpus,
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

/// Listing entry without the corpus payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub units: usize,
}

impl From<&HistoryItem> for HistoryEntry {
    fn from(item: &HistoryItem) -> Self {
        Self {
            id: item.id,
            timestamp: item.timestamp,
            description: item.description.clone(),
            units: item.units.len(),
        }
    }
}

pub struct HistoryManager {
    /// Front is newest.
    undo: VecDeque<HistoryItem>,
    redo: Vec<HistoryItem>,
    capacity: usize,
    next_id: u64,
}

impl HistoryManager {
    pub fn new(capacity: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            capacity: capacity.max(1),
            next_id: 1,
        }
    }

    fn item(&mut self, units: Corpus, description: &str) -> HistoryItem {
        let id = self.next_id;
        self.next_id += 1;
        HistoryItem {
            id,
            units,
            timestamp: Utc::now(),
            description: description.to_string(),
        }
    }

    /// Records `current` as the state to return to, before a mutation.
    pub fn snapshot(&mut self, current: &Corpus, description: &str) -> u64 {
        let item = self.item(Arc::clone(current), description);
        let id = item.id;
        self.undo.push_front(item);
        while self.undo.len() > self.capacity {
            self.undo.pop_back();
        }
        self.redo.clear();
        debug!(id, description, depth = self.undo.len(), "history snapshot");
        id
    }

    /// Pops the newest snapshot; `current` moves to the redo stack. `None` when empty.
    pub fn undo(&mut self, current: &Corpus) -> Option<Corpus> {
        let item = self.undo.pop_front()?;
        let live = self.item(Arc::clone(current), &item.description);
        self.redo.push(live);
        Some(item.units)
    }

    pub fn redo(&mut self, current: &Corpus) -> Option<Corpus> {
        let item = self.redo.pop()?;
        let live = self.item(Arc::clone(current), &item.description);
        self.undo.push_front(live);
        while self.undo.len() > self.capacity {
            self.undo.pop_back();
        }
        Some(item.units)
    }

    /// Returns the corpus of entry `id` (newest when `None`), discarding it and every newer
    /// entry and clearing redo. `None` when no such entry exists.
    pub fn restore(&mut self, id: Option<u64>) -> Option<Corpus> {
        let pos = match id {
            None => {
                if self.undo.is_empty() {
                    return None;
                }
                0
            }
            Some(id) => self.undo.iter().position(|h| h.id == id)?,
        };
        let mut removed = self.undo.drain(..=pos);
        let target = removed.next_back()?;
        drop(removed);
        self.redo.clear();
        debug!(id = target.id, remaining = self.undo.len(), "history restore");
        Some(target.units)
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.undo.iter().map(HistoryEntry::from).collect()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn len(&self) -> usize {
        self.undo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.undo.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(50)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(texts: &[&str]) -> Corpus {
        Arc::new(
            texts
                .iter()
                .enumerate()
                .map(|(i, t)| TranslationUnit::new(i.to_string(), i as i64, "src", *t, "en", "fr"))
                .collect(),
        )
    }

    #[test]
    fn undo_redo_round_trip() {
        let mut h = HistoryManager::new(10);
        let before = corpus(&["a"]);
        h.snapshot(&before, "edit");
        let after = corpus(&["b"]);
        let restored = h.undo(&after).expect("undo");
        assert_eq!(*restored, *before);
        let again = h.redo(&restored).expect("redo");
        assert_eq!(*again, *after);
    }

    #[test]
    fn empty_stacks_are_noops() {
        let mut h = HistoryManager::new(10);
        let c = corpus(&["a"]);
        assert!(h.undo(&c).is_none());
        assert!(h.redo(&c).is_none());
        assert!(h.restore(None).is_none());
        assert!(h.restore(Some(42)).is_none());
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut h = HistoryManager::new(3);
        for i in 0..5 {
            h.snapshot(&corpus(&[&i.to_string()]), &format!("step {i}"));
        }
        let descs: Vec<String> = h.entries().into_iter().map(|e| e.description).collect();
        assert_eq!(descs, vec!["step 4", "step 3", "step 2"]);
    }

    #[test]
    fn snapshot_clears_redo() {
        let mut h = HistoryManager::new(10);
        h.snapshot(&corpus(&["a"]), "one");
        h.undo(&corpus(&["b"]));
        assert!(h.can_redo());
        h.snapshot(&corpus(&["c"]), "two");
        assert!(!h.can_redo());
    }

    #[test]
    fn restore_discards_newer_entries() {
        let mut h = HistoryManager::new(10);
        let first = h.snapshot(&corpus(&["v1"]), "one");
        h.snapshot(&corpus(&["v2"]), "two");
        h.snapshot(&corpus(&["v3"]), "three");
        h.undo(&corpus(&["v4"]));
        let restored = h.restore(Some(first)).expect("restore");
        assert_eq!(restored[0].target.text, "v1");
        assert!(h.is_empty());
        assert!(!h.can_redo());
    }

    #[test]
    fn restore_defaults_to_newest() {
        let mut h = HistoryManager::new(10);
        h.snapshot(&corpus(&["v1"]), "one");
        h.snapshot(&corpus(&["v2"]), "two");
        let restored = h.restore(None).expect("restore");
        assert_eq!(restored[0].target.text, "v2");
        assert_eq!(h.len(), 1);
    }
}
