//! In-memory topic directory.
//!
//! Best-effort cache only: it is rebuilt from nothing on restart and cannot
//! observe edits made outside this process, so callers prefer the live
//! remote answer and fall back here on transport failure.

use std::collections::HashMap;

use crate::{decode, TopicState};

/// What the bot knows about one forum topic it created or touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRecord {
    pub id: i64,
    pub display_name: String,
    pub creator_name: String,
}

impl TopicRecord {
    /// Lifecycle state is always derived from the display name, never stored;
    /// a stored state field could silently diverge from the title.
    pub fn state(&self) -> TopicState {
        decode(&self.display_name).1
    }

    pub fn base_name(&self) -> String {
        decode(&self.display_name).0
    }
}

/// Lowercase + trim, the normalization used by the name index.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Debug, Default)]
pub struct TopicDirectory {
    by_id: HashMap<i64, TopicRecord>,
    by_name: HashMap<String, i64>,
}

impl TopicDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a record, keeping the name index in sync. A
    /// replacement under a new display name drops the stale index entry.
    pub fn put(&mut self, record: TopicRecord) {
        if let Some(old) = self.by_id.get(&record.id) {
            let old_key = normalize_name(&old.display_name);
            if self.by_name.get(&old_key) == Some(&record.id) {
                self.by_name.remove(&old_key);
            }
        }
        self.by_name
            .insert(normalize_name(&record.display_name), record.id);
        self.by_id.insert(record.id, record);
    }

    pub fn get(&self, id: i64) -> Option<&TopicRecord> {
        self.by_id.get(&id)
    }

    pub fn remove(&mut self, id: i64) -> Option<TopicRecord> {
        let record = self.by_id.remove(&id)?;
        let key = normalize_name(&record.display_name);
        if self.by_name.get(&key) == Some(&id) {
            self.by_name.remove(&key);
        }
        Some(record)
    }

    pub fn find_by_normalized_name(&self, name: &str) -> Option<i64> {
        self.by_name.get(&normalize_name(name)).copied()
    }

    pub fn records(&self) -> impl Iterator<Item = &TopicRecord> {
        self.by_id.values()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
