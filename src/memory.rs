//! Long-term memory store.
//!
//! An append-only list of facts about the user, capped at the most recent 50
//! entries to keep the prompt context bounded. The session manager reads the
//! rendered context once at session open; new facts arrive only through the
//! `remember_info` tool handler. The store itself is a cheap cloneable
//! handle, so the dispatcher and the host UI can share it.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use uuid::Uuid;

/// Maximum retained entries; older facts are dropped first.
pub const MEMORY_CAP: usize = 50;

/// One remembered fact about the user.
#[derive(Debug, Clone, PartialEq)]
pub struct Memory {
    pub id: Uuid,
    pub content: String,
    /// Unix milliseconds at append time
    pub timestamp: u64,
}

/// Shared, capped store of remembered facts.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<VecDeque<Memory>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing facts (oldest first). Entries beyond the
    /// cap are dropped from the front, matching append semantics.
    pub fn with_entries(entries: impl IntoIterator<Item = String>) -> Self {
        let store = Self::new();
        for content in entries {
            store.append(content);
        }
        store
    }

    /// Append a fact, dropping the oldest entry when the cap is reached.
    pub fn append(&self, content: impl Into<String>) -> Memory {
        let memory = Memory {
            id: Uuid::new_v4(),
            content: content.into(),
            timestamp: unix_millis(),
        };
        let mut entries = self.inner.lock();
        entries.push_back(memory.clone());
        while entries.len() > MEMORY_CAP {
            entries.pop_front();
        }
        memory
    }

    /// Snapshot of all entries, oldest first.
    pub fn entries(&self) -> Vec<Memory> {
        self.inner.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Drop all remembered facts.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Render the prompt-context block consumed at session open. Empty store
    /// renders to an empty string so the persona is sent alone.
    pub fn context(&self) -> String {
        let entries = self.inner.lock();
        if entries.is_empty() {
            return String::new();
        }
        let mut block = String::from(
            "IMPORTANT - LONG TERM MEMORY:\n\
             You have access to the following facts you have learned about the user \
             from previous conversations. Use them to personalize your responses and \
             show you care.\n",
        );
        for memory in entries.iter() {
            block.push_str("- ");
            block.push_str(&memory.content);
            block.push('\n');
        }
        // Drop the trailing newline so callers control spacing.
        block.pop();
        block
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
