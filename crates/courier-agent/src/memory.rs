//! Bounded conversational memory

use chrono::{DateTime, Utc};
use courier_core::Role;
use courier_llm::LlmMessage;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Most entries an agent remembers. Older entries are evicted first.
pub const MEMORY_CAP: usize = 100;

/// Entries fed back to the model as conversation context.
pub const CONTEXT_WINDOW: usize = 10;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl MemoryEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

impl From<&MemoryEntry> for LlmMessage {
    fn from(entry: &MemoryEntry) -> Self {
        LlmMessage::new(entry.role.as_str(), entry.content.clone())
    }
}

/// FIFO-evicting log of user and assistant turns, serialized as a plain array.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<MemoryEntry>", into = "Vec<MemoryEntry>")]
pub struct Memory {
    entries: VecDeque<MemoryEntry>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.push_entry(MemoryEntry::new(role, content));
    }

    pub fn push_entry(&mut self, entry: MemoryEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > MEMORY_CAP {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemoryEntry> {
        self.entries.iter()
    }

    /// The `n` most recent entries, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &MemoryEntry> {
        self.entries.iter().skip(self.entries.len().saturating_sub(n))
    }

    /// Recent entries as model messages, starting at a user turn.
    pub fn context(&self) -> Vec<LlmMessage> {
        self.recent(CONTEXT_WINDOW)
            .skip_while(|e| e.role == Role::Assistant)
            .map(LlmMessage::from)
            .collect()
    }
}

impl From<Vec<MemoryEntry>> for Memory {
    fn from(entries: Vec<MemoryEntry>) -> Self {
        let mut memory = Memory::new();
        for entry in entries {
            memory.push_entry(entry);
        }
        memory
    }
}

impl From<Memory> for Vec<MemoryEntry> {
    fn from(memory: Memory) -> Self {
        memory.entries.into()
    }
}
