//! Agent memory tiers.
//!
//! Each agent owns its memory exclusively; there is no cross-agent access.
//! - Short-term: session-scoped, cleared when the agent stops
//! - Working: task-scoped, cleared on every task completion
//! - Long-term: categorized knowledge with per-key access counters
//! - Conversation history: bounded ring of recent messages

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::Message;

/// A stored value with its write timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub value: Value,
    pub stored_at: DateTime<Utc>,
}

impl MemoryEntry {
    fn new(value: Value) -> Self {
        Self {
            value,
            stored_at: Utc::now(),
        }
    }
}

/// A long-term entry with an access counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub value: Value,
    pub stored_at: DateTime<Utc>,
    pub access_count: u64,
}

/// Which tier to read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryTier {
    Any,
    ShortTerm,
    Working,
    LongTerm,
}

/// Tiered memory owned by a single agent.
#[derive(Debug, Default)]
pub struct AgentMemory {
    short_term: HashMap<String, MemoryEntry>,
    working: HashMap<String, MemoryEntry>,
    /// category -> key -> entry
    long_term: HashMap<String, HashMap<String, KnowledgeEntry>>,
    conversation: std::collections::VecDeque<Message>,
    conversation_bound: usize,
}

impl AgentMemory {
    /// Default bound on retained conversation messages.
    pub const DEFAULT_CONVERSATION_BOUND: usize = 100;

    pub fn new(conversation_bound: usize) -> Self {
        Self {
            conversation_bound,
            ..Self::default()
        }
    }

    /// Store a session-scoped value.
    pub fn store_short_term(&mut self, key: impl Into<String>, value: Value) {
        self.short_term.insert(key.into(), MemoryEntry::new(value));
    }

    /// Store a task-scoped value.
    pub fn store_working(&mut self, key: impl Into<String>, value: Value) {
        self.working.insert(key.into(), MemoryEntry::new(value));
    }

    /// Store a categorized long-term value.
    pub fn store_knowledge(&mut self, category: impl Into<String>, key: impl Into<String>, value: Value) {
        self.long_term.entry(category.into()).or_default().insert(
            key.into(),
            KnowledgeEntry {
                value,
                stored_at: Utc::now(),
                access_count: 0,
            },
        );
    }

    /// Retrieve a value, searching tiers in order: short-term, working,
    /// long-term. Long-term reads increment the entry's access counter.
    pub fn retrieve(&mut self, key: &str, tier: MemoryTier) -> Option<Value> {
        if matches!(tier, MemoryTier::Any | MemoryTier::ShortTerm) {
            if let Some(entry) = self.short_term.get(key) {
                return Some(entry.value.clone());
            }
        }
        if matches!(tier, MemoryTier::Any | MemoryTier::Working) {
            if let Some(entry) = self.working.get(key) {
                return Some(entry.value.clone());
            }
        }
        if matches!(tier, MemoryTier::Any | MemoryTier::LongTerm) {
            for category in self.long_term.values_mut() {
                if let Some(entry) = category.get_mut(key) {
                    entry.access_count += 1;
                    return Some(entry.value.clone());
                }
            }
        }
        None
    }

    /// Access count of a long-term key, if present.
    pub fn knowledge_access_count(&self, key: &str) -> Option<u64> {
        self.long_term
            .values()
            .find_map(|category| category.get(key).map(|e| e.access_count))
    }

    /// Append a message to the conversation ring, dropping the oldest
    /// when the bound is exceeded.
    pub fn record_message(&mut self, message: Message) {
        self.conversation.push_back(message);
        while self.conversation.len() > self.conversation_bound {
            self.conversation.pop_front();
        }
    }

    /// Most recent conversation messages, newest last.
    pub fn recent_messages(&self, limit: usize) -> Vec<&Message> {
        let skip = self.conversation.len().saturating_sub(limit);
        self.conversation.iter().skip(skip).collect()
    }

    /// Clear working memory. Called on every task exit path.
    pub fn clear_working(&mut self) {
        self.working.clear();
    }

    /// Clear session memory. Called on agent stop.
    pub fn clear_short_term(&mut self) {
        self.short_term.clear();
    }

    pub fn short_term_len(&self) -> usize {
        self.short_term.len()
    }

    pub fn working_len(&self) -> usize {
        self.working.len()
    }

    pub fn knowledge_categories(&self) -> usize {
        self.long_term.len()
    }

    pub fn conversation_len(&self) -> usize {
        self.conversation.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::message::MessageKind;
    use crate::domain::models::task::ContextMap;
    use serde_json::json;

    #[test]
    fn test_tier_lookup_order() {
        let mut memory = AgentMemory::new(10);
        memory.store_knowledge("general", "k", json!("long"));
        memory.store_working("k", json!("working"));
        memory.store_short_term("k", json!("short"));

        assert_eq!(memory.retrieve("k", MemoryTier::Any), Some(json!("short")));
        assert_eq!(
            memory.retrieve("k", MemoryTier::Working),
            Some(json!("working"))
        );
        assert_eq!(
            memory.retrieve("k", MemoryTier::LongTerm),
            Some(json!("long"))
        );
        assert_eq!(memory.retrieve("missing", MemoryTier::Any), None);
    }

    #[test]
    fn test_long_term_access_counter() {
        let mut memory = AgentMemory::new(10);
        memory.store_knowledge("patterns", "singleton", json!({"uses": 3}));
        assert_eq!(memory.knowledge_access_count("singleton"), Some(0));

        memory.retrieve("singleton", MemoryTier::LongTerm);
        memory.retrieve("singleton", MemoryTier::Any);
        assert_eq!(memory.knowledge_access_count("singleton"), Some(2));
    }

    #[test]
    fn test_working_memory_cleared() {
        let mut memory = AgentMemory::new(10);
        memory.store_working("scratch", json!(1));
        memory.store_short_term("session", json!(2));
        memory.clear_working();
        assert_eq!(memory.working_len(), 0);
        assert_eq!(memory.short_term_len(), 1);
    }

    #[test]
    fn test_conversation_ring_bound() {
        let mut memory = AgentMemory::new(3);
        for i in 0..5 {
            let msg = Message::direct(
                format!("sender-{i}"),
                "me",
                MessageKind::StatusInquiry,
                ContextMap::new(),
            );
            memory.record_message(msg);
        }
        assert_eq!(memory.conversation_len(), 3);
        let recent = memory.recent_messages(10);
        assert_eq!(recent[0].sender_id, "sender-2");
        assert_eq!(recent[2].sender_id, "sender-4");
    }

    #[test]
    fn test_recent_messages_limit() {
        let mut memory = AgentMemory::new(10);
        for i in 0..4 {
            memory.record_message(Message::direct(
                format!("s{i}"),
                "me",
                MessageKind::StatusInquiry,
                ContextMap::new(),
            ));
        }
        let recent = memory.recent_messages(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].sender_id, "s3");
    }
}
