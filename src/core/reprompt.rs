//! Bounded queue of interrupted prompts
//!
//! Holds at most one entry per module and at most `REPROMPT_QUEUE_CAPACITY`
//! entries overall. The oldest entry is evicted first.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::topic::{format_name, module_id, normalize_module};
use crate::REPROMPT_QUEUE_CAPACITY;

/// A prompt that was cut off and may be replayed later
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepromptEntry {
    pub module: String,
    pub topic: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepromptQueue {
    entries: VecDeque<RepromptEntry>,
}

impl RepromptQueue {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(REPROMPT_QUEUE_CAPACITY),
        }
    }

    /// Store `text` as the reprompt for the module that owns `topic`,
    /// replacing that module's previous entry
    pub fn record(&mut self, text: &str, topic: &str) {
        let topic = format_name(topic, true).to_lowercase();
        let module = module_id(&topic);

        self.entries.retain(|e| e.module != module);
        self.entries.push_back(RepromptEntry {
            module: module.clone(),
            topic,
            text: text.to_string(),
        });
        while self.entries.len() > REPROMPT_QUEUE_CAPACITY {
            if let Some(evicted) = self.entries.pop_front() {
                debug!(module = %evicted.module, "reprompt evicted");
            }
        }
        debug!(module = %module, queued = self.entries.len(), "reprompt recorded");
    }

    pub fn clear_for_module(&mut self, module: &str) {
        let module = normalize_module(module);
        self.entries.retain(|e| e.module != module);
    }

    pub fn clear_all(&mut self) {
        self.entries.clear();
    }

    pub fn find_by_topic(&self, topic: &str) -> Option<&RepromptEntry> {
        let topic = format_name(topic, true).to_lowercase();
        self.entries.iter().find(|e| e.topic == topic)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = &RepromptEntry> {
        self.entries.iter()
    }
}
