//! Per-topic fallback metadata and remote conversation contexts

use serde::{Deserialize, Serialize};

/// Conversation context handed to the remote engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackContext {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub text: String,
}

impl FallbackContext {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }

    /// A context with neither id nor text carries nothing
    pub fn is_empty(&self) -> bool {
        self.id.is_empty() && self.text.is_empty()
    }
}

/// Fallback option authored on a topic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackOption {
    #[default]
    Default,
    Silent,
    Conversation,
    LocalOnly,
    /// Resolve fallbacks in one turn without a remote answer
    NoRemote,
}

/// Fallback metadata for one topic
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFallback {
    #[serde(default)]
    pub option: FallbackOption,
    #[serde(default)]
    pub context: FallbackContext,
}

impl NodeFallback {
    pub fn with_option(option: FallbackOption) -> Self {
        Self {
            option,
            context: FallbackContext::default(),
        }
    }
}
