//! State definitions shared by the arbitrator and the tracker

use serde::{Deserialize, Serialize};

/// Where the default policy is within its two-turn protocol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FallbackState {
    /// Waiting for a fallback to start
    #[default]
    Initial,
    /// Initial turn handled, remote answer requested
    AfterInitial,
    /// Resuming with the remote answer
    Second,
}

impl std::fmt::Display for FallbackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FallbackState::Initial => "INITIAL",
            FallbackState::AfterInitial => "AFTER_INITIAL",
            FallbackState::Second => "SECOND",
        };
        write!(f, "{}", name)
    }
}

/// Coarse session phase reported by the surrounding engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Awake,
    Sleep,
}

/// Read-only snapshot of the conversation, owned by the surrounding engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    #[serde(default)]
    pub phase: SessionPhase,
    /// The agent is currently allowed to be interrupted (silence on fallback)
    #[serde(default)]
    pub interruptible: bool,
}

impl ConversationState {
    pub fn interruptible() -> Self {
        Self {
            phase: SessionPhase::Awake,
            interruptible: true,
        }
    }
}

/// One of the two markup save buffers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkupSlot {
    #[default]
    Slot0,
    Slot1,
}

impl MarkupSlot {
    /// The other slot
    pub fn toggled(self) -> Self {
        match self {
            MarkupSlot::Slot0 => MarkupSlot::Slot1,
            MarkupSlot::Slot1 => MarkupSlot::Slot0,
        }
    }

    pub fn index(self) -> u8 {
        match self {
            MarkupSlot::Slot0 => 0,
            MarkupSlot::Slot1 => 1,
        }
    }
}

impl std::fmt::Display for MarkupSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// Which fallback policy owns a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyKind {
    Event,
    Silent,
    Conversation,
    SocialOnly,
    Default,
}

impl PolicyKind {
    pub fn name(&self) -> &'static str {
        match self {
            PolicyKind::Event => "EVENT",
            PolicyKind::Silent => "SILENT",
            PolicyKind::Conversation => "CONVERSATION",
            PolicyKind::SocialOnly => "SOCIAL_ONLY",
            PolicyKind::Default => "DEFAULT",
        }
    }
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
