//! Fallback classification codes
//!
//! The kind is reported to the dialogue engine so downstream counting and
//! analytics know which escalation step produced the turn's output.

use serde::{Deserialize, Serialize};

/// How a fallback turn was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FallbackKind {
    /// Second turn started, outcome not decided yet
    Unknown,
    /// A topic-specific local rule answered
    LocalRule,
    /// The generic fallback line
    LocalFallback,
    /// The conversation moved to another topic
    MoveOn,
    /// Asked whether to keep chatting
    Confirmation,
    /// Asked the user to clarify
    Clarification,
    /// Replayed the current prompt
    Reprompt,
    /// Resolved locally without waiting for the remote engine
    NoRemote,
    /// Deferred entirely to the remote engine
    UseRemote,
}

impl FallbackKind {
    /// Get the code string (for logging)
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unknown => "FALLBACK_UNKNOWN",
            Self::LocalRule => "FALLBACK_LOCAL_RULE",
            Self::LocalFallback => "FALLBACK_LOCAL_FALLBACK",
            Self::MoveOn => "FALLBACK_MOVE_ON",
            Self::Confirmation => "FALLBACK_CONFIRMATION",
            Self::Clarification => "CLARIFICATION",
            Self::Reprompt => "REPROMPT",
            Self::NoRemote => "FALLBACK_NO_REMOTE",
            Self::UseRemote => "FALLBACK_USE_REMOTE",
        }
    }

    /// Get human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Unknown => "Fallback in progress",
            Self::LocalRule => "Answered by the topic's local rule",
            Self::LocalFallback => "Generic fallback line",
            Self::MoveOn => "Moved on to another topic",
            Self::Confirmation => "Asked to keep chatting",
            Self::Clarification => "Asked for clarification",
            Self::Reprompt => "Repeated the current prompt",
            Self::NoRemote => "Resolved without the remote engine",
            Self::UseRemote => "Deferred to the remote engine",
        }
    }
}

impl std::fmt::Display for FallbackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.description())
    }
}
