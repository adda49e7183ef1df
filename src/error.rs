//! Error types for fallback arbitration and the command surface
//!
//! Every error here is recoverable. Callers log them or turn them into a
//! failed command status; none of them should end a conversation.

use thiserror::Error;

/// Result type for fallback operations
pub type FallbackResult<T> = Result<T, FallbackError>;

/// Fallback arbitration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FallbackError {
    // ==================
    // Arbitration
    // ==================
    /// No policy in the chain claimed the turn
    #[error("No fallback policy claimed this turn")]
    NoPolicyClaimed,

    /// A counter command arrived while no policy owns the turn
    #[error("No active fallback policy")]
    NoActivePolicy,

    /// No remote context could be resolved for the previous location
    #[error("No fallback context for topic '{topic}' in module '{module}'")]
    MissingContext { module: String, topic: String },

    /// Second turn entered with an input that is not the resumption event
    #[error("Second fallback turn entered with unexpected input '{input}'")]
    StaleTransition { input: String },

    // ==================
    // Command surface
    // ==================
    /// Command name not recognized
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Command called without a required argument
    #[error("Command '{command}' requires argument '{argument}'")]
    MissingArgument { command: String, argument: String },
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}
