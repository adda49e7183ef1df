//! Core types for fallback arbitration

mod state;
mod output;
mod reason;
mod turn;
mod context;

pub use state::{FallbackState, SessionPhase, ConversationState, MarkupSlot, PolicyKind};
pub use output::{OutputType, CommandStatus, CommandResult, TurnReport};
pub use reason::FallbackKind;
pub use turn::{Turn, TurnInput, TurnOutput, InputKind, RemoteRequest};
pub use context::{FallbackContext, FallbackOption, NodeFallback};
