//! fallback-arbiter: fallback arbitration for turn-based conversational agents
//!
//! Two reactive state holders driven by turn lifecycle callbacks:
//! - `FallbackArbitrator` picks the fallback policy that owns a turn
//! - `RepromptTracker` caches interrupted prompts and pairs save/restore markup

pub mod config;
pub mod core;
pub mod error;
pub mod types;

// =============================================================================
// ESCALATION THRESHOLDS [C]
// =============================================================================

/// Every third unresolved fallback tries to move the conversation on
pub const MOVE_ON_THRESHOLD: u32 = 3;

/// Every second unresolved fallback (that is not a move-on) asks for confirmation
pub const CHAT_THRESHOLD: u32 = 2;

// =============================================================================
// REPROMPT TRACKING [C]
// =============================================================================

/// Maximum number of cached reprompts (one per module)
pub const REPROMPT_QUEUE_CAPACITY: usize = 3;

/// Pseudo module entered when the dialogue engine asks for a markup save
pub const STATE_CHANGE_MODULE: &str = "statechangetangentmodule";

/// Topic recorded while inside the state-change pseudo module
pub const STATE_CHANGE_TOPIC: &str = "statechangetangentmodule_topicname";

/// Event raised when a reprompt is requested but nothing is cached
pub const REPROMPT_EVENT: &str = "eb-reprompt";

/// Variable attached to the reprompt event so scripts can tell who sent it
pub const REPROMPT_SOURCE_VARIABLE: &str = "$eb_reprompt_source";

// =============================================================================
// VERSION
// =============================================================================

pub const VERSION: &str = "1.0.0";
