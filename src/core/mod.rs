//! Core modules: fallback arbitration, reprompt tracking and the surfaces around them

pub mod arbitrator;
pub mod catalog;
pub mod commands;
pub mod default_policy;
pub mod engine;
pub mod markup;
pub mod policy;
pub mod reprompt;
pub mod session;
pub mod topic;
pub mod tracker;
pub mod api;

pub use arbitrator::{FallbackArbitrator, HandleOutcome};
pub use catalog::{ContentCatalog, StaticCatalog};
pub use commands::{dispatch, Command};
pub use default_policy::DefaultPolicy;
pub use engine::{DialogueEngine, EngineScript, ScriptedEngine, StockLine};
pub use policy::{FallbackPolicy, Location};
pub use reprompt::{RepromptEntry, RepromptQueue};
pub use session::{parse_script, CommandCall, Session, SessionSummary, TurnScript};
pub use tracker::{LastPrompt, PromptEngine, RepromptTracker};
pub use api::{create_router, run_server};
