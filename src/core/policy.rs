//! Fallback policy chain
//!
//! Order (first claim wins):
//! - EVENT: a non-resume event arrived while nothing matched
//! - SILENT: the agent may be interrupted, or the topic asks for silence
//! - CONVERSATION: open conversation goes straight to the remote engine
//! - SOCIAL_ONLY: social chat, local rules only
//! - DEFAULT: catch-all with escalation (see `default_policy`)

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::FallbackConfig;
use crate::core::catalog::ContentCatalog;
use crate::core::default_policy::DefaultPolicy;
use crate::core::engine::{functions, variables, DialogueEngine, StockLine};
use crate::error::{FallbackError, FallbackResult};
use crate::types::{
    ConversationState, FallbackKind, FallbackOption, NodeFallback, OutputType, PolicyKind, RemoteRequest, Turn,
};

/// Where the conversation was when the previous turn finished
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub module: String,
    pub content_id: String,
    pub topic: String,
}

impl Location {
    pub fn new(module: impl Into<String>, content_id: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            content_id: content_id.into(),
            topic: topic.into(),
        }
    }
}

/// Inputs to a policy's claim check
#[derive(Debug, Clone, Copy)]
pub struct ClaimContext<'a> {
    pub turn: &'a Turn,
    pub state: &'a ConversationState,
    pub prior_module: &'a str,
    pub node: &'a NodeFallback,
}

/// Attach the most specific non-empty context to the remote request.
///
/// Lookup order: topic, content id, module, global default. A request that
/// already carries a context is left alone.
pub fn update_remote_context(
    request: &mut RemoteRequest,
    location: &Location,
    catalog: &dyn ContentCatalog,
) -> FallbackResult<()> {
    if !request.context.is_empty() {
        return Ok(());
    }

    let candidates = [
        catalog.node_fallback(&location.module, &location.topic).context,
        catalog.content_context(&location.module, &location.content_id),
        catalog.module_context(&location.module),
        catalog.default_context(),
    ];

    match candidates.into_iter().find(|c| !c.is_empty()) {
        Some(context) => {
            request.context = context;
            Ok(())
        }
        None => Err(FallbackError::MissingContext {
            module: location.module.clone(),
            topic: location.topic.clone(),
        }),
    }
}

/// One policy in the chain
#[derive(Debug, Clone)]
pub enum FallbackPolicy {
    Event { resume_event: String },
    Silent,
    Conversation { open_module: String },
    SocialOnly,
    Default(DefaultPolicy),
}

impl FallbackPolicy {
    /// The fixed chain, in priority order
    pub fn chain(config: &FallbackConfig) -> Vec<FallbackPolicy> {
        vec![
            FallbackPolicy::Event { resume_event: config.speech_received_event.clone() },
            FallbackPolicy::Silent,
            FallbackPolicy::Conversation { open_module: config.open_conversation_module.clone() },
            FallbackPolicy::SocialOnly,
            FallbackPolicy::Default(DefaultPolicy::new(config)),
        ]
    }

    pub fn kind(&self) -> PolicyKind {
        match self {
            FallbackPolicy::Event { .. } => PolicyKind::Event,
            FallbackPolicy::Silent => PolicyKind::Silent,
            FallbackPolicy::Conversation { .. } => PolicyKind::Conversation,
            FallbackPolicy::SocialOnly => PolicyKind::SocialOnly,
            FallbackPolicy::Default(_) => PolicyKind::Default,
        }
    }

    pub fn claims(&mut self, ctx: &ClaimContext<'_>) -> bool {
        match self {
            // a promoted resume event never comes back as an event fallback
            FallbackPolicy::Event { resume_event } => {
                ctx.turn.input.is_event() && !ctx.turn.input.is_event_named(resume_event)
            }
            FallbackPolicy::Silent => ctx.state.interruptible || ctx.node.option == FallbackOption::Silent,
            FallbackPolicy::Conversation { open_module } => {
                ctx.prior_module == open_module.as_str() || ctx.node.option == FallbackOption::Conversation
            }
            FallbackPolicy::SocialOnly => {
                ctx.turn.social_chat_enabled || ctx.node.option == FallbackOption::LocalOnly
            }
            FallbackPolicy::Default(policy) => policy.claims(ctx.node),
        }
    }

    pub fn on_turn_started(&mut self, turn: &mut Turn, location: &Location, catalog: &dyn ContentCatalog) {
        match self {
            FallbackPolicy::Conversation { .. } => {
                info!("conversation policy in effect; allowing multiple remote answers");
                turn.remote_request.allow_multiple = true;
            }
            FallbackPolicy::Default(policy) => policy.on_turn_started(turn, location, catalog),
            _ => {}
        }
    }

    /// Try to handle the fallback; true when the policy produced the output
    pub fn handle_fallback(&mut self, engine: &mut dyn DialogueEngine) -> bool {
        match self {
            FallbackPolicy::Event { .. } => {
                engine.call_function(functions::KEEP_REJOINDER, &[]);
                engine.call_function(functions::KEEP_COUNTER, &[]);
                true
            }
            FallbackPolicy::Silent => {
                engine.set_variable(variables::NO_PRELUDE, "true");
                engine.call_function(functions::KEEP_REJOINDER, &[]);
                engine.call_function(functions::NO_REPEAT, &[]);
                engine.set_output_type(OutputType::Empty);
                engine.call_function(functions::KEEP_COUNTER, &[]);
                true
            }
            FallbackPolicy::Conversation { .. } => {
                engine.set_output_type(OutputType::Fallback);
                engine.set_fallback_kind(FallbackKind::UseRemote);
                engine.add_output(StockLine::FallbackRepeat);
                true
            }
            FallbackPolicy::SocialOnly => reuse_authored_rule(engine),
            FallbackPolicy::Default(policy) => policy.handle_fallback(engine),
        }
    }

    pub fn on_turn_finished(&mut self, turn: &Turn) {
        if let FallbackPolicy::Default(policy) = self {
            policy.on_turn_finished(turn);
        }
    }

    pub fn on_turn_aborted(&mut self) {
        if let FallbackPolicy::Default(policy) = self {
            policy.on_turn_aborted();
        }
    }

    pub fn keep_counter(&mut self) {
        if let FallbackPolicy::Default(policy) = self {
            policy.keep_counter();
        }
    }

    pub fn reset_counter(&mut self) {
        if let FallbackPolicy::Default(policy) = self {
            policy.reset_counter();
        }
    }

    pub fn restore_counter(&mut self) {
        if let FallbackPolicy::Default(policy) = self {
            policy.restore_counter();
        }
    }

    /// Escalation counter (always 0 for stateless policies)
    pub fn counter(&self) -> u32 {
        match self {
            FallbackPolicy::Default(policy) => policy.counter(),
            _ => 0,
        }
    }

    pub fn last_speech_input(&self) -> &str {
        match self {
            FallbackPolicy::Default(policy) => policy.last_speech_input(),
            _ => "",
        }
    }
}

/// Reuse the rule named in `$$fallback_rule`, if any
fn reuse_authored_rule(engine: &mut dyn DialogueEngine) -> bool {
    let rule = engine.variable(variables::FALLBACK_RULE).unwrap_or_default();
    if rule.is_empty() {
        return false;
    }
    let handled = engine.reuse_rule(&rule);
    if !handled {
        warn!(rule = %rule, "local fallback rule reuse failed");
    }
    handled
}

// =============================================================================
// TESTS
// =============================================================================
