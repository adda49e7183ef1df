//! Fallback arbitrator: picks the policy that owns each turn
//!
//! On turn start the chain is walked in priority order and the first policy
//! that claims the turn becomes active until the next turn start. Lifecycle
//! callbacks and counter commands are forwarded to it.

use tracing::{error, info, warn};

use crate::config::FallbackConfig;
use crate::core::catalog::ContentCatalog;
use crate::core::default_policy::DefaultPolicy;
use crate::core::engine::{functions, DialogueEngine, StockLine};
use crate::core::policy::{ClaimContext, FallbackPolicy, Location};
use crate::core::topic::resolve_topic;
use crate::error::{FallbackError, FallbackResult};
use crate::types::{ConversationState, FallbackState, OutputType, PolicyKind, SessionPhase, Turn};

/// Result of `handle_fallback`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Fallback handling is switched off; the dialogue engine keeps the turn
    Disabled,
    /// The active policy handled the turn. `by_policy` is false when the
    /// generic fallback line had to be added on its behalf.
    Handled { policy: PolicyKind, by_policy: bool },
}

/// Owns the policy chain and the previous location
#[derive(Debug, Clone)]
pub struct FallbackArbitrator {
    config: FallbackConfig,
    policies: Vec<FallbackPolicy>,
    active: Option<usize>,
    location: Location,
}

impl FallbackArbitrator {
    pub fn new(config: FallbackConfig) -> Self {
        let policies = FallbackPolicy::chain(&config);
        Self {
            config,
            policies,
            active: None,
            location: Location::default(),
        }
    }

    /// Pick the policy for this turn and let it prepare the turn
    pub fn on_turn_started(&mut self, turn: &mut Turn, state: &ConversationState, catalog: &dyn ContentCatalog) {
        if !self.config.enabled {
            return;
        }
        self.active = None;

        let node = catalog.node_fallback(&self.location.module, &self.location.topic);
        let ctx = ClaimContext {
            turn,
            state,
            prior_module: &self.location.module,
            node: &node,
        };
        self.active = self.policies.iter_mut().position(|p| p.claims(&ctx));

        match self.active {
            Some(index) => {
                let policy = &mut self.policies[index];
                info!(policy = %policy.kind(), "fallback policy selected");
                policy.on_turn_started(turn, &self.location, catalog);
            }
            None => {
                warn!(error = %FallbackError::NoPolicyClaimed, "no fallback policy will handle this turn");
            }
        }
    }

    /// Run the active policy's fallback.
    ///
    /// When the policy declines, the generic fallback line is used instead.
    /// Fails with `NoPolicyClaimed` when nothing owns the turn.
    pub fn handle_fallback(&mut self, engine: &mut dyn DialogueEngine) -> FallbackResult<HandleOutcome> {
        if !self.config.enabled {
            info!("fallback handling disabled; leaving the turn to the dialogue engine");
            return Ok(HandleOutcome::Disabled);
        }
        let index = self.active.ok_or(FallbackError::NoPolicyClaimed)?;
        let policy = &mut self.policies[index];
        let kind = policy.kind();

        info!(policy = %kind, "handling fallback");
        let by_policy = policy.handle_fallback(engine);
        if !by_policy {
            warn!(policy = %kind, "policy did not handle the turn; using the generic fallback line");
            engine.set_output_type(OutputType::Fallback);
            engine.add_output(StockLine::FallbackRepeat);
            engine.call_function(functions::KEEP_COUNTER, &[]);
        }
        Ok(HandleOutcome::Handled { policy: kind, by_policy })
    }

    /// Record where the turn ended and forward to the active policy
    pub fn on_turn_finished(&mut self, turn: &Turn) {
        if let Some(output) = turn.output.as_ref() {
            self.location.module = output.module.clone();
            if output.module.is_empty() {
                error!("turn output has no module; cannot determine the last topic");
                self.location.topic.clear();
            } else if let Some(topic) = resolve_topic(&output.module, &output.topics) {
                self.location.topic = topic;
            } else {
                info!(topic = %self.location.topic, "staying in the previous topic");
            }
            self.location.content_id = output.content_id.clone();
        }

        if let Some(index) = self.active {
            self.policies[index].on_turn_finished(turn);
        }
    }

    /// Accepted remote answers finish the turn for fallback purposes
    pub fn on_remote_turn_accepted(&mut self, turn: &Turn) {
        self.on_turn_finished(turn);
    }

    pub fn on_turn_aborted(&mut self, turn: &Turn) {
        if let Some(index) = self.active {
            info!(input = %turn.input.text, "turn aborted");
            self.policies[index].on_turn_aborted();
        }
    }

    /// Waking up from sleep starts every counter over
    pub fn on_session_state_changed(&mut self, current: SessionPhase, previous: SessionPhase) {
        if previous == SessionPhase::Sleep && current != SessionPhase::Sleep {
            info!("session woke up; resetting all fallback counters");
            self.reset_all_counters();
        }
    }

    // =========================================================================
    // Counter commands
    // =========================================================================

    fn active_mut(&mut self) -> FallbackResult<&mut FallbackPolicy> {
        let index = self.active.ok_or(FallbackError::NoActivePolicy)?;
        Ok(&mut self.policies[index])
    }

    fn active_ref(&self) -> FallbackResult<&FallbackPolicy> {
        let index = self.active.ok_or(FallbackError::NoActivePolicy)?;
        Ok(&self.policies[index])
    }

    pub fn keep_counter(&mut self) -> FallbackResult<()> {
        info!("keeping the fallback counter on request");
        self.active_mut()?.keep_counter();
        Ok(())
    }

    pub fn reset_counter(&mut self) -> FallbackResult<()> {
        self.active_mut()?.reset_counter();
        Ok(())
    }

    pub fn restore_counter(&mut self) -> FallbackResult<()> {
        info!("restoring the fallback counter to the move-on threshold");
        self.active_mut()?.restore_counter();
        Ok(())
    }

    pub fn counter(&self) -> FallbackResult<u32> {
        Ok(self.active_ref()?.counter())
    }

    pub fn last_speech_input(&self) -> FallbackResult<String> {
        Ok(self.active_ref()?.last_speech_input().to_string())
    }

    /// Reset every policy's counter, active or not
    pub fn reset_all_counters(&mut self) {
        for policy in &mut self.policies {
            policy.reset_counter();
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn active_policy(&self) -> Option<PolicyKind> {
        self.active.map(|i| self.policies[i].kind())
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// The catch-all policy (always last in the chain)
    pub fn default_policy(&self) -> Option<&DefaultPolicy> {
        self.policies.iter().find_map(|p| match p {
            FallbackPolicy::Default(policy) => Some(policy),
            _ => None,
        })
    }

    pub fn default_counter(&self) -> u32 {
        self.default_policy().map(|p| p.counter()).unwrap_or(0)
    }

    pub fn default_state(&self) -> FallbackState {
        self.default_policy().map(|p| p.state()).unwrap_or_default()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::StaticCatalog;
    use crate::core::engine::{EngineScript, ScriptedEngine};
    use crate::types::{FallbackOption, NodeFallback, TurnInput, TurnOutput};

    fn arbitrator() -> FallbackArbitrator {
        FallbackArbitrator::new(FallbackConfig::default())
    }

    fn finish_in(arb: &mut FallbackArbitrator, module: &str, topics: &[&str]) {
        let turn = Turn::new(TurnInput::speech("ok"))
            .with_output(TurnOutput::new("Okay.", OutputType::Normal).in_module(module, topics));
        arb.on_turn_finished(&turn);
    }

    #[test]
    fn test_speech_goes_to_default() {
        let mut arb = arbitrator();
        let mut turn = Turn::new(TurnInput::speech("blorp"));
        arb.on_turn_started(&mut turn, &ConversationState::default(), &StaticCatalog::new());
        assert_eq!(arb.active_policy(), Some(PolicyKind::Default));
    }

    #[test]
    fn test_event_preempts_silent() {
        let mut arb = arbitrator();
        let mut turn = Turn::new(TurnInput::event("eb-timer-done"));
        arb.on_turn_started(&mut turn, &ConversationState::interruptible(), &StaticCatalog::new());
        assert_eq!(arb.active_policy(), Some(PolicyKind::Event));
    }

    #[test]
    fn test_topic_metadata_selects_policy() {
        let catalog = StaticCatalog::new().with_topic(
            "root",
            "root_quiet",
            NodeFallback::with_option(FallbackOption::Silent),
        );
        let mut arb = arbitrator();
        finish_in(&mut arb, "root", &["~root_quiet.start"]);
        assert_eq!(arb.location().topic, "root_quiet");

        let mut turn = Turn::new(TurnInput::speech("blorp"));
        arb.on_turn_started(&mut turn, &ConversationState::default(), &catalog);
        assert_eq!(arb.active_policy(), Some(PolicyKind::Silent));
    }

    #[test]
    fn test_open_conversation_module() {
        let mut arb = arbitrator();
        finish_in(&mut arb, "MOXIMUSPRIME", &[]);
        let mut turn = Turn::new(TurnInput::speech("what is a star"));
        arb.on_turn_started(&mut turn, &ConversationState::default(), &StaticCatalog::new());
        assert_eq!(arb.active_policy(), Some(PolicyKind::Conversation));
    }

    #[test]
    fn test_topic_kept_when_not_traversed() {
        let mut arb = arbitrator();
        finish_in(&mut arb, "root", &["~root_intro"]);
        finish_in(&mut arb, "root", &["~gt_joke"]);
        assert_eq!(arb.location().topic, "root_intro");
        finish_in(&mut arb, "", &[]);
        assert_eq!(arb.location().topic, "");
    }

    #[test]
    fn test_declined_policy_gets_generic_line() {
        let mut arb = arbitrator();
        let mut turn = Turn::new(TurnInput::speech("blorp"));
        turn.social_chat_enabled = true;
        arb.on_turn_started(&mut turn, &ConversationState::default(), &StaticCatalog::new());
        assert_eq!(arb.active_policy(), Some(PolicyKind::SocialOnly));

        let mut engine = ScriptedEngine::new(EngineScript::default());
        let outcome = arb.handle_fallback(&mut engine).unwrap();
        assert_eq!(outcome, HandleOutcome::Handled { policy: PolicyKind::SocialOnly, by_policy: false });
        assert_eq!(engine.output_type(), Some(OutputType::Fallback));
        assert_eq!(engine.lines(), &[StockLine::FallbackRepeat.text().to_string()]);
    }

    #[test]
    fn test_commands_without_active_policy_fail() {
        let mut arb = arbitrator();
        assert_eq!(arb.keep_counter(), Err(FallbackError::NoActivePolicy));
        assert_eq!(arb.counter(), Err(FallbackError::NoActivePolicy));
        let mut engine = ScriptedEngine::new(EngineScript::default());
        assert_eq!(arb.handle_fallback(&mut engine), Err(FallbackError::NoPolicyClaimed));
    }

    #[test]
    fn test_disabled_leaves_turn_alone() {
        let config = FallbackConfig { enabled: false, ..FallbackConfig::default() };
        let mut arb = FallbackArbitrator::new(config);
        let mut turn = Turn::new(TurnInput::speech("blorp"));
        arb.on_turn_started(&mut turn, &ConversationState::default(), &StaticCatalog::new());
        assert_eq!(arb.active_policy(), None);

        let mut engine = ScriptedEngine::new(EngineScript::default());
        assert_eq!(arb.handle_fallback(&mut engine), Ok(HandleOutcome::Disabled));
        assert!(engine.lines().is_empty());
    }

    #[test]
    fn test_wake_resets_all_counters() {
        let mut arb = arbitrator();
        let mut turn = Turn::new(TurnInput::speech("blorp"));
        arb.on_turn_started(&mut turn, &ConversationState::default(), &StaticCatalog::new());
        arb.restore_counter().unwrap();
        assert_eq!(arb.counter(), Ok(crate::MOVE_ON_THRESHOLD));

        arb.on_session_state_changed(SessionPhase::Sleep, SessionPhase::Awake);
        assert_eq!(arb.default_counter(), crate::MOVE_ON_THRESHOLD);
        arb.on_session_state_changed(SessionPhase::Awake, SessionPhase::Sleep);
        assert_eq!(arb.default_counter(), 0);
    }
}
