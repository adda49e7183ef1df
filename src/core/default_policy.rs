//! Default fallback policy: two-turn escalation protocol
//!
//! State transitions:
//! - INITIAL → AFTER_INITIAL: fallback handled, remote answer requested
//! - AFTER_INITIAL → SECOND: turn finished (unconditional)
//! - SECOND → INITIAL: turn finished, counter updated
//! - any → starting state: turn aborted
//!
//! With `skip_remote` both halves run in the same turn.

use tracing::{debug, info, warn};

use crate::config::FallbackConfig;
use crate::core::catalog::ContentCatalog;
use crate::core::engine::{functions, variables, DialogueEngine, StockLine, CLARIFICATION_SIGNAL, CONFIRMATION_TANGENT};
use crate::core::policy::{update_remote_context, Location};
use crate::error::FallbackError;
use crate::types::{FallbackKind, FallbackOption, FallbackState, NodeFallback, OutputType, Turn, TurnOutput};
use crate::{CHAT_THRESHOLD, MOVE_ON_THRESHOLD};

/// Remote setting that stops the language model from asking questions back
pub const NO_BIAS_SETTING: &str = "no_gpt_bias";

/// Remote setting naming the language model to use
pub const MODEL_SETTING: &str = "chat_gpt3_model";

/// Catch-all policy with an escalating counter
#[derive(Debug, Clone)]
pub struct DefaultPolicy {
    state: FallbackState,
    /// State at turn start, restored on abort
    starting_state: FallbackState,
    counter: u32,
    handled_this_turn: bool,
    reset_requested: bool,
    skip_increment: bool,
    skip_remote: bool,
    module: String,
    topic: String,
    local_rule: String,
    last_speech_input: String,
    resume_event: String,
    remote_model: String,
}

impl DefaultPolicy {
    pub fn new(config: &FallbackConfig) -> Self {
        Self {
            state: FallbackState::Initial,
            starting_state: FallbackState::Initial,
            counter: 0,
            handled_this_turn: false,
            reset_requested: false,
            skip_increment: false,
            skip_remote: false,
            module: String::new(),
            topic: String::new(),
            local_rule: String::new(),
            last_speech_input: String::new(),
            resume_event: config.speech_received_event.clone(),
            remote_model: config.remote_model.clone(),
        }
    }

    /// Always claims. Latches whether this topic wants a remote answer.
    pub fn claims(&mut self, node: &NodeFallback) -> bool {
        self.skip_remote = node.option == FallbackOption::NoRemote;
        info!(skip_remote = self.skip_remote, "default policy claims turn");
        true
    }

    // =========================================================================
    // Counter commands
    // =========================================================================

    /// Do not reset the counter when this turn finishes
    pub fn keep_counter(&mut self) {
        self.handled_this_turn = true;
    }

    pub fn reset_counter(&mut self) {
        info!(counter = self.counter, "resetting fallback counter on request");
        self.counter = 0;
        self.reset_requested = true;
    }

    /// Jump to the move-on threshold, so the next escalation is a confirmation again
    pub fn restore_counter(&mut self) {
        self.counter = MOVE_ON_THRESHOLD;
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn state(&self) -> FallbackState {
        self.state
    }

    pub fn skip_remote(&self) -> bool {
        self.skip_remote
    }

    /// User speech that triggered the pending fallback (empty outside one)
    pub fn last_speech_input(&self) -> &str {
        &self.last_speech_input
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub fn on_turn_started(&mut self, turn: &mut Turn, location: &Location, catalog: &dyn ContentCatalog) {
        self.module = location.module.clone();
        self.topic = location.topic.clone();

        self.handled_this_turn = false;
        self.reset_requested = false;
        self.skip_increment = false;
        self.starting_state = self.state;

        if self.state == FallbackState::Second && !turn.input.is_event_named(&self.resume_event) {
            let err = FallbackError::StaleTransition { input: turn.input.text.clone() };
            warn!(error = %err, "resetting default fallback policy");
            self.state = FallbackState::Initial;
            self.last_speech_input.clear();
        }

        if self.state == FallbackState::Initial {
            if !self.skip_remote {
                info!(module = %self.module, topic = %self.topic, "initial fallback turn; setting up remote request");
                if let Err(err) = update_remote_context(&mut turn.remote_request, location, catalog) {
                    warn!(error = %err, "remote chat fallbacks disabled for this turn");
                }
                let request = &mut turn.remote_request;
                request.allow_multiple = true;
                request.settings.insert(NO_BIAS_SETTING.to_string(), "true".to_string());
                request.settings.insert(MODEL_SETTING.to_string(), self.remote_model.clone());
            }
        } else if turn.input.is_event_named(&self.resume_event) {
            info!("setting up the second fallback turn; promoting the resume event");
            turn.input.promote();
        } else {
            let err = FallbackError::StaleTransition { input: turn.input.text.clone() };
            warn!(error = %err, state = %self.state, "resetting default fallback policy");
            self.state = FallbackState::Initial;
            self.last_speech_input.clear();
        }
    }

    /// Decide this turn's fallback. Always ends up providing output.
    pub fn handle_fallback(&mut self, engine: &mut dyn DialogueEngine) -> bool {
        engine.set_output_type(OutputType::Fallback);
        engine.set_variable(variables::NO_PRELUDE, "true");

        if self.skip_remote {
            if self.handle_in_one_turn(engine) {
                engine.set_fallback_kind(FallbackKind::NoRemote);
                return true;
            }
        } else {
            let handled = match self.state {
                FallbackState::Initial => self.initial_turn(engine),
                FallbackState::Second => self.second_turn(engine),
                FallbackState::AfterInitial => false,
            };
            if handled {
                return true;
            }
        }

        info!("no escalation step answered; using the generic fallback line");
        let kind = if self.skip_remote {
            FallbackKind::NoRemote
        } else {
            FallbackKind::LocalFallback
        };
        engine.set_fallback_kind(kind);
        engine.add_output(StockLine::FallbackRepeat);
        engine.call_function(functions::KEEP_COUNTER, &[]);
        true
    }

    pub fn on_turn_finished(&mut self, turn: &Turn) {
        debug!(input = %turn.input.text, state = %self.state, "default policy turn finished");
        let Some(output) = turn.output.as_ref() else {
            warn!("no output found in the turn");
            return;
        };

        match self.state {
            FallbackState::Initial => {
                if self.should_reset(output) {
                    info!(counter = self.counter, "resetting the fallback counter");
                    self.counter = 0;
                } else {
                    debug!("fallback policy idle; keeping the counter");
                }
            }
            FallbackState::AfterInitial => {
                info!("initial fallback turn finished; waiting for the second turn");
                self.state = FallbackState::Second;
                self.last_speech_input = turn.input.text.clone();
            }
            FallbackState::Second => {
                if self.should_increment(output) {
                    self.counter += 1;
                    info!(counter = self.counter, "incremented the fallback counter");
                } else {
                    info!(counter = self.counter, "not incrementing the fallback counter");
                }
                self.state = FallbackState::Initial;
                self.last_speech_input.clear();
            }
        }
    }

    pub fn on_turn_aborted(&mut self) {
        info!(state = %self.starting_state, "turn aborted; reverting default policy state");
        self.state = self.starting_state;
    }

    // =========================================================================
    // Escalation steps
    // =========================================================================

    fn initial_turn(&mut self, engine: &mut dyn DialogueEngine) -> bool {
        self.handled_this_turn = true;
        self.state = FallbackState::AfterInitial;
        self.local_rule = engine.variable(variables::FALLBACK_RULE).unwrap_or_default();
        if self.local_rule.is_empty() {
            info!(topic = %self.topic, "no local fallback rule for topic");
        } else {
            info!(topic = %self.topic, rule = %self.local_rule, "loaded local fallback rule");
        }
        false
    }

    fn second_turn(&mut self, engine: &mut dyn DialogueEngine) -> bool {
        info!(counter = self.counter, "second fallback turn");
        engine.set_fallback_kind(FallbackKind::Unknown);
        engine.add_output(StockLine::IdleAnimation);

        if self.end_signal_set(engine) {
            info!("fallback ended by signal");
            return true;
        }

        // a topic that skips the remote engine only gets its local rule once
        if (!self.skip_remote || self.counter == 0) && self.reuse_local_rule(engine) {
            engine.set_fallback_kind(FallbackKind::LocalRule);
            return true;
        }

        if self.counter == 0 {
            info!("first fallback; using the generic fallback line");
            engine.set_fallback_kind(FallbackKind::LocalFallback);
            return false;
        }

        if self.counter % MOVE_ON_THRESHOLD == 0 {
            if engine.call_function(functions::MOVE_ON, &[]) {
                info!("moved on to another topic");
                engine.set_fallback_kind(FallbackKind::MoveOn);
                self.skip_increment = true;
                return true;
            }
            info!("move on failed");
            return false;
        }

        if self.counter % CHAT_THRESHOLD == 0 {
            if engine.call_function(functions::GAMBIT_TANGENT, &[CONFIRMATION_TANGENT]) {
                info!("asking for confirmation");
                engine.set_fallback_kind(FallbackKind::Confirmation);
                return true;
            }
            return false;
        }

        if engine.send_signal(CLARIFICATION_SIGNAL) {
            info!("asking for clarification");
            engine.set_fallback_kind(FallbackKind::Clarification);
            return true;
        }

        if engine.call_function(functions::MARKUP_RESTORE, &[])
            && engine.call_function(functions::REPROMPT, &[])
        {
            info!("reprompting");
            engine.set_fallback_kind(FallbackKind::Reprompt);
            return true;
        }

        info!("every escalation step failed");
        false
    }

    fn handle_in_one_turn(&mut self, engine: &mut dyn DialogueEngine) -> bool {
        info!("resolving the fallback in one turn");
        if self.initial_turn(engine) {
            return true;
        }

        self.handled_this_turn = false;
        self.state = FallbackState::Second;

        // stand in for the resume turn's script calls, which never run here
        engine.call_function(functions::KEEP_REJOINDER, &[]);
        engine.call_function(functions::KEEP_COUNTER, &[]);

        self.second_turn(engine)
    }

    /// `$$signal == "true"` ends the call without local text
    fn end_signal_set(&self, engine: &dyn DialogueEngine) -> bool {
        match engine.variable(variables::END_SIGNAL) {
            Some(signal) => signal == "true",
            None => {
                debug!("end signal variable not set");
                false
            }
        }
    }

    fn reuse_local_rule(&self, engine: &mut dyn DialogueEngine) -> bool {
        if self.local_rule.is_empty() {
            return false;
        }
        let handled = engine.reuse_rule(&self.local_rule);
        if handled {
            info!(rule = %self.local_rule, "reused local fallback rule");
        } else {
            info!(rule = %self.local_rule, "local fallback rule reuse failed");
        }
        handled
    }

    fn should_increment(&self, output: &TurnOutput) -> bool {
        !self.skip_increment && output.output_type.is_fallback()
    }

    fn should_reset(&self, output: &TurnOutput) -> bool {
        if self.handled_this_turn {
            return false;
        }
        if self.reset_requested {
            return true;
        }
        !output.output_type.preserves_counter()
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
    use crate::types::{FallbackContext, TurnInput};

    const RESUME: &str = "eb-remote-act-speak";

    fn policy() -> DefaultPolicy {
        DefaultPolicy::new(&FallbackConfig::default())
    }

    fn location() -> Location {
        Location::new("root", "c1", "root_intro")
    }

    fn catalog() -> StaticCatalog {
        StaticCatalog::new().with_default_context(FallbackContext::new("chat", "General chat"))
    }

    fn fallback_output() -> TurnOutput {
        TurnOutput::new("Sorry?", OutputType::Fallback)
    }

    /// Run one fallback turn and return the engine it used
    fn run_turn(policy: &mut DefaultPolicy, input: TurnInput, script: EngineScript) -> ScriptedEngine {
        let mut turn = Turn::new(input);
        policy.claims(&NodeFallback::default());
        policy.on_turn_started(&mut turn, &location(), &catalog());
        let mut engine = ScriptedEngine::new(script);
        policy.handle_fallback(&mut engine);
        turn.output = Some(fallback_output());
        policy.on_turn_finished(&turn);
        engine
    }

    #[test]
    fn test_initial_turn_requests_remote() {
        let mut policy = policy();
        let mut turn = Turn::new(TurnInput::speech("blorp"));
        policy.claims(&NodeFallback::default());
        policy.on_turn_started(&mut turn, &location(), &catalog());

        assert!(turn.remote_request.allow_multiple);
        assert_eq!(turn.remote_request.context.id, "chat");
        assert_eq!(turn.remote_request.settings.get(NO_BIAS_SETTING).map(String::as_str), Some("true"));

        let mut engine = ScriptedEngine::new(EngineScript::default());
        assert!(policy.handle_fallback(&mut engine));
        assert_eq!(policy.state(), FallbackState::AfterInitial);
        assert_eq!(engine.fallback_kind(), Some(FallbackKind::LocalFallback));
    }

    #[test]
    fn test_after_initial_moves_to_second_and_keeps_input() {
        let mut policy = policy();
        run_turn(&mut policy, TurnInput::speech("blorp"), EngineScript::default());
        assert_eq!(policy.state(), FallbackState::Second);
        assert_eq!(policy.last_speech_input(), "blorp");
        assert_eq!(policy.counter(), 0);
    }

    #[test]
    fn test_second_turn_increments_and_returns_to_initial() {
        let mut policy = policy();
        run_turn(&mut policy, TurnInput::speech("blorp"), EngineScript::default());
        let engine = run_turn(&mut policy, TurnInput::event(RESUME), EngineScript::default());

        assert_eq!(engine.fallback_kind(), Some(FallbackKind::LocalFallback));
        assert_eq!(policy.state(), FallbackState::Initial);
        assert_eq!(policy.counter(), 1);
        assert_eq!(policy.last_speech_input(), "");
    }

    #[test]
    fn test_stale_second_turn_resets() {
        let mut policy = policy();
        run_turn(&mut policy, TurnInput::speech("blorp"), EngineScript::default());
        assert_eq!(policy.state(), FallbackState::Second);
        assert_eq!(policy.last_speech_input(), "blorp");

        let mut turn = Turn::new(TurnInput::speech("hello again"));
        policy.on_turn_started(&mut turn, &location(), &catalog());
        assert_eq!(policy.state(), FallbackState::Initial);
        assert_eq!(policy.last_speech_input(), "");
    }

    #[test]
    fn test_resume_event_is_promoted() {
        let mut policy = policy();
        run_turn(&mut policy, TurnInput::speech("blorp"), EngineScript::default());
        let mut turn = Turn::new(TurnInput::event(RESUME));
        policy.on_turn_started(&mut turn, &location(), &catalog());
        assert!(turn.input.promoted);
    }

    #[test]
    fn test_local_rule_wins_in_second_turn() {
        let mut policy = policy();
        let mut script = EngineScript::default();
        script.variables.insert(variables::FALLBACK_RULE.to_string(), "~root.color".to_string());
        script.rules.insert("~root.color".to_string(), "Do you like red?".to_string());

        run_turn(&mut policy, TurnInput::speech("blorp"), script.clone());
        let engine = run_turn(&mut policy, TurnInput::event(RESUME), script);
        assert_eq!(engine.fallback_kind(), Some(FallbackKind::LocalRule));
    }

    #[test]
    fn test_end_signal_short_circuits() {
        let mut policy = policy();
        let mut script = EngineScript::default();
        script.variables.insert(variables::END_SIGNAL.to_string(), "true".to_string());

        run_turn(&mut policy, TurnInput::speech("blorp"), script.clone());
        let engine = run_turn(&mut policy, TurnInput::event(RESUME), script);
        assert_eq!(engine.fallback_kind(), Some(FallbackKind::Unknown));
        assert!(!engine.called(functions::KEEP_COUNTER));
    }

    #[test]
    fn test_move_on_skips_increment() {
        let mut policy = policy();
        policy.restore_counter();
        let mut script = EngineScript::default();
        script.functions.insert(functions::MOVE_ON.to_string(), true);

        run_turn(&mut policy, TurnInput::speech("blorp"), script.clone());
        let engine = run_turn(&mut policy, TurnInput::event(RESUME), script);
        assert_eq!(engine.fallback_kind(), Some(FallbackKind::MoveOn));
        assert_eq!(policy.counter(), MOVE_ON_THRESHOLD);
    }

    #[test]
    fn test_no_remote_resolves_in_one_turn() {
        let mut policy = policy();
        let mut turn = Turn::new(TurnInput::speech("blorp"));
        policy.claims(&NodeFallback::with_option(FallbackOption::NoRemote));
        policy.on_turn_started(&mut turn, &location(), &catalog());
        assert!(turn.remote_request.context.is_empty());
        assert!(turn.remote_request.settings.is_empty());

        let mut engine = ScriptedEngine::new(EngineScript::default());
        policy.handle_fallback(&mut engine);
        assert_eq!(engine.fallback_kind(), Some(FallbackKind::NoRemote));
        assert_eq!(policy.state(), FallbackState::Second);
        assert!(engine.called(functions::KEEP_REJOINDER));

        turn.output = Some(fallback_output());
        policy.on_turn_finished(&turn);
        assert_eq!(policy.state(), FallbackState::Initial);
        assert_eq!(policy.counter(), 1);
    }

    #[test]
    fn test_no_remote_uses_local_rule_only_once() {
        let mut policy = policy();
        let mut script = EngineScript::default();
        script.variables.insert(variables::FALLBACK_RULE.to_string(), "~root.color".to_string());
        script.rules.insert("~root.color".to_string(), "Do you like red?".to_string());

        let mut turn = Turn::new(TurnInput::speech("blorp"));
        policy.claims(&NodeFallback::with_option(FallbackOption::NoRemote));
        policy.on_turn_started(&mut turn, &location(), &catalog());
        let mut engine = ScriptedEngine::new(script.clone());
        policy.handle_fallback(&mut engine);
        assert!(engine.lines().contains(&"Do you like red?".to_string()));
        turn.output = Some(fallback_output());
        policy.on_turn_finished(&turn);
        assert_eq!(policy.counter(), 1);

        let mut turn = Turn::new(TurnInput::speech("blorp"));
        policy.claims(&NodeFallback::with_option(FallbackOption::NoRemote));
        policy.on_turn_started(&mut turn, &location(), &catalog());
        let mut engine = ScriptedEngine::new(script);
        policy.handle_fallback(&mut engine);
        assert!(!engine.lines().contains(&"Do you like red?".to_string()));
    }

    #[test]
    fn test_normal_turn_resets_counter() {
        let mut policy = policy();
        policy.restore_counter();
        let mut turn = Turn::new(TurnInput::speech("I like dogs"));
        policy.on_turn_started(&mut turn, &location(), &catalog());
        turn.output = Some(TurnOutput::new("Dogs are great!", OutputType::Normal));
        policy.on_turn_finished(&turn);
        assert_eq!(policy.counter(), 0);
    }

    #[test]
    fn test_global_command_and_keep_preserve_counter() {
        let mut policy = policy();
        policy.restore_counter();

        let mut turn = Turn::new(TurnInput::speech("volume up"));
        policy.on_turn_started(&mut turn, &location(), &catalog());
        turn.output = Some(TurnOutput::new("Okay.", OutputType::GlobalCommand));
        policy.on_turn_finished(&turn);
        assert_eq!(policy.counter(), MOVE_ON_THRESHOLD);

        let mut turn = Turn::new(TurnInput::speech("hmm"));
        policy.on_turn_started(&mut turn, &location(), &catalog());
        policy.keep_counter();
        turn.output = Some(TurnOutput::new("Okay.", OutputType::Normal));
        policy.on_turn_finished(&turn);
        assert_eq!(policy.counter(), MOVE_ON_THRESHOLD);
    }

    #[test]
    fn test_turn_without_output_changes_nothing() {
        let mut policy = policy();
        run_turn(&mut policy, TurnInput::speech("blorp"), EngineScript::default());
        let mut turn = Turn::new(TurnInput::event(RESUME));
        policy.on_turn_started(&mut turn, &location(), &catalog());
        policy.on_turn_finished(&turn);
        assert_eq!(policy.state(), FallbackState::Second);
        assert_eq!(policy.counter(), 0);
    }

    #[test]
    fn test_abort_restores_starting_state() {
        let mut policy = policy();
        let mut turn = Turn::new(TurnInput::speech("blorp"));
        policy.on_turn_started(&mut turn, &location(), &catalog());
        let mut engine = ScriptedEngine::new(EngineScript::default());
        policy.handle_fallback(&mut engine);
        assert_eq!(policy.state(), FallbackState::AfterInitial);

        policy.on_turn_aborted();
        assert_eq!(policy.state(), FallbackState::Initial);
        assert_eq!(policy.counter(), 0);
    }
}
