//! Scripted conversation session
//!
//! Wires an arbitrator, a tracker and a catalog together and drives them
//! one turn at a time from `TurnScript`s, the way the surrounding dialogue
//! engine would: start, run mid-turn commands, assemble output, then finish
//! or abort.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::core::arbitrator::FallbackArbitrator;
use crate::core::catalog::StaticCatalog;
use crate::core::commands::{dispatch, Command};
use crate::core::engine::{EngineScript, ScriptedEngine};
use crate::core::markup::is_markup_only;
use crate::core::policy::Location;
use crate::core::reprompt::RepromptEntry;
use crate::core::tracker::{LastPrompt, RepromptTracker};
use crate::types::{
    CommandResult, ConversationState, FallbackState, MarkupSlot, OutputType, PolicyKind, Turn, TurnInput, TurnOutput,
    TurnReport,
};

/// A command raised by the dialogue engine mid-turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandCall {
    pub name: String,
    #[serde(default)]
    pub arg: Option<String>,
}

impl CommandCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), arg: None }
    }

    pub fn with_arg(name: impl Into<String>, arg: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arg: Some(arg.into()),
        }
    }
}

/// Everything needed to replay one turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnScript {
    pub input: TurnInput,
    /// Commands the dialogue engine raises, in order
    #[serde(default)]
    pub commands: Vec<CommandCall>,
    /// What the dialogue engine answered on its own
    #[serde(default)]
    pub output: Option<TurnOutput>,
    /// How the engine answers calls made during fallback handling
    #[serde(default)]
    pub engine: EngineScript,
    /// Abort the turn instead of finishing it
    #[serde(default)]
    pub abort: bool,
    /// The output came from the remote engine
    #[serde(default)]
    pub remote: bool,
    /// New conversation state, applied before the turn starts
    #[serde(default)]
    pub state: Option<ConversationState>,
    #[serde(default)]
    pub social_chat_enabled: bool,
}

impl TurnScript {
    pub fn new(input: TurnInput) -> Self {
        Self {
            input,
            commands: Vec::new(),
            output: None,
            engine: EngineScript::default(),
            abort: false,
            remote: false,
            state: None,
            social_chat_enabled: false,
        }
    }

    pub fn with_output(mut self, output: TurnOutput) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_command(mut self, call: CommandCall) -> Self {
        self.commands.push(call);
        self
    }

    pub fn with_engine(mut self, engine: EngineScript) -> Self {
        self.engine = engine;
        self
    }

    pub fn aborted(mut self) -> Self {
        self.abort = true;
        self
    }
}

/// Parse a JSON-lines script. Blank lines and `#` comments are skipped.
pub fn parse_script(text: &str) -> Result<Vec<TurnScript>, serde_json::Error> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(serde_json::from_str)
        .collect()
}

/// Point-in-time view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub turns: u64,
    pub policy: Option<PolicyKind>,
    pub counter: u32,
    pub fallback_state: FallbackState,
    pub markup_slot: MarkupSlot,
    pub prev_module: String,
    pub location: Location,
    pub reprompts: Vec<RepromptEntry>,
    pub last_prompt: Option<LastPrompt>,
    pub conversation: ConversationState,
}

#[derive(Debug, Clone)]
pub struct Session {
    arbitrator: FallbackArbitrator,
    tracker: RepromptTracker,
    catalog: StaticCatalog,
    state: ConversationState,
    turns: u64,
}

impl Session {
    pub fn new(config: Config, catalog: StaticCatalog) -> Self {
        Self {
            arbitrator: FallbackArbitrator::new(config.fallback),
            tracker: RepromptTracker::new(config.tracker),
            catalog,
            state: ConversationState::default(),
            turns: 0,
        }
    }

    /// Apply a new conversation state; waking from sleep resets all counters
    pub fn set_state(&mut self, state: ConversationState) {
        let previous = self.state.phase;
        self.state = state;
        if previous != state.phase {
            info!(current = ?state.phase, previous = ?previous, "session state changed");
            self.arbitrator.on_session_state_changed(state.phase, previous);
        }
    }

    /// Run one scripted turn
    pub fn run_turn(&mut self, script: TurnScript) -> TurnReport {
        self.turns += 1;
        if let Some(state) = script.state {
            self.set_state(state);
        }

        let mut turn = Turn::new(script.input);
        turn.social_chat_enabled = script.social_chat_enabled;
        debug!(turn = self.turns, input = %turn.input.text, "turn started");

        self.arbitrator.on_turn_started(&mut turn, &self.state, &self.catalog);
        self.tracker.on_turn_started(&turn);

        let mut engine = ScriptedEngine::new(script.engine);
        let mut commands: Vec<CommandResult> = Vec::new();
        let mut spoken: Vec<String> = Vec::new();
        for call in &script.commands {
            let result = match Command::parse(&call.name, call.arg.as_deref()) {
                Ok(command) => {
                    let result = dispatch(&command, &mut self.arbitrator, &mut self.tracker, &mut engine);
                    if command.produces_output() && result.is_ok() && !result.value.is_empty() {
                        spoken.push(result.value.clone());
                    }
                    result
                }
                Err(err) => {
                    warn!(command = %call.name, error = %err, "command rejected");
                    CommandResult::failed(call.name.clone(), err.to_string())
                }
            };
            commands.push(result);
        }

        let mut output = engine.apply_to(script.output);
        if !spoken.is_empty() {
            let output = output.get_or_insert_with(|| TurnOutput::new("", OutputType::Normal));
            for text in spoken {
                append_response(&mut output.response, &text);
            }
        }
        turn.output = output;

        if script.abort {
            self.arbitrator.on_turn_aborted(&turn);
            self.tracker.on_turn_aborted(&turn);
            turn.output = None;
        } else if script.remote {
            self.arbitrator.on_remote_turn_accepted(&turn);
            self.tracker.on_remote_turn_accepted(&turn);
        } else {
            self.arbitrator.on_turn_finished(&turn);
            self.tracker.on_turn_finished(&mut turn);
        }

        TurnReport {
            timestamp: Utc::now(),
            turn: self.turns,
            input: turn.input.text.clone(),
            response: turn.output.as_ref().map(|o| o.response.clone()),
            output_type: turn.output_type(),
            fallback_kind: engine.fallback_kind(),
            policy: self.arbitrator.active_policy(),
            counter: self.arbitrator.default_counter(),
            fallback_state: self.arbitrator.default_state(),
            markup_slot: self.tracker.slot(),
            reprompts: self.tracker.queue().len(),
            module: self.tracker.prev_module().to_string(),
            commands,
            aborted: script.abort,
        }
    }

    /// Run every turn of a script in order
    pub fn run_script(&mut self, scripts: Vec<TurnScript>) -> Vec<TurnReport> {
        scripts.into_iter().map(|s| self.run_turn(s)).collect()
    }

    /// The reprompt event requested during the last turn, if any
    pub fn take_reprompt_event(&mut self) -> Option<TurnInput> {
        self.tracker.take_reprompt_event()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            turns: self.turns,
            policy: self.arbitrator.active_policy(),
            counter: self.arbitrator.default_counter(),
            fallback_state: self.arbitrator.default_state(),
            markup_slot: self.tracker.slot(),
            prev_module: self.tracker.prev_module().to_string(),
            location: self.arbitrator.location().clone(),
            reprompts: self.tracker.queue().iter().cloned().collect(),
            last_prompt: self.tracker.last_prompt().cloned(),
            conversation: self.state,
        }
    }

    pub fn arbitrator(&self) -> &FallbackArbitrator {
        &self.arbitrator
    }

    pub fn tracker(&self) -> &RepromptTracker {
        &self.tracker
    }

    pub fn turns(&self) -> u64 {
        self.turns
    }
}

/// Directives attach directly; speech is separated by a space
fn append_response(response: &mut String, text: &str) {
    if !response.is_empty() && !is_markup_only(text) {
        response.push(' ');
    }
    response.push_str(text);
}
