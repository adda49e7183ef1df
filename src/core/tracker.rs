//! Reprompt and markup-slot tracker
//!
//! Per turn:
//! 1. Commands raised by the dialogue engine set flags (save, restore, override...)
//! 2. On finish, an interrupted turn stores the last prompt as a reprompt
//! 3. The module/topic of the output is resolved and the override applied
//! 4. The markup automaton decides which save/restore directives wrap the output
//! 5. The last prompt cache is refreshed
//!
//! The markup slot only ever changes by toggling.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::core::engine::StockLine;
use crate::core::markup::{is_markup_only, restore_directive, save_directive};
use crate::core::reprompt::RepromptQueue;
use crate::core::topic::{normalize_module, resolve_topic};
use crate::types::{MarkupSlot, Turn, TurnInput};
use crate::{REPROMPT_EVENT, REPROMPT_SOURCE_VARIABLE, STATE_CHANGE_MODULE, STATE_CHANGE_TOPIC};

/// Value of the reprompt source variable on events we raise
pub const REPROMPT_SOURCE: &str = "repromptModule";

/// Engine that produced a cached prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptEngine {
    Local,
    Remote,
}

impl PromptEngine {
    /// Whether this engine satisfies a `send_reprompt` engine filter.
    /// Unknown or absent filters accept anything.
    pub fn matches(&self, filter: Option<&str>) -> bool {
        match filter.map(|f| f.trim().to_lowercase()).as_deref() {
            Some("remote") => *self == PromptEngine::Remote,
            Some("local") | Some("chatscript") => *self == PromptEngine::Local,
            _ => true,
        }
    }
}

/// Last output that carried speech
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastPrompt {
    pub text: String,
    pub topic: String,
    pub engine: PromptEngine,
}

#[derive(Debug, Clone)]
pub struct RepromptTracker {
    config: TrackerConfig,
    queue: RepromptQueue,
    last_prompt: Option<LastPrompt>,
    prev_module: String,
    stored_topic: String,
    prepend_text: String,

    // per-turn flags, cleared on turn start
    save_called: bool,
    restore_called: bool,
    override_requested: bool,
    skip_interrupt_handler: bool,
    keep_last_prompt: bool,
    reprompt_event_pending: bool,
    reprompt_sent: bool,

    slot: MarkupSlot,
    slot_at_start: MarkupSlot,
}

impl RepromptTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            queue: RepromptQueue::new(),
            last_prompt: None,
            prev_module: String::new(),
            stored_topic: String::new(),
            prepend_text: String::new(),
            save_called: false,
            restore_called: false,
            override_requested: false,
            skip_interrupt_handler: false,
            keep_last_prompt: false,
            reprompt_event_pending: false,
            reprompt_sent: false,
            slot: MarkupSlot::default(),
            slot_at_start: MarkupSlot::default(),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub fn on_turn_started(&mut self, _turn: &Turn) {
        self.save_called = false;
        self.restore_called = false;
        self.override_requested = false;
        self.skip_interrupt_handler = false;
        self.keep_last_prompt = false;
        self.reprompt_event_pending = false;
        self.reprompt_sent = false;
        self.prepend_text.clear();
        self.slot_at_start = self.slot;
        debug!("reprompt tracker flags reset");
    }

    /// Roll back what this turn did to the slot; nothing else was committed
    pub fn on_turn_aborted(&mut self, _turn: &Turn) {
        if self.slot != self.slot_at_start {
            info!(slot = %self.slot_at_start, "turn aborted; restoring markup slot");
        }
        self.slot = self.slot_at_start;
        self.reprompt_event_pending = false;
    }

    /// Finish a locally produced turn. May rewrite the output response.
    pub fn on_turn_finished(&mut self, turn: &mut Turn) {
        let last_topic = self.last_prompt_topic();

        if self.skip_interrupt_handler {
            // overriding is part of interruption handling
            self.override_requested = false;
            info!("reprompt was sent this turn; skipping interruption handling");
        } else if self.is_interrupted(&turn.input) {
            self.record_interrupted_prompt();
        }

        let output = match turn.output.as_mut() {
            Some(output) => output,
            None => {
                warn!("turn finished without output; markup state unchanged");
                return;
            }
        };

        // Module resolution. Topics are looked up in the module the output
        // names; tangents only collapse for the markup automaton.
        let mut topic_module = normalize_module(&output.module);
        let mut curr_module = topic_module.clone();
        // leaving the state-change module is a real exit, even into a tangent
        if self.config.is_tangent_module(&curr_module)
            && !self.prev_module.is_empty()
            && self.prev_module != STATE_CHANGE_MODULE
        {
            debug!(tangent = %curr_module, module = %self.prev_module, "tangent collapses to previous module");
            curr_module = self.prev_module.clone();
        }
        if self.save_called {
            info!("entering state change");
            curr_module = STATE_CHANGE_MODULE.to_string();
            topic_module = curr_module.clone();
            self.stored_topic = STATE_CHANGE_TOPIC.to_string();
            self.keep_last_prompt = true;
        }

        // Topic resolution
        if let Some(topic) = resolve_topic(&topic_module, &output.topics) {
            self.stored_topic = topic.to_lowercase();
        }
        if self.config.is_base_topic(&self.stored_topic) {
            info!(topic = %self.stored_topic, "base topic reached; clearing all reprompts");
            self.queue.clear_all();
        }

        if self.override_requested && !self.stored_topic.is_empty() && !self.queue.is_empty() {
            if let Some(entry) = self.queue.find_by_topic(&self.stored_topic) {
                let text = if self.prepend_text.is_empty() {
                    entry.text.clone()
                } else {
                    format!("{} {}", self.prepend_text, entry.text)
                };
                info!(topic = %self.stored_topic, response = %text, "overriding output with stored reprompt");
                output.response = text;
                self.keep_last_prompt = true;
            }
            if !topic_module.is_empty() {
                self.queue.clear_for_module(&topic_module);
            }
        }

        // Markup automaton
        let mut local_response = output.response.clone();
        if self.restore_called && self.prev_module == curr_module {
            // undo the restore toggle; the head slot did not change this turn
            self.slot = self.slot.toggled();
            local_response = local_response.replace(&restore_directive(Some(self.slot)), &restore_directive(None));
            output.response = format!("{}{}", save_directive(None), local_response);
            info!("one-turn tangent; using tangent save and restore directives");
        } else if self.prev_module != curr_module {
            if self.prev_module.is_empty() {
                info!(module = %curr_module, "initial turn");
            } else if self.restore_called {
                info!("restore already requested this turn; no save directive");
            } else if self.prev_module == STATE_CHANGE_MODULE {
                info!("leaving state change; no save directive");
            } else if self.config.is_tangent_module(&curr_module) {
                info!(module = %curr_module, "finished in a tangent module; no save directive");
            } else {
                self.slot = self.slot.toggled();
                output.response = format!("{}{}", save_directive(Some(self.slot)), local_response);
                info!(slot = %self.slot, module = %curr_module, "module changed; prepending save directive");
            }
            self.prev_module = curr_module;
        }

        if !self.keep_last_prompt {
            if !is_markup_only(&local_response) {
                self.set_last_prompt(local_response, PromptEngine::Local);
            } else if self.stored_topic != last_topic {
                self.clear_last_prompt();
            } else {
                debug!("speechless output in the same topic; last prompt unchanged");
            }
        }
    }

    /// A remote answer was accepted for this turn
    pub fn on_remote_turn_accepted(&mut self, turn: &Turn) {
        let response = turn.response().unwrap_or_default();
        let last_topic = self.last_prompt_topic();

        if turn.input.is_event_named(&self.config.stream_event) {
            let mut text = self.last_prompt.as_ref().map(|p| p.text.clone()).unwrap_or_default();
            text.push_str(response);
            info!(response = %response, "appending streamed remote output to last prompt");
            self.set_last_prompt(text, PromptEngine::Remote);
        } else if !is_markup_only(response) {
            self.set_last_prompt(response.to_string(), PromptEngine::Remote);
        } else if self.stored_topic != last_topic {
            self.clear_last_prompt();
        } else {
            debug!("speechless remote output; last prompt unchanged");
        }
    }

    // =========================================================================
    // Commands
    // =========================================================================

    pub fn prepend_current_reprompt(&mut self, text: &str) {
        info!(text = %text, "prepend text set for stored reprompt");
        self.prepend_text = text.to_string();
    }

    pub fn override_with_reprompt(&mut self) {
        info!("reprompt override requested");
        self.override_requested = true;
    }

    /// Replay the cached prompt, or raise a reprompt event when there is
    /// nothing suitable cached. Returns the text to speak now, or "" when a
    /// reprompt was already sent this turn.
    pub fn send_reprompt(&mut self, engine: Option<&str>) -> String {
        if self.reprompt_sent {
            info!("reprompt already sent this turn; ignoring");
            return String::new();
        }
        self.reprompt_sent = true;
        self.keep_last_prompt = true;
        self.skip_interrupt_handler = true;

        let cached = self
            .last_prompt
            .as_ref()
            .filter(|p| !p.text.is_empty() && p.engine.matches(engine));
        match cached {
            Some(prompt) => {
                info!(response = %prompt.text, "sending last prompt");
                prompt.text.clone()
            }
            None => {
                info!("no suitable cached prompt; requesting reprompt event");
                self.reprompt_event_pending = true;
                StockLine::CuriousAnimation.text().to_string()
            }
        }
    }

    pub fn save_markup_state(&mut self) {
        if self.save_called {
            info!("save markup already requested this turn; ignoring");
            return;
        }
        self.save_called = true;
        info!("save markup requested");
    }

    /// Restore directive for the head slot, or "" when already requested
    /// this turn. The head slot moves to the other slot afterwards.
    pub fn restore_markup_state(&mut self) -> String {
        if self.restore_called {
            info!("restore markup already requested this turn; ignoring");
            return String::new();
        }
        self.restore_called = true;
        let directive = restore_directive(Some(self.slot));
        info!(slot = %self.slot, "appending restore directive");
        self.slot = self.slot.toggled();
        directive
    }

    /// The reprompt event raised by `send_reprompt`, at most once
    pub fn take_reprompt_event(&mut self) -> Option<TurnInput> {
        if !self.reprompt_event_pending {
            return None;
        }
        self.reprompt_event_pending = false;
        Some(TurnInput::event(REPROMPT_EVENT).with_variable(REPROMPT_SOURCE_VARIABLE, REPROMPT_SOURCE))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn slot(&self) -> MarkupSlot {
        self.slot
    }

    pub fn queue(&self) -> &RepromptQueue {
        &self.queue
    }

    pub fn prev_module(&self) -> &str {
        &self.prev_module
    }

    pub fn stored_topic(&self) -> &str {
        &self.stored_topic
    }

    pub fn last_prompt(&self) -> Option<&LastPrompt> {
        self.last_prompt.as_ref()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn is_interrupted(&self, input: &TurnInput) -> bool {
        if input.is_event() {
            self.config.is_interrupting_event(&input.text)
        } else {
            input.variable(&self.config.interruption_variable) == Some("true")
        }
    }

    fn record_interrupted_prompt(&mut self) {
        let prompt = match self.last_prompt.as_ref() {
            Some(p) if !p.text.is_empty() && !p.topic.is_empty() && !is_markup_only(&p.text) => p.clone(),
            _ => {
                debug!("turn interrupted but there is no prompt to keep");
                return;
            }
        };
        info!(topic = %prompt.topic, "previous turn was interrupted; storing its output as a reprompt");
        self.queue.record(&prompt.text, &prompt.topic);
    }

    fn last_prompt_topic(&self) -> String {
        self.last_prompt.as_ref().map(|p| p.topic.clone()).unwrap_or_default()
    }

    fn set_last_prompt(&mut self, text: String, engine: PromptEngine) {
        debug!(topic = %self.stored_topic, engine = ?engine, "last prompt cached");
        self.last_prompt = Some(LastPrompt {
            text,
            topic: self.stored_topic.clone(),
            engine,
        });
    }

    fn clear_last_prompt(&mut self) {
        debug!("last prompt cleared");
        self.last_prompt = None;
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OutputType, TurnOutput};
    use pretty_assertions::assert_eq;

    fn tracker() -> RepromptTracker {
        RepromptTracker::new(TrackerConfig::default())
    }

    fn turn(input: TurnInput, response: &str, module: &str, topics: &[&str]) -> Turn {
        Turn::new(input).with_output(TurnOutput::new(response, OutputType::Normal).in_module(module, topics))
    }

    fn finish(t: &mut RepromptTracker, mut turn: Turn) -> String {
        t.on_turn_finished(&mut turn);
        turn.response().unwrap_or_default().to_string()
    }

    #[test]
    fn test_first_turn_has_no_directive() {
        let mut t = tracker();
        let out = finish(&mut t, turn(TurnInput::speech("hi"), "Hello!", "root", &["~root_intro"]));
        assert_eq!(out, "Hello!");
        assert_eq!(t.prev_module(), "root");
        assert_eq!(t.last_prompt().map(|p| p.topic.as_str()), Some("root_intro"));
    }

    #[test]
    fn test_tangent_does_not_count_as_module_change() {
        let mut t = tracker();
        finish(&mut t, turn(TurnInput::speech("hi"), "Hello!", "root", &["~root_intro"]));
        let out = finish(&mut t, turn(TurnInput::speech("joke"), "Knock knock.", "gt", &["~gt_joke"]));
        assert_eq!(out, "Knock knock.");
        assert_eq!(t.prev_module(), "root");
        assert_eq!(t.slot(), MarkupSlot::Slot0);
    }

    #[test]
    fn test_one_turn_tangent_rewrites_restore() {
        let mut t = tracker();
        finish(&mut t, turn(TurnInput::speech("hi"), "Hello!", "root", &["~root_intro"]));

        t.on_turn_started(&Turn::new(TurnInput::speech("again")));
        let restore = t.restore_markup_state();
        assert_eq!(restore, restore_directive(Some(MarkupSlot::Slot0)));
        assert_eq!(t.slot(), MarkupSlot::Slot1);
        let response = format!("Where were we?{}", restore);
        let out = finish(&mut t, turn(TurnInput::speech("again"), &response, "root", &["~root_intro"]));

        assert_eq!(t.slot(), MarkupSlot::Slot0);
        assert_eq!(
            out,
            format!("{}Where were we?{}", save_directive(None), restore_directive(None))
        );
    }

    #[test]
    fn test_restore_is_idempotent_within_turn() {
        let mut t = tracker();
        t.on_turn_started(&Turn::new(TurnInput::speech("x")));
        assert!(!t.restore_markup_state().is_empty());
        assert_eq!(t.restore_markup_state(), "");
        assert_eq!(t.slot(), MarkupSlot::Slot1);
    }

    #[test]
    fn test_state_change_saves_and_keeps_prompt() {
        let mut t = tracker();
        finish(&mut t, turn(TurnInput::speech("hi"), "Hello!", "root", &["~root_intro"]));

        t.on_turn_started(&Turn::new(TurnInput::speech("sleep")));
        t.save_markup_state();
        t.save_markup_state();
        let out = finish(&mut t, turn(TurnInput::speech("sleep"), "Goodnight.", "root", &["~root_sleep"]));
        assert_eq!(out, format!("{}Goodnight.", save_directive(Some(MarkupSlot::Slot1))));
        assert_eq!(t.prev_module(), STATE_CHANGE_MODULE);
        assert_eq!(t.stored_topic(), STATE_CHANGE_TOPIC);
        assert_eq!(t.last_prompt().map(|p| p.text.as_str()), Some("Hello!"));

        t.on_turn_started(&Turn::new(TurnInput::speech("wake")));
        let out = finish(&mut t, turn(TurnInput::speech("wake"), "Morning!", "root", &["~root_intro"]));
        assert_eq!(out, "Morning!");
    }

    #[test]
    fn test_send_reprompt_replays_cache() {
        let mut t = tracker();
        finish(&mut t, turn(TurnInput::speech("hi"), "What color?", "root", &["~root_ask"]));

        t.on_turn_started(&Turn::new(TurnInput::speech("huh")));
        assert_eq!(t.send_reprompt(None), "What color?");
        assert!(t.take_reprompt_event().is_none());
    }

    #[test]
    fn test_send_reprompt_raises_event_once() {
        let mut t = tracker();
        finish(&mut t, turn(TurnInput::speech("hi"), "What color?", "root", &["~root_ask"]));

        t.on_turn_started(&Turn::new(TurnInput::speech("huh")));
        assert_eq!(t.send_reprompt(Some("remote")), StockLine::CuriousAnimation.text());
        let event = t.take_reprompt_event().unwrap();
        assert!(event.is_event_named(REPROMPT_EVENT));
        assert_eq!(event.variable(REPROMPT_SOURCE_VARIABLE), Some(REPROMPT_SOURCE));
        assert!(t.take_reprompt_event().is_none());
    }

    #[test]
    fn test_send_reprompt_once_per_turn() {
        let mut t = tracker();
        t.on_turn_started(&Turn::new(TurnInput::speech("huh")));
        assert_eq!(t.send_reprompt(None), StockLine::CuriousAnimation.text());
        assert!(t.take_reprompt_event().is_some());

        assert_eq!(t.send_reprompt(None), "");
        assert!(t.take_reprompt_event().is_none());

        t.on_turn_started(&Turn::new(TurnInput::speech("huh?")));
        assert_eq!(t.send_reprompt(None), StockLine::CuriousAnimation.text());
    }

    #[test]
    fn test_remote_stream_appends() {
        let mut t = tracker();
        finish(&mut t, turn(TurnInput::speech("hi"), "Hello!", "root", &["~root_intro"]));

        let first = Turn::new(TurnInput::speech("story")).with_output(TurnOutput::new("Once upon", OutputType::Normal));
        t.on_remote_turn_accepted(&first);
        let more = Turn::new(TurnInput::event("eb-remote-act-stream")).with_output(TurnOutput::new(" a time.", OutputType::Normal));
        t.on_remote_turn_accepted(&more);

        let prompt = t.last_prompt().unwrap();
        assert_eq!(prompt.text, "Once upon a time.");
        assert_eq!(prompt.engine, PromptEngine::Remote);
    }

    #[test]
    fn test_abort_restores_slot() {
        let mut t = tracker();
        let started = Turn::new(TurnInput::speech("x"));
        t.on_turn_started(&started);
        t.restore_markup_state();
        t.on_turn_aborted(&started);
        assert_eq!(t.slot(), MarkupSlot::Slot0);
    }

    #[test]
    fn test_engine_filter() {
        assert!(PromptEngine::Local.matches(None));
        assert!(PromptEngine::Local.matches(Some("ChatScript")));
        assert!(!PromptEngine::Local.matches(Some("remote")));
        assert!(PromptEngine::Remote.matches(Some("REMOTE")));
    }
}
