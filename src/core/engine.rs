//! Dialogue engine seam
//!
//! Policies never talk to the pattern-matching engine directly; they go through
//! `DialogueEngine`. `ScriptedEngine` answers from a per-turn script and records
//! every call, which is what the CLI, the HTTP API and the tests drive.

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{FallbackKind, OutputType, TurnOutput};

/// Names of engine functions called by the policies
pub mod functions {
    pub const KEEP_REJOINDER: &str = "^keepRejoinder";
    pub const NO_REPEAT: &str = "^noRepeat";
    pub const KEEP_COUNTER: &str = "^fallbacks_keepCounter";
    pub const GAMBIT_TANGENT: &str = "^gambitTangent";
    pub const MOVE_ON: &str = "^doMoveOn";
    pub const MARKUP_RESTORE: &str = "^markup_restore";
    pub const REPROMPT: &str = "^doReprompt";
}

/// Names of engine variables read or written by the policies
pub mod variables {
    pub const NO_PRELUDE: &str = "$$State_noPrelude";
    pub const FALLBACK_RULE: &str = "$$fallback_rule";
    pub const END_SIGNAL: &str = "$$signal";
}

/// Signal asking the engine to run its clarification gambit
pub const CLARIFICATION_SIGNAL: &str = "signal-clarification";

/// Tangent topic used for the "keep chatting?" confirmation
pub const CONFIRMATION_TANGENT: &str = "~FALLBACK_SXC_fallbackOpenConvo_Intro";

/// Stock lines the engine knows how to render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockLine {
    /// Clears any "thinking" animation
    IdleAnimation,
    /// Curious look while waiting for a reprompt
    CuriousAnimation,
    /// "Sorry, could you say that again?"
    FallbackRepeat,
}

impl StockLine {
    /// Default rendering used by `ScriptedEngine`
    pub fn text(&self) -> &'static str {
        match self {
            StockLine::IdleAnimation => "<mark name=\"cmd:playback-anim,data:idle\"/>",
            StockLine::CuriousAnimation => "<mark name=\"cmd:playback-anim,data:curious\"/>",
            StockLine::FallbackRepeat => "Sorry, could you say that again?",
        }
    }
}

/// Operations the fallback policies need from the dialogue engine
pub trait DialogueEngine {
    /// Read a global variable
    fn variable(&self, name: &str) -> Option<String>;
    fn set_variable(&mut self, name: &str, value: &str);
    /// Call a script function; true when it produced a result
    fn call_function(&mut self, name: &str, args: &[&str]) -> bool;
    /// Re-run a named rule; true when it produced output
    fn reuse_rule(&mut self, rule: &str) -> bool;
    /// Send a signal; true when something handled it
    fn send_signal(&mut self, signal: &str) -> bool;
    fn set_output_type(&mut self, output_type: OutputType);
    fn set_fallback_kind(&mut self, kind: FallbackKind);
    fn add_output(&mut self, line: StockLine);
}

/// What the scripted engine answers for one turn
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineScript {
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    /// Function name → result
    #[serde(default)]
    pub functions: BTreeMap<String, bool>,
    /// Rule name → text produced when reused
    #[serde(default)]
    pub rules: BTreeMap<String, String>,
    /// Signal name → handled
    #[serde(default)]
    pub signals: BTreeMap<String, bool>,
}

/// A recorded engine call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum EngineCall {
    SetVariable { name: String, value: String },
    Function { name: String, args: Vec<String> },
    ReuseRule { rule: String },
    Signal { signal: String },
}

/// Engine double answering from an `EngineScript`
#[derive(Debug, Clone, Default)]
pub struct ScriptedEngine {
    script: EngineScript,
    calls: Vec<EngineCall>,
    lines: Vec<String>,
    output_type: Option<OutputType>,
    fallback_kind: Option<FallbackKind>,
}

impl ScriptedEngine {
    pub fn new(script: EngineScript) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> &[EngineCall] {
        &self.calls
    }

    /// True when the named function was called at least once
    pub fn called(&self, name: &str) -> bool {
        self.calls
            .iter()
            .any(|c| matches!(c, EngineCall::Function { name: n, .. } if n == name))
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn output_type(&self) -> Option<OutputType> {
        self.output_type
    }

    pub fn fallback_kind(&self) -> Option<FallbackKind> {
        self.fallback_kind
    }

    /// Merge what the engine produced into the scripted output.
    ///
    /// Lines are appended to the response; a set output type wins over the
    /// scripted one. With no scripted output and nothing produced, the turn
    /// has no output.
    pub fn apply_to(&self, output: Option<TurnOutput>) -> Option<TurnOutput> {
        if output.is_none() && self.lines.is_empty() && self.output_type.is_none() {
            return None;
        }
        let mut output = output.unwrap_or_else(|| TurnOutput::new("", OutputType::Normal));
        for line in &self.lines {
            if !output.response.is_empty() {
                output.response.push(' ');
            }
            output.response.push_str(line);
        }
        if let Some(output_type) = self.output_type {
            output.output_type = output_type;
        }
        Some(output)
    }
}

impl DialogueEngine for ScriptedEngine {
    fn variable(&self, name: &str) -> Option<String> {
        self.script.variables.get(name).cloned()
    }

    fn set_variable(&mut self, name: &str, value: &str) {
        self.script.variables.insert(name.to_string(), value.to_string());
        self.calls.push(EngineCall::SetVariable {
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    fn call_function(&mut self, name: &str, args: &[&str]) -> bool {
        self.calls.push(EngineCall::Function {
            name: name.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        });
        let result = self.script.functions.get(name).copied().unwrap_or(false);
        debug!(function = name, result, "scripted engine call");
        result
    }

    fn reuse_rule(&mut self, rule: &str) -> bool {
        self.calls.push(EngineCall::ReuseRule { rule: rule.to_string() });
        match self.script.rules.get(rule) {
            Some(text) => {
                self.lines.push(text.clone());
                true
            }
            None => false,
        }
    }

    fn send_signal(&mut self, signal: &str) -> bool {
        self.calls.push(EngineCall::Signal { signal: signal.to_string() });
        self.script.signals.get(signal).copied().unwrap_or(false)
    }

    fn set_output_type(&mut self, output_type: OutputType) {
        self.output_type = Some(output_type);
    }

    fn set_fallback_kind(&mut self, kind: FallbackKind) {
        self.fallback_kind = Some(kind);
    }

    fn add_output(&mut self, line: StockLine) {
        self.lines.push(line.text().to_string());
    }
}

// =============================================================================
// TESTS
// =============================================================================
