//! Turn model
//!
//! A turn is one input/output cycle of the conversation:
//! - Input = a user utterance or a named event, plus input-scoped variables
//! - Output = what the dialogue engine answered (absent when the turn aborted)
//! - Remote request = what will be asked of the remote engine this turn

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

use crate::types::{FallbackContext, OutputType};

/// Kind of turn input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Speech,
    Event,
}

/// Turn input: an utterance or an event name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnInput {
    pub kind: InputKind,
    /// Utterance text, or the event name for events
    pub text: String,
    /// Input-scoped variables set by whoever produced the input
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    /// Set once an internal event has been promoted to a user-visible one
    #[serde(default)]
    pub promoted: bool,
}

impl TurnInput {
    /// Speech input
    pub fn speech(text: impl Into<String>) -> Self {
        Self {
            kind: InputKind::Speech,
            text: text.into(),
            variables: BTreeMap::new(),
            promoted: false,
        }
    }

    /// Event input
    pub fn event(name: impl Into<String>) -> Self {
        Self {
            kind: InputKind::Event,
            text: name.into(),
            variables: BTreeMap::new(),
            promoted: false,
        }
    }

    /// Builder: attach an input variable
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn is_event(&self) -> bool {
        self.kind == InputKind::Event
    }

    /// True when this input is the named event
    pub fn is_event_named(&self, name: &str) -> bool {
        self.is_event() && self.text == name
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    /// Mark an internal event as promoted so downstream rules treat it as user input
    pub fn promote(&mut self) {
        self.promoted = true;
    }
}

/// Turn output as produced by the dialogue engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOutput {
    pub response: String,
    #[serde(default)]
    pub output_type: OutputType,
    /// Module the dialogue engine ended the turn in
    #[serde(default)]
    pub module: String,
    /// Topics traversed this turn, in order
    #[serde(default)]
    pub topics: Vec<String>,
    /// Content id the output belongs to
    #[serde(default)]
    pub content_id: String,
}

impl TurnOutput {
    pub fn new(response: impl Into<String>, output_type: OutputType) -> Self {
        Self {
            response: response.into(),
            output_type,
            module: String::new(),
            topics: Vec::new(),
            content_id: String::new(),
        }
    }

    /// Builder: module and traversed topics
    pub fn in_module(mut self, module: impl Into<String>, topics: &[&str]) -> Self {
        self.module = module.into();
        self.topics = topics.iter().map(|t| t.to_string()).collect();
        self
    }
}

/// Outgoing request to the remote engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteRequest {
    /// Conversation context the remote engine should answer within
    #[serde(default)]
    pub context: FallbackContext,
    /// Accept more than one remote answer for this turn
    #[serde(default)]
    pub allow_multiple: bool,
    /// Per-request engine settings
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

/// One input/output cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub input: TurnInput,
    #[serde(default)]
    pub output: Option<TurnOutput>,
    #[serde(default)]
    pub remote_request: RemoteRequest,
    /// Social chat is available for this turn
    #[serde(default)]
    pub social_chat_enabled: bool,
}

impl Turn {
    /// New turn with no output yet
    pub fn new(input: TurnInput) -> Self {
        Self {
            input,
            output: None,
            remote_request: RemoteRequest::default(),
            social_chat_enabled: false,
        }
    }

    /// Builder: set the output
    pub fn with_output(mut self, output: TurnOutput) -> Self {
        self.output = Some(output);
        self
    }

    pub fn output_type(&self) -> Option<OutputType> {
        self.output.as_ref().map(|o| o.output_type)
    }

    pub fn response(&self) -> Option<&str> {
        self.output.as_ref().map(|o| o.response.as_str())
    }
}

// =============================================================================
// TESTS
// =============================================================================
