//! Output tags and per-turn reports

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use colored::Colorize;
use crate::types::{FallbackKind, FallbackState, MarkupSlot, PolicyKind};

/// Output-type tag the dialogue engine attaches to a turn's output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutputType {
    Normal,
    Fallback,
    ContextualFallback,
    EventInput,
    GlobalCommand,
    GlobalResponse,
    Empty,
}

impl Default for OutputType {
    fn default() -> Self {
        OutputType::Normal
    }
}

impl OutputType {
    /// Outputs that count as an unresolved fallback
    pub fn is_fallback(&self) -> bool {
        matches!(self, OutputType::Fallback | OutputType::ContextualFallback)
    }

    /// Outputs that never reset the fallback counter on their own
    pub fn preserves_counter(&self) -> bool {
        matches!(
            self,
            OutputType::EventInput | OutputType::GlobalCommand | OutputType::GlobalResponse
        )
    }
}

/// Outcome status of a named command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Ok,
    Failed,
}

/// Result of a named command, as returned to the dialogue engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub command: String,
    pub status: CommandStatus,
    /// Text handed back to the dialogue engine (may be empty)
    pub value: String,
}

impl CommandResult {
    pub fn ok(command: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            status: CommandStatus::Ok,
            value: value.into(),
        }
    }

    pub fn failed(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            status: CommandStatus::Failed,
            value: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == CommandStatus::Ok
    }
}

/// Snapshot after each scripted turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnReport {
    pub timestamp: DateTime<Utc>,
    /// Sequence number within the session, starting at 1
    pub turn: u64,
    pub input: String,
    /// Final response after tracker rewrites (None when aborted)
    pub response: Option<String>,
    pub output_type: Option<OutputType>,
    pub fallback_kind: Option<FallbackKind>,
    pub policy: Option<PolicyKind>,
    pub counter: u32,
    pub fallback_state: FallbackState,
    pub markup_slot: MarkupSlot,
    pub reprompts: usize,
    pub module: String,
    pub commands: Vec<CommandResult>,
    pub aborted: bool,
}

impl TurnReport {
    /// Format for terminal display (with colors)
    pub fn to_terminal_string(&self) -> String {
        let policy = self.policy.map(|p| p.name()).unwrap_or("-");
        let kind = self.fallback_kind.map(|k| k.code()).unwrap_or("-");
        let head = format!("#{} [{}] {}", self.turn, policy, self.input);
        let head = if self.aborted {
            head.red().to_string()
        } else if self.output_type.map(|t| t.is_fallback()).unwrap_or(false) {
            head.yellow().to_string()
        } else {
            head.green().to_string()
        };

        format!(
            "{} | state={} | counter={} | slot={} | reprompts={} | kind={}\n  {}",
            head,
            self.fallback_state,
            self.counter,
            self.markup_slot,
            self.reprompts,
            kind,
            self.response.as_deref().unwrap_or("<aborted>").dimmed()
        )
    }

    /// Format for parseable output (no colors)
    pub fn to_parseable_string(&self) -> String {
        format!(
            "turn={} | policy={} | state={} | counter={} | slot={} | reprompts={} | kind={} | response={}",
            self.turn,
            self.policy.map(|p| p.name()).unwrap_or("-"),
            self.fallback_state,
            self.counter,
            self.markup_slot,
            self.reprompts,
            self.fallback_kind.map(|k| k.code()).unwrap_or("-"),
            self.response.as_deref().unwrap_or("<aborted>")
        )
    }
}
