//! Named command surface exposed to the dialogue engine
//!
//! Commands arrive by name (optionally with one argument, `name(arg)`),
//! are dispatched to the arbitrator or the tracker, and always come back as
//! a `CommandResult`. Failures are reported in the result, never raised.

use std::fmt;
use std::str::FromStr;

use tracing::{info, warn};

use crate::core::arbitrator::{FallbackArbitrator, HandleOutcome};
use crate::core::engine::DialogueEngine;
use crate::core::tracker::RepromptTracker;
use crate::error::{FallbackError, FallbackResult};
use crate::types::CommandResult;

/// Value returned by `handle_fallback` when the output was set
pub const HANDLED: &str = "handled";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    HandleFallback,
    KeepCounter,
    ResetCounter,
    ResetAllCounters,
    RestoreCounter,
    SpeechInput,
    PrependCurrentReprompt(String),
    OverrideWithReprompt,
    /// Optional engine filter: `local` or `remote`
    SendReprompt(Option<String>),
    SaveMarkupState,
    RestoreMarkupState,
}

impl Command {
    /// Build a command from its name and optional argument
    pub fn parse(name: &str, arg: Option<&str>) -> FallbackResult<Command> {
        let arg = arg.map(str::trim).filter(|a| !a.is_empty());
        let command = match name.trim() {
            "handle_fallback" => Command::HandleFallback,
            "fallback_keep_counter" => Command::KeepCounter,
            "fallback_reset_counter" => Command::ResetCounter,
            "fallback_reset_all_counters" => Command::ResetAllCounters,
            "fallback_restore_counter" => Command::RestoreCounter,
            "fallback_speech_input" => Command::SpeechInput,
            "prepend_current_reprompt" => {
                let text = arg.ok_or_else(|| FallbackError::MissingArgument {
                    command: name.to_string(),
                    argument: "text".to_string(),
                })?;
                Command::PrependCurrentReprompt(text.to_string())
            }
            "override_with_reprompt" => Command::OverrideWithReprompt,
            "send_reprompt" => Command::SendReprompt(arg.map(str::to_string)),
            "save_markup_state" => Command::SaveMarkupState,
            "restore_markup_state" => Command::RestoreMarkupState,
            other => return Err(FallbackError::UnknownCommand(other.to_string())),
        };
        Ok(command)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::HandleFallback => "handle_fallback",
            Command::KeepCounter => "fallback_keep_counter",
            Command::ResetCounter => "fallback_reset_counter",
            Command::ResetAllCounters => "fallback_reset_all_counters",
            Command::RestoreCounter => "fallback_restore_counter",
            Command::SpeechInput => "fallback_speech_input",
            Command::PrependCurrentReprompt(_) => "prepend_current_reprompt",
            Command::OverrideWithReprompt => "override_with_reprompt",
            Command::SendReprompt(_) => "send_reprompt",
            Command::SaveMarkupState => "save_markup_state",
            Command::RestoreMarkupState => "restore_markup_state",
        }
    }

    /// Commands whose value is text the dialogue engine speaks this turn
    pub fn produces_output(&self) -> bool {
        matches!(self, Command::SendReprompt(_) | Command::RestoreMarkupState)
    }
}

impl FromStr for Command {
    type Err = FallbackError;

    /// Accepts `name` or `name(arg)`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('(') {
            Some((name, rest)) => {
                let arg = rest.strip_suffix(')').unwrap_or(rest);
                Command::parse(name, Some(arg))
            }
            None => Command::parse(s, None),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::PrependCurrentReprompt(text) => write!(f, "{}({})", self.name(), text),
            Command::SendReprompt(Some(engine)) => write!(f, "{}({})", self.name(), engine),
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// Run a command against the arbitrator and tracker of the current turn
pub fn dispatch(
    command: &Command,
    arbitrator: &mut FallbackArbitrator,
    tracker: &mut RepromptTracker,
    engine: &mut dyn DialogueEngine,
) -> CommandResult {
    let name = command.name();
    info!(command = %command, "command received");

    let result = match command {
        Command::HandleFallback => match arbitrator.handle_fallback(engine) {
            Ok(HandleOutcome::Handled { .. }) => Ok(HANDLED.to_string()),
            Ok(HandleOutcome::Disabled) => Ok(String::new()),
            // a turn nobody claimed is logged and otherwise left alone
            Err(FallbackError::NoPolicyClaimed) => {
                warn!(error = %FallbackError::NoPolicyClaimed, "handle_fallback ignored");
                Ok(String::new())
            }
            Err(err) => Err(err),
        },
        Command::KeepCounter => arbitrator.keep_counter().map(|_| String::new()),
        Command::ResetCounter => arbitrator.reset_counter().map(|_| String::new()),
        Command::ResetAllCounters => match arbitrator.active_policy() {
            Some(_) => {
                arbitrator.reset_all_counters();
                Ok(String::new())
            }
            None => Err(FallbackError::NoActivePolicy),
        },
        Command::RestoreCounter => arbitrator.restore_counter().map(|_| String::new()),
        Command::SpeechInput => arbitrator.last_speech_input(),
        Command::PrependCurrentReprompt(text) => {
            tracker.prepend_current_reprompt(text);
            Ok(String::new())
        }
        Command::OverrideWithReprompt => {
            tracker.override_with_reprompt();
            Ok(String::new())
        }
        Command::SendReprompt(engine_filter) => Ok(tracker.send_reprompt(engine_filter.as_deref())),
        Command::SaveMarkupState => {
            tracker.save_markup_state();
            Ok(String::new())
        }
        Command::RestoreMarkupState => Ok(tracker.restore_markup_state()),
    };

    match result {
        Ok(value) => CommandResult::ok(name, value),
        Err(err) => {
            warn!(command = %name, error = %err, "command failed");
            CommandResult::failed(name, err.to_string())
        }
    }
}
