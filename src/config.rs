//! Configuration for the arbitrator and the tracker
//!
//! Thresholds are fixed crate constants (see `lib.rs`). Everything here is
//! product configuration: module names, event names, topic lists.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration, loadable from a JSON file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fallback: FallbackConfig,
    pub tracker: TrackerConfig,
}

impl Config {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parse from a JSON string
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Fallback arbitration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// When false, `handle_fallback` leaves the turn to the dialogue engine
    pub enabled: bool,
    /// Module whose fallbacks always go to the remote engine
    pub open_conversation_module: String,
    /// Language model requested for remote fallback answers
    pub remote_model: String,
    /// Event that resumes a deferred fallback once the remote answer arrives
    pub speech_received_event: String,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            open_conversation_module: "MOXIMUSPRIME".to_string(),
            remote_model: "gpt-3.5-turbo".to_string(),
            speech_received_event: "eb-remote-act-speak".to_string(),
        }
    }
}

/// Reprompt and markup tracking settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Modules visited briefly that do not count as a module change
    pub tangent_modules: Vec<String>,
    /// Events that interrupt the prompt currently being played
    pub interrupting_events: Vec<String>,
    /// Topics marking the start of a fresh conversation
    pub base_topics: Vec<String>,
    /// Input variable set to "true" on interrupting speech
    pub interruption_variable: String,
    /// Event carrying a continuation of the previous remote output
    pub stream_event: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tangent_modules: vec!["gt".to_string(), "bo".to_string(), "wakeup".to_string()],
            interrupting_events: vec!["eb-mpu-picked-up-interrupt".to_string()],
            base_topics: vec!["bo_heel_cool".to_string()],
            interruption_variable: "$eb_interrupting".to_string(),
            stream_event: "eb-remote-act-stream".to_string(),
        }
    }
}

impl TrackerConfig {
    pub fn is_tangent_module(&self, module: &str) -> bool {
        self.tangent_modules.iter().any(|m| m == module)
    }

    pub fn is_interrupting_event(&self, event: &str) -> bool {
        self.interrupting_events.iter().any(|e| e == event)
    }

    pub fn is_base_topic(&self, topic: &str) -> bool {
        self.base_topics.iter().any(|t| t == topic)
    }
}
