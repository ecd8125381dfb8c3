//! Reference feature handlers.
//!
//! These own the simplest protocol sub-dialects and double as the model
//! for external handlers: a standby-state handler and a do-not-disturb
//! handler (single-line dialects published on watch channels), and the
//! initial-sync probe that confirms the JSON-derived handshake
//! milestones through the driver handle.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use roomlink_core::Milestone;

use crate::driver::DriverHandle;
use crate::error::HandlerError;
use crate::router::FeatureHandler;

static STANDBY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\*s\s+standby\s+state:\s*(\S+)").expect("standby pattern compiles")
});

static DND_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\*s\s+conference\s+donotdisturb:\s*(\S+)")
        .expect("do-not-disturb pattern compiles")
});

/// Reported standby state of the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandbyState {
    /// Fully awake.
    Off,
    /// Display dimmed, wake on activity.
    Halfwake,
    /// Transitioning into standby.
    EnteringStandby,
    /// In standby.
    Standby,
}

impl StandbyState {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "off" => Some(Self::Off),
            "halfwake" => Some(Self::Halfwake),
            "enteringstandby" => Some(Self::EnteringStandby),
            "standby" => Some(Self::Standby),
            _ => None,
        }
    }

    /// Stable name used in logs.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Halfwake => "halfwake",
            Self::EnteringStandby => "entering_standby",
            Self::Standby => "standby",
        }
    }
}

impl fmt::Display for StandbyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extracts a leaf string from either a bare JSON string or the codec's
/// `{"Value": "..."}` wrapping.
fn leaf_str(value: &Value) -> Option<&str> {
    value
        .as_str()
        .or_else(|| value.pointer("/Value").and_then(Value::as_str))
}

/// Tracks the codec's standby state.
///
/// Consumes both the single-line dialect (`*s Standby State: Standby`)
/// and the JSON status sub-tree; publishes the current state on a watch
/// channel.
pub struct StandbyHandler {
    state_tx: watch::Sender<Option<StandbyState>>,
}

impl Default for StandbyHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl StandbyHandler {
    /// Creates a handler with no known state yet.
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(None);
        Self { state_tx }
    }

    /// Subscribes to standby state changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<StandbyState>> {
        self.state_tx.subscribe()
    }

    fn update(&self, state: StandbyState) {
        debug!(state = %state, "Standby state");
        let _ = self.state_tx.send(Some(state));
    }

    fn parse_value(value: &str) -> Result<StandbyState, HandlerError> {
        StandbyState::parse(value)
            .ok_or_else(|| HandlerError::parse(format!("unknown standby state {value:?}")))
    }
}

impl FeatureHandler for StandbyHandler {
    fn name(&self) -> &'static str {
        "standby"
    }

    fn poll_commands(&self) -> Vec<String> {
        vec!["xStatus Standby".to_string()]
    }

    fn feedback_topics(&self) -> Vec<String> {
        vec!["/Status/Standby".to_string()]
    }

    fn handles_line(&self, line: &str) -> bool {
        STANDBY_LINE.is_match(line)
    }

    fn handle_line(&mut self, line: &str) -> Result<(), HandlerError> {
        let captures = STANDBY_LINE
            .captures(line)
            .ok_or_else(|| HandlerError::parse("line did not match standby dialect"))?;
        let state = Self::parse_value(&captures[1])?;
        self.update(state);
        Ok(())
    }

    fn json_paths(&self) -> Vec<String> {
        vec!["/Status/Standby/State".to_string()]
    }

    fn on_json(&mut self, _path: &str, value: &Value) -> Result<(), HandlerError> {
        let text = leaf_str(value)
            .ok_or_else(|| HandlerError::parse("standby state is not a JSON string"))?;
        let state = Self::parse_value(text)?;
        self.update(state);
        Ok(())
    }
}

/// Tracks the codec's do-not-disturb flag.
pub struct DoNotDisturbHandler {
    active_tx: watch::Sender<Option<bool>>,
}

impl Default for DoNotDisturbHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl DoNotDisturbHandler {
    /// Creates a handler with no known state yet.
    pub fn new() -> Self {
        let (active_tx, _) = watch::channel(None);
        Self { active_tx }
    }

    /// Subscribes to do-not-disturb changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<bool>> {
        self.active_tx.subscribe()
    }

    fn update(&self, active: bool) {
        debug!(active, "Do-not-disturb");
        let _ = self.active_tx.send(Some(active));
    }

    fn parse_value(value: &str) -> Result<bool, HandlerError> {
        match value.to_ascii_lowercase().as_str() {
            "active" => Ok(true),
            "inactive" => Ok(false),
            other => Err(HandlerError::parse(format!(
                "unknown do-not-disturb value {other:?}"
            ))),
        }
    }
}

impl FeatureHandler for DoNotDisturbHandler {
    fn name(&self) -> &'static str {
        "do-not-disturb"
    }

    fn poll_commands(&self) -> Vec<String> {
        vec!["xStatus Conference DoNotDisturb".to_string()]
    }

    fn feedback_topics(&self) -> Vec<String> {
        vec!["/Status/Conference/DoNotDisturb".to_string()]
    }

    fn handles_line(&self, line: &str) -> bool {
        DND_LINE.is_match(line)
    }

    fn handle_line(&mut self, line: &str) -> Result<(), HandlerError> {
        let captures = DND_LINE
            .captures(line)
            .ok_or_else(|| HandlerError::parse("line did not match do-not-disturb dialect"))?;
        let active = Self::parse_value(&captures[1])?;
        self.update(active);
        Ok(())
    }

    fn json_paths(&self) -> Vec<String> {
        vec!["/Status/Conference/DoNotDisturb".to_string()]
    }

    fn on_json(&mut self, _path: &str, value: &Value) -> Result<(), HandlerError> {
        let text = leaf_str(value)
            .ok_or_else(|| HandlerError::parse("do-not-disturb value is not a JSON string"))?;
        let active = Self::parse_value(text)?;
        self.update(active);
        Ok(())
    }
}

/// Confirms the JSON-derived handshake milestones.
///
/// The line-level classifier recognizes the login banner, JSON output
/// mode, and feedback registration; the remaining milestones are
/// confirmed by payload content, which is this handler's job: the first
/// `Status` sub-tree marks the initial status (and the software version,
/// when present), the first `Configuration` sub-tree marks the initial
/// configuration.
pub struct InitialSyncProbe {
    handle: DriverHandle,
}

impl InitialSyncProbe {
    /// Creates a probe marking milestones through the given handle.
    pub fn new(handle: DriverHandle) -> Self {
        Self { handle }
    }

    fn mark(&self, milestone: Milestone) {
        if let Err(e) = self.handle.mark_milestone(milestone) {
            warn!(milestone = %milestone, error = %e, "Failed to mark milestone");
        }
    }
}

impl FeatureHandler for InitialSyncProbe {
    fn name(&self) -> &'static str {
        "initial-sync"
    }

    fn json_paths(&self) -> Vec<String> {
        vec!["/Status".to_string(), "/Configuration".to_string()]
    }

    fn on_json(&mut self, path: &str, value: &Value) -> Result<(), HandlerError> {
        match path {
            "/Status" => {
                self.mark(Milestone::InitialStatus);
                if value.pointer("/SystemUnit/Software/Version").is_some() {
                    self.mark(Milestone::SoftwareVersion);
                }
            }
            "/Configuration" => self.mark(Milestone::InitialConfiguration),
            _ => {}
        }
        Ok(())
    }
}
