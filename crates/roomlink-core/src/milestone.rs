//! Handshake milestones.
//!
//! A codec connection is considered synchronized once every milestone has
//! been confirmed. Three of them are recognized directly from the line
//! stream (login banner, JSON output mode, feedback registration); the
//! other three are confirmed by collaborators that classify the initial
//! JSON payloads (full status, configuration, software version).

use std::fmt;

use serde::{Deserialize, Serialize};

/// One confirmed protocol event in the login/handshake sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Milestone {
    /// Login banner or system-unit status seen on the wire.
    Login,
    /// The codec confirmed JSON output mode.
    JsonOutputMode,
    /// The initial full status payload arrived.
    InitialStatus,
    /// The initial configuration payload arrived.
    InitialConfiguration,
    /// The software version payload arrived.
    SoftwareVersion,
    /// The codec confirmed the feedback registration.
    FeedbackRegistered,
}

impl Milestone {
    /// All milestones, in handshake order.
    pub const ALL: [Self; 6] = [
        Self::Login,
        Self::JsonOutputMode,
        Self::InitialStatus,
        Self::InitialConfiguration,
        Self::SoftwareVersion,
        Self::FeedbackRegistered,
    ];

    /// Stable name used in logs and snapshots.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::JsonOutputMode => "json_output_mode",
            Self::InitialStatus => "initial_status",
            Self::InitialConfiguration => "initial_configuration",
            Self::SoftwareVersion => "software_version",
            Self::FeedbackRegistered => "feedback_registered",
        }
    }
}

impl fmt::Display for Milestone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
