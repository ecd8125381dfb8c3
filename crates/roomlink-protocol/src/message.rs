//! Completed messages produced by the assembler.

use serde::{Deserialize, Serialize};

/// Which routing channel a completed payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// A JSON block (command response or status dump).
    Response,
    /// A feedback-list block (lines starting with `/`).
    FeedbackResponse,
}

/// A fully-assembled payload ready for fan-out to feature handlers.
///
/// The payload is the exact concatenation of the block's lines, each
/// followed by `\n`; JSON blocks include both brace lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutedMessage {
    /// Routing channel discriminant.
    pub channel: Channel,
    /// Assembled payload text.
    pub payload: String,
}

impl RoutedMessage {
    /// Creates a message for the `Response` channel.
    pub fn response(payload: impl Into<String>) -> Self {
        Self {
            channel: Channel::Response,
            payload: payload.into(),
        }
    }

    /// Creates a message for the `FeedbackResponse` channel.
    pub fn feedback_response(payload: impl Into<String>) -> Self {
        Self {
            channel: Channel::FeedbackResponse,
            payload: payload.into(),
        }
    }

    /// Parses the payload as JSON.
    pub fn parse_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}
