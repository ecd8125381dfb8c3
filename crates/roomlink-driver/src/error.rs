//! Driver error types.

use thiserror::Error;

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors that can occur in the driver.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The bounded outbound command queue is full.
    #[error("outbound queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// The bounded inbound event queue is full.
    #[error("event queue is full (capacity {capacity})")]
    EventQueueFull { capacity: usize },

    /// The driver worker has stopped; no further events or commands are
    /// accepted.
    #[error("driver worker is no longer running")]
    Closed,

    /// Transport error (connect, send).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Errors surfaced by a transport implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport lost its connection.
    #[error("transport is not connected")]
    NotConnected,

    /// The transport's writer has stopped accepting sends.
    #[error("transport writer has stopped")]
    WriterClosed,

    /// IO error (connect, read, write).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by feature handlers during routed dispatch.
///
/// Handler errors are logged by the router and never propagate past it.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// A status line or JSON value did not match the handler's dialect.
    #[error("failed to parse response content: {message}")]
    Parse { message: String },

    /// JSON payload error.
    #[error("JSON payload error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HandlerError {
    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }
}
