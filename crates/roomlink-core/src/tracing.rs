//! Tracing setup for roomlink.
//!
//! One initialization path shared by the daemon and the tests. The
//! `RUST_LOG` environment variable overrides the configured default level.

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

/// Errors that can occur during tracing initialization.
#[derive(Debug, Error)]
pub enum TracingError {
    /// A global subscriber was already installed.
    #[error("failed to install global tracing subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),

    /// The custom env filter directive did not parse.
    #[error("failed to parse env filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),
}

/// Output format for log messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    /// Human-readable multi-line format (default).
    #[default]
    Pretty,
    /// Compact single-line format for interactive debugging.
    Compact,
    /// JSON lines for structured collection in daemon mode.
    Json,
}

/// Configuration for tracing initialization.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Default log level when `RUST_LOG` is not set.
    pub default_level: Level,
    /// Output format for log messages.
    pub output_format: TracingOutputFormat,
    /// Custom env filter directive (overrides `default_level` if set).
    pub env_filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: Level::INFO,
            output_format: TracingOutputFormat::Pretty,
            env_filter: None,
        }
    }
}

impl TracingConfig {
    /// Config for daemon use: JSON lines at info level.
    #[must_use]
    pub fn daemon() -> Self {
        Self {
            output_format: TracingOutputFormat::Json,
            ..Default::default()
        }
    }

    /// Config for interactive debugging: compact lines at debug level.
    #[must_use]
    pub fn debug() -> Self {
        Self {
            default_level: Level::DEBUG,
            output_format: TracingOutputFormat::Compact,
            ..Default::default()
        }
    }

    /// Set the default log level.
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    /// Set the output format.
    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Set a custom env filter directive.
    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }
}

/// Initialize tracing with the given configuration.
///
/// Call once at startup. `RUST_LOG` takes precedence over
/// `config.default_level`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed or the
/// env filter directive is invalid.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let env_filter = match config.env_filter {
        Some(ref directive) => EnvFilter::try_new(directive)?,
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("roomlink={}", config.default_level))),
    };

    let layer = match config.output_format {
        TracingOutputFormat::Pretty => fmt::layer().pretty().boxed(),
        TracingOutputFormat::Compact => fmt::layer().compact().boxed(),
        TracingOutputFormat::Json => fmt::layer().json().boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init()?;

    Ok(())
}
