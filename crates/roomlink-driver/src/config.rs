//! Driver configuration.

/// Default outbound command queue capacity.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

/// Default inbound event queue capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Default cap on lines per multi-line block.
pub const DEFAULT_MAX_BLOCK_LINES: usize = 4096;

/// Configuration for the driver worker.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Capacity of the bounded outbound command queue. `enqueue` awaits
    /// capacity when full; `try_enqueue` fails instead.
    pub outbound_capacity: usize,
    /// Capacity of the bounded inbound event queue. `line_received`
    /// awaits capacity, giving the transport reader backpressure.
    pub event_capacity: usize,
    /// Cap on lines accumulated per JSON or feedback-list block; an open
    /// block exceeding the cap is discarded. `None` disables the cap.
    pub max_block_lines: Option<usize>,
    /// Line terminator appended to outbound commands by the transport.
    pub line_ending: String,
    /// Commands written directly to the transport when the connection is
    /// established. Handshake traffic precedes sync completion and is
    /// not gated by it.
    pub bootstrap_commands: Vec<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            max_block_lines: Some(DEFAULT_MAX_BLOCK_LINES),
            line_ending: "\r\n".to_string(),
            bootstrap_commands: vec![
                "xPreferences OutputMode JSON".to_string(),
                "xFeedback Register /Event/CallDisconnect".to_string(),
                "xStatus SystemUnit".to_string(),
            ],
        }
    }
}

impl DriverConfig {
    /// Creates a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set the outbound queue capacity.
    #[must_use]
    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }

    /// Builder: set the inbound event queue capacity.
    #[must_use]
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Builder: set or disable the per-block line cap.
    #[must_use]
    pub fn with_max_block_lines(mut self, max: Option<usize>) -> Self {
        self.max_block_lines = max;
        self
    }

    /// Builder: set the outbound line terminator.
    #[must_use]
    pub fn with_line_ending(mut self, ending: impl Into<String>) -> Self {
        self.line_ending = ending.into();
        self
    }

    /// Builder: replace the connection bootstrap command sequence.
    #[must_use]
    pub fn with_bootstrap_commands(mut self, commands: Vec<String>) -> Self {
        self.bootstrap_commands = commands;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = DriverConfig::default();
        assert_eq!(config.outbound_capacity, DEFAULT_OUTBOUND_CAPACITY);
        assert_eq!(config.event_capacity, DEFAULT_EVENT_CAPACITY);
        assert_eq!(config.max_block_lines, Some(DEFAULT_MAX_BLOCK_LINES));
        assert_eq!(config.line_ending, "\r\n");
        assert_eq!(config.bootstrap_commands.len(), 3);
    }

    #[test]
    fn builders() {
        let config = DriverConfig::new()
            .with_outbound_capacity(8)
            .with_event_capacity(16)
            .with_max_block_lines(None)
            .with_line_ending("\n")
            .with_bootstrap_commands(vec!["xStatus SystemUnit".to_string()]);

        assert_eq!(config.outbound_capacity, 8);
        assert_eq!(config.event_capacity, 16);
        assert!(config.max_block_lines.is_none());
        assert_eq!(config.line_ending, "\n");
        assert_eq!(config.bootstrap_commands.len(), 1);
    }

    #[test]
    fn capacities_clamped_to_one() {
        let config = DriverConfig::new()
            .with_outbound_capacity(0)
            .with_event_capacity(0);
        assert_eq!(config.outbound_capacity, 1);
        assert_eq!(config.event_capacity, 1);
    }
}
