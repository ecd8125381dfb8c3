//! The line/frame assembler.
//!
//! Classifies one inbound line at a time and reassembles multi-line
//! logical messages. Classification order per line:
//!
//! 1. command echoes are discarded before anything else;
//! 2. a non-`/` line terminates an open feedback-list block and then
//!    falls through to the remaining steps (it may open a JSON block in
//!    the same call);
//! 3. `/`-prefixed lines accumulate in the feedback-list buffer;
//! 4. handshake markers are scanned on the trimmed, lower-cased line;
//! 5. `{` and `}` alone on a line open and close the JSON buffer.
//!
//! Unterminated blocks are never flushed. An optional per-block line cap
//! bounds memory: an oversized block is discarded with a warning and
//! counted in [`AssemblerStats`].

use serde::Serialize;
use tracing::{debug, trace, warn};

use roomlink_core::Milestone;

use crate::message::RoutedMessage;
use crate::{COMMAND_ECHO_TOKEN, FEEDBACK_LINE_PREFIX, JSON_BLOCK_CLOSE, JSON_BLOCK_OPEN};

const LOGIN_MARKER: &str = "login successful";
const SYSTEMUNIT_MARKER: &str = "xstatus systemunit";
const JSON_MODE_MARKER: &str = "xpreferences outputmode json";
const FEEDBACK_REGISTER_MARKER: &str = "xfeedback register /event/calldisconnect";

/// What the assembler did with a line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LineDisposition {
    /// Command echo; discarded without touching any buffer.
    Echo,
    /// Consumed into an open block (or a block boundary).
    Buffered,
    /// Not part of any block; eligible for single-line dialect handlers.
    #[default]
    Passthrough,
}

/// Result of ingesting one line.
#[derive(Debug, Default)]
pub struct LineOutcome {
    /// Messages completed by this line, in flush order. A line can flush
    /// two: a feedback-list block it terminates and a JSON block it
    /// closes.
    pub routed: Vec<RoutedMessage>,
    /// Handshake markers detected on this line.
    pub markers: Vec<Milestone>,
    /// What happened to the line itself.
    pub disposition: LineDisposition,
}

/// Counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AssemblerStats {
    /// JSON blocks flushed on the `Response` channel.
    pub responses_flushed: u64,
    /// Feedback-list blocks flushed on the `FeedbackResponse` channel.
    pub feedback_flushed: u64,
    /// Command echoes discarded.
    pub echoes_discarded: u64,
    /// Open blocks discarded (oversized, superseded, or reset).
    pub blocks_discarded: u64,
}

#[derive(Debug)]
struct BlockBuffer {
    text: String,
    lines: usize,
}

impl BlockBuffer {
    fn new() -> Self {
        Self {
            text: String::new(),
            lines: 0,
        }
    }

    fn push_line(&mut self, line: &str) {
        self.text.push_str(line);
        self.text.push('\n');
        self.lines += 1;
    }
}

/// Reassembles multi-line messages from the codec's line stream.
///
/// Owns the two in-progress block buffers exclusively; callers only ever
/// see completed payloads.
#[derive(Debug)]
pub struct Assembler {
    json: Option<BlockBuffer>,
    feedback: Option<BlockBuffer>,
    max_block_lines: Option<usize>,
    stats: AssemblerStats,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler {
    /// Creates an assembler with no block-size cap.
    pub fn new() -> Self {
        Self {
            json: None,
            feedback: None,
            max_block_lines: None,
            stats: AssemblerStats::default(),
        }
    }

    /// Builder: cap open blocks at `max` lines. An open block exceeding
    /// the cap is discarded with a warning.
    #[must_use]
    pub fn with_max_block_lines(mut self, max: usize) -> Self {
        self.max_block_lines = Some(max);
        self
    }

    /// True while a JSON or feedback-list block is being accumulated.
    ///
    /// The dispatcher must not send while this holds: an outbound command
    /// could interleave with the in-progress multi-line response.
    pub fn is_assembling(&self) -> bool {
        self.json.is_some() || self.feedback.is_some()
    }

    /// Current counters.
    pub fn stats(&self) -> AssemblerStats {
        self.stats
    }

    /// Drops any in-progress blocks. Called on disconnect: no partial
    /// state survives into the next connection.
    pub fn reset(&mut self) {
        if self.json.take().is_some() {
            self.stats.blocks_discarded += 1;
        }
        if self.feedback.take().is_some() {
            self.stats.blocks_discarded += 1;
        }
    }

    /// Classifies one inbound line and returns everything it completed.
    pub fn ingest(&mut self, line: &str) -> LineOutcome {
        let mut outcome = LineOutcome::default();

        // Codecs echo sent commands; echoes must never be treated as
        // data and never touch buffer state.
        if is_command_echo(line) {
            trace!(line, "Discarded command echo");
            self.stats.echoes_discarded += 1;
            outcome.disposition = LineDisposition::Echo;
            return outcome;
        }

        // A non-`/` line terminates an open feedback-list block. The
        // terminating line is not part of the block and is classified
        // below in the same call.
        if self.feedback.is_some() && !line.starts_with(FEEDBACK_LINE_PREFIX) {
            if let Some(block) = self.feedback.take() {
                trace!(lines = block.lines, "Flushing feedback-list block");
                self.stats.feedback_flushed += 1;
                outcome
                    .routed
                    .push(RoutedMessage::feedback_response(block.text));
            }
        }

        if line.starts_with(FEEDBACK_LINE_PREFIX) {
            self.append_feedback(line);
            outcome.disposition = LineDisposition::Buffered;
            return outcome;
        }

        outcome.markers = scan_markers(line);

        if line == JSON_BLOCK_OPEN {
            if self.json.take().is_some() {
                debug!("Discarding partial JSON block superseded by a new opening brace");
                self.stats.blocks_discarded += 1;
            }
            let mut block = BlockBuffer::new();
            block.push_line(JSON_BLOCK_OPEN);
            self.json = Some(block);
            outcome.disposition = LineDisposition::Buffered;
        } else if line == JSON_BLOCK_CLOSE && self.json.is_some() {
            if let Some(mut block) = self.json.take() {
                block.push_line(JSON_BLOCK_CLOSE);
                trace!(lines = block.lines, "Flushing JSON block");
                self.stats.responses_flushed += 1;
                outcome.routed.push(RoutedMessage::response(block.text));
            }
            outcome.disposition = LineDisposition::Buffered;
        } else if self.json.is_some() {
            self.append_json(line);
            outcome.disposition = LineDisposition::Buffered;
        }

        outcome
    }

    fn append_feedback(&mut self, line: &str) {
        let block = self.feedback.get_or_insert_with(BlockBuffer::new);
        block.push_line(line);
        if let Some(max) = self.max_block_lines {
            if block.lines > max {
                warn!(lines = block.lines, max, "Discarding oversized feedback-list block");
                self.feedback = None;
                self.stats.blocks_discarded += 1;
            }
        }
    }

    fn append_json(&mut self, line: &str) {
        let Some(block) = self.json.as_mut() else {
            return;
        };
        block.push_line(line);
        if let Some(max) = self.max_block_lines {
            if block.lines > max {
                warn!(lines = block.lines, max, "Discarding oversized JSON block");
                self.json = None;
                self.stats.blocks_discarded += 1;
            }
        }
    }
}

/// True if the line is an echo of a command this driver sent.
pub fn is_command_echo(line: &str) -> bool {
    line.to_ascii_lowercase().contains(COMMAND_ECHO_TOKEN)
}

fn scan_markers(line: &str) -> Vec<Milestone> {
    let normalized = line.trim().to_ascii_lowercase();
    let mut markers = Vec::new();
    if normalized.contains(LOGIN_MARKER) || normalized.contains(SYSTEMUNIT_MARKER) {
        markers.push(Milestone::Login);
    }
    if normalized.contains(JSON_MODE_MARKER) {
        markers.push(Milestone::JsonOutputMode);
    }
    if normalized.contains(FEEDBACK_REGISTER_MARKER) {
        markers.push(Milestone::FeedbackRegistered);
    }
    markers
}
