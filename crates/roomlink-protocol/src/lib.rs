//! Line classification and multi-line block assembly for the codec
//! control stream.
//!
//! The codec interleaves several kinds of traffic on one line-oriented
//! connection:
//!
//! - echoes of commands this driver sent (`xCommand ...`), which must be
//!   discarded;
//! - multi-line JSON payloads, delimited by a line consisting solely of
//!   `{` and a line consisting solely of `}`;
//! - feedback-list blocks, runs of lines starting with `/` terminated by
//!   the first line that does not;
//! - single status/event lines owned by per-feature dialects;
//! - handshake confirmations (login banner, JSON output mode, feedback
//!   registration) recognized by substring.
//!
//! [`Assembler`] consumes one already-framed line at a time (CR/LF
//! stripped by the transport) and reports completed [`RoutedMessage`]s,
//! detected handshake markers, and the line's disposition. It performs no
//! I/O; the driver crate owns queues, routing, and the transport.

mod classify;
mod message;

pub use classify::{is_command_echo, Assembler, AssemblerStats, LineDisposition, LineOutcome};
pub use message::{Channel, RoutedMessage};

/// A line consisting solely of this string opens a JSON block.
pub const JSON_BLOCK_OPEN: &str = "{";

/// A line consisting solely of this string closes an open JSON block.
pub const JSON_BLOCK_CLOSE: &str = "}";

/// Lines starting with this character belong to a feedback-list block.
pub const FEEDBACK_LINE_PREFIX: char = '/';

/// Case-insensitive substring identifying a command echo.
pub const COMMAND_ECHO_TOKEN: &str = "xcommand";
