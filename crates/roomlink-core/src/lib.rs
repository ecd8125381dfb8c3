//! Core types shared across the roomlink workspace: handshake milestones
//! and tracing setup.

pub mod milestone;
pub mod tracing;

pub use milestone::Milestone;
pub use tracing::{init_tracing, TracingConfig, TracingError, TracingOutputFormat};
