//! The concurrent codec control driver.
//!
//! Built around one dedicated worker task that owns all protocol state:
//!
//! - [`sync::SyncState`] tracks the handshake milestones and derives the
//!   sync-complete flag that gates outbound traffic;
//! - [`driver::Driver`] classifies inbound lines (via
//!   `roomlink-protocol`), routes completed messages, and drains the
//!   bounded outbound command queue in strict FIFO order; inbound work
//!   always preempts sending, and nothing is sent while a multi-line
//!   block is being assembled;
//! - [`router::Router`] fans completed payloads out to registered
//!   [`router::FeatureHandler`]s with per-handler error isolation;
//! - [`transport::TcpTransport`] adapts the codec's Telnet-style control
//!   port to the driver's narrow transport contract;
//! - [`workqueue::WorkQueue`] is the shared single-flight batched queue
//!   for handler-side work.

pub mod config;
pub mod driver;
pub mod error;
pub mod handlers;
pub mod router;
pub mod signals;
pub mod sync;
pub mod transport;
pub mod workqueue;

pub use config::DriverConfig;
pub use driver::{Driver, DriverEvent, DriverHandle};
pub use error::{DriverError, DriverResult, HandlerError, TransportError};
pub use handlers::{DoNotDisturbHandler, InitialSyncProbe, StandbyHandler, StandbyState};
pub use router::{FeatureHandler, Router};
pub use sync::{SyncSnapshot, SyncState};
pub use transport::{TcpTransport, Transport};
pub use workqueue::WorkQueue;
