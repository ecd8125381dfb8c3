//! The driver worker: inbound classification, handshake gating, and the
//! outbound command queue.
//!
//! One dedicated task owns the assembler, sync state, router, and
//! transport. Per iteration, in priority order:
//!
//! - shutdown wins over everything and the loop never re-enters;
//! - inbound events (lines, milestones, connection state) preempt
//!   outbound sending;
//! - an outbound command is dequeued only when the handshake is complete
//!   and no multi-line block is being assembled.
//!
//! The worker parks on its channels when there is no eligible work; all
//! wake-ups are channel sends, never polling.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use roomlink_core::Milestone;
use roomlink_protocol::{Assembler, LineDisposition};

use crate::config::DriverConfig;
use crate::error::{DriverError, DriverResult};
use crate::router::{FeatureHandler, Router};
use crate::sync::{SyncSnapshot, SyncState};
use crate::transport::Transport;

/// Inbound work for the driver worker.
#[derive(Debug)]
pub enum DriverEvent {
    /// One raw line from the transport, CR/LF already stripped.
    Line(String),
    /// A milestone confirmed by a collaborator that classifies JSON
    /// payload content (status, configuration, software version).
    Milestone(Milestone),
    /// The transport established its connection.
    Connected,
    /// The transport lost its connection.
    Disconnected,
}

/// Cloneable handle for feeding the driver and queuing commands.
#[derive(Clone)]
pub struct DriverHandle {
    events_tx: mpsc::Sender<DriverEvent>,
    outbound_tx: mpsc::Sender<String>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    sync_rx: watch::Receiver<bool>,
    outbound_capacity: usize,
    event_capacity: usize,
}

impl DriverHandle {
    /// Delivers one inbound line. Awaits event-queue capacity, so a
    /// fast-talking codec backpressures the transport reader.
    pub async fn line_received(&self, line: impl Into<String>) -> DriverResult<()> {
        self.events_tx
            .send(DriverEvent::Line(line.into()))
            .await
            .map_err(|_| DriverError::Closed)
    }

    /// Marks a milestone from a collaborator. Non-blocking; fails if the
    /// event queue is full rather than stalling the caller.
    pub fn mark_milestone(&self, milestone: Milestone) -> DriverResult<()> {
        self.events_tx
            .try_send(DriverEvent::Milestone(milestone))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => DriverError::EventQueueFull {
                    capacity: self.event_capacity,
                },
                mpsc::error::TrySendError::Closed(_) => DriverError::Closed,
            })
    }

    /// Signals that the transport connected.
    pub async fn connected(&self) -> DriverResult<()> {
        self.events_tx
            .send(DriverEvent::Connected)
            .await
            .map_err(|_| DriverError::Closed)
    }

    /// Signals that the transport disconnected. Clears sync state and
    /// the outbound queue.
    pub async fn disconnected(&self) -> DriverResult<()> {
        self.events_tx
            .send(DriverEvent::Disconnected)
            .await
            .map_err(|_| DriverError::Closed)
    }

    /// Queues a command for delivery once the handshake is complete.
    /// No-op on empty or whitespace-only commands. Awaits capacity when
    /// the bounded queue is full, which can stall the caller.
    pub async fn enqueue(&self, command: impl Into<String>) -> DriverResult<()> {
        let command = command.into();
        if command.trim().is_empty() {
            debug!("Ignoring empty command");
            return Ok(());
        }
        self.outbound_tx
            .send(command)
            .await
            .map_err(|_| DriverError::Closed)
    }

    /// Non-blocking [`enqueue`](Self::enqueue): fails with
    /// [`DriverError::QueueFull`] instead of awaiting capacity.
    pub fn try_enqueue(&self, command: impl Into<String>) -> DriverResult<()> {
        let command = command.into();
        if command.trim().is_empty() {
            debug!("Ignoring empty command");
            return Ok(());
        }
        self.outbound_tx.try_send(command).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DriverError::QueueFull {
                capacity: self.outbound_capacity,
            },
            mpsc::error::TrySendError::Closed(_) => DriverError::Closed,
        })
    }

    /// True once the handshake has completed.
    pub fn is_sync_complete(&self) -> bool {
        *self.sync_rx.borrow()
    }

    /// Waits for the handshake to complete.
    pub async fn sync_completed(&self) -> DriverResult<()> {
        let mut rx = self.sync_rx.clone();
        rx.wait_for(|complete| *complete)
            .await
            .map(|_| ())
            .map_err(|_| DriverError::Closed)
    }

    /// Requests a prompt worker shutdown. An in-flight send completes;
    /// the loop never re-enters.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// The driver worker. Build it, register handlers, take a handle, then
/// consume it with [`run`](Self::run) on a dedicated task.
pub struct Driver {
    config: DriverConfig,
    assembler: Assembler,
    sync: SyncState,
    router: Router,
    events_rx: Option<mpsc::Receiver<DriverEvent>>,
    outbound_rx: Option<mpsc::Receiver<String>>,
    handle: DriverHandle,
    shutdown_rx: watch::Receiver<bool>,
}

impl Driver {
    /// Creates a driver with the given configuration.
    pub fn new(config: DriverConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel(config.event_capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let sync = SyncState::new();
        let assembler = match config.max_block_lines {
            Some(max) => Assembler::new().with_max_block_lines(max),
            None => Assembler::new(),
        };

        let handle = DriverHandle {
            events_tx,
            outbound_tx,
            shutdown_tx: Arc::new(shutdown_tx),
            sync_rx: sync.subscribe(),
            outbound_capacity: config.outbound_capacity,
            event_capacity: config.event_capacity,
        };

        Self {
            config,
            assembler,
            sync,
            router: Router::new(),
            events_rx: Some(events_rx),
            outbound_rx: Some(outbound_rx),
            handle,
            shutdown_rx,
        }
    }

    /// Registers a feature handler with the router.
    pub fn register_handler(&mut self, handler: Box<dyn FeatureHandler>) {
        self.router.register(handler);
    }

    /// Returns a handle for feeding events and queuing commands.
    pub fn handle(&self) -> DriverHandle {
        self.handle.clone()
    }

    /// Current sync state, for diagnostics.
    pub fn sync_snapshot(&self) -> SyncSnapshot {
        self.sync.snapshot()
    }

    /// Runs the worker loop until shutdown. Consumes the driver; use a
    /// [`DriverHandle`] to interact with it.
    pub async fn run(mut self, mut transport: Box<dyn Transport>) {
        let mut events_rx = self.events_rx.take().expect("run called twice");
        let mut outbound_rx = self.outbound_rx.take().expect("run called twice");
        let mut shutdown_rx = self.shutdown_rx.clone();

        info!("Driver worker started");
        loop {
            let send_eligible = self.sync.is_complete() && !self.assembler.is_assembling();

            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    match changed {
                        Ok(()) if *shutdown_rx.borrow() => {
                            info!("Shutdown requested");
                            break;
                        }
                        Ok(()) => {}
                        Err(_) => break,
                    }
                }

                event = events_rx.recv() => {
                    match event {
                        Some(event) => {
                            self.handle_event(event, transport.as_mut(), &mut outbound_rx);
                        }
                        None => {
                            debug!("All driver handles dropped");
                            break;
                        }
                    }
                }

                command = outbound_rx.recv(), if send_eligible => {
                    if let Some(command) = command {
                        Self::send_command(transport.as_mut(), &command);
                    }
                }
            }
        }
        info!("Driver worker stopped");
    }

    fn handle_event(
        &mut self,
        event: DriverEvent,
        transport: &mut dyn Transport,
        outbound_rx: &mut mpsc::Receiver<String>,
    ) {
        match event {
            DriverEvent::Line(line) => {
                let outcome = self.assembler.ingest(&line);
                for marker in outcome.markers {
                    self.apply_milestone(marker);
                }
                for message in &outcome.routed {
                    self.router.publish(message);
                }
                if outcome.disposition == LineDisposition::Passthrough {
                    self.router.dispatch_line(&line);
                }
            }
            DriverEvent::Milestone(milestone) => self.apply_milestone(milestone),
            DriverEvent::Connected => {
                info!("Transport connected; sending handshake bootstrap");
                for command in &self.config.bootstrap_commands {
                    Self::send_command(transport, command);
                }
            }
            DriverEvent::Disconnected => {
                let mut dropped = 0u64;
                while outbound_rx.try_recv().is_ok() {
                    dropped += 1;
                }
                self.sync.reset();
                self.assembler.reset();
                warn!(
                    dropped_commands = dropped,
                    "Disconnected; sync state and outbound queue cleared"
                );
            }
        }
    }

    fn apply_milestone(&mut self, milestone: Milestone) {
        if self.sync.mark(milestone) {
            self.on_sync_complete();
        }
    }

    fn on_sync_complete(&mut self) {
        info!("Initial synchronization complete; releasing queued commands");
        for command in self.router.registration_commands() {
            if let Err(e) = self.handle.try_enqueue(command.as_str()) {
                warn!(error = %e, command = %command, "Failed to enqueue handler registration");
            }
        }
    }

    fn send_command(transport: &mut dyn Transport, command: &str) {
        match transport.send_text(command) {
            Ok(()) => trace!(command, "Sent command"),
            Err(e) => {
                warn!(error = %e, command, "Transport send failed; dropping command");
            }
        }
    }
}
