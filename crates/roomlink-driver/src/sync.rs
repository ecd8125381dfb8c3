//! Handshake tracker (sync state).
//!
//! Tracks the six independent handshake milestones and derives one
//! `complete` flag from their conjunction. Completion gates the outbound
//! command queue: nothing is sent to the codec before every milestone is
//! confirmed. All mutation goes through the setters here; the flags are
//! never toggled directly by callers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use roomlink_core::Milestone;

/// Serializable view of the sync state for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncSnapshot {
    /// Login banner or system-unit status confirmed.
    pub login: bool,
    /// JSON output mode confirmed.
    pub json_output_mode: bool,
    /// Initial status payload received.
    pub initial_status: bool,
    /// Initial configuration payload received.
    pub initial_configuration: bool,
    /// Software version payload received.
    pub software_version: bool,
    /// Feedback registration confirmed.
    pub feedback_registered: bool,
    /// Conjunction of all six milestones.
    pub complete: bool,
    /// When the handshake completed, if it has.
    pub completed_at: Option<DateTime<Utc>>,
}

/// The handshake state machine.
///
/// Completion is published on a `watch` channel so observers can await
/// the false→true edge; the edge fires exactly once per connection, until
/// [`SyncState::reset`].
#[derive(Debug)]
pub struct SyncState {
    login: bool,
    json_output_mode: bool,
    initial_status: bool,
    initial_configuration: bool,
    software_version: bool,
    feedback_registered: bool,
    completed_at: Option<DateTime<Utc>>,
    complete_tx: watch::Sender<bool>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncState {
    /// Creates a fresh, fully-unsynchronized state.
    pub fn new() -> Self {
        let (complete_tx, _) = watch::channel(false);
        Self {
            login: false,
            json_output_mode: false,
            initial_status: false,
            initial_configuration: false,
            software_version: false,
            feedback_registered: false,
            completed_at: None,
            complete_tx,
        }
    }

    /// Marks one milestone as confirmed. Idempotent: repeated calls for
    /// an already-confirmed milestone only log.
    ///
    /// Returns `true` when this call completed the handshake (the
    /// false→true edge of the derived flag).
    pub fn mark(&mut self, milestone: Milestone) -> bool {
        {
            let flag = self.flag_mut(milestone);
            if *flag {
                debug!(milestone = %milestone, "Milestone already confirmed");
                return false;
            }
            *flag = true;
        }
        info!(milestone = %milestone, "Handshake milestone confirmed");

        if self.all_confirmed() && self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
            let _ = self.complete_tx.send(true);
            info!("Handshake complete");
            return true;
        }
        false
    }

    /// True once every milestone has been confirmed.
    pub fn is_complete(&self) -> bool {
        self.all_confirmed()
    }

    /// Subscribes to the derived complete flag.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.complete_tx.subscribe()
    }

    /// Clears every milestone. Called on disconnect: queued commands are
    /// stale after a reconnect and higher-level logic must re-issue them.
    pub fn reset(&mut self) {
        self.login = false;
        self.json_output_mode = false;
        self.initial_status = false;
        self.initial_configuration = false;
        self.software_version = false;
        self.feedback_registered = false;
        self.completed_at = None;
        let _ = self.complete_tx.send(false);
        debug!("Sync state reset");
    }

    /// Current state, for diagnostics.
    pub fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            login: self.login,
            json_output_mode: self.json_output_mode,
            initial_status: self.initial_status,
            initial_configuration: self.initial_configuration,
            software_version: self.software_version,
            feedback_registered: self.feedback_registered,
            complete: self.all_confirmed(),
            completed_at: self.completed_at,
        }
    }

    fn all_confirmed(&self) -> bool {
        self.login
            && self.json_output_mode
            && self.initial_status
            && self.initial_configuration
            && self.software_version
            && self.feedback_registered
    }

    fn flag_mut(&mut self, milestone: Milestone) -> &mut bool {
        match milestone {
            Milestone::Login => &mut self.login,
            Milestone::JsonOutputMode => &mut self.json_output_mode,
            Milestone::InitialStatus => &mut self.initial_status,
            Milestone::InitialConfiguration => &mut self.initial_configuration,
            Milestone::SoftwareVersion => &mut self.software_version,
            Milestone::FeedbackRegistered => &mut self.feedback_registered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mark_all(state: &mut SyncState) -> usize {
        Milestone::ALL
            .iter()
            .filter(|m| state.mark(**m))
            .count()
    }

    #[test]
    fn incomplete_until_every_milestone() {
        let mut state = SyncState::new();
        for milestone in &Milestone::ALL[..5] {
            assert!(!state.mark(*milestone));
            assert!(!state.is_complete());
        }
        assert!(state.mark(Milestone::ALL[5]));
        assert!(state.is_complete());
    }

    #[test]
    fn completion_edge_fires_once() {
        let mut state = SyncState::new();
        assert_eq!(mark_all(&mut state), 1);
        // Re-marking confirmed milestones is a no-op.
        assert_eq!(mark_all(&mut state), 0);
        assert!(state.is_complete());
    }

    #[test]
    fn watch_observes_completion() {
        let mut state = SyncState::new();
        let rx = state.subscribe();
        assert!(!*rx.borrow());
        mark_all(&mut state);
        assert!(*rx.borrow());
    }

    #[test]
    fn reset_clears_everything() {
        let mut state = SyncState::new();
        mark_all(&mut state);
        assert!(state.is_complete());
        assert!(state.snapshot().completed_at.is_some());

        state.reset();
        let snapshot = state.snapshot();
        assert!(!snapshot.complete);
        assert!(!snapshot.login);
        assert!(!snapshot.json_output_mode);
        assert!(!snapshot.initial_status);
        assert!(!snapshot.initial_configuration);
        assert!(!snapshot.software_version);
        assert!(!snapshot.feedback_registered);
        assert!(snapshot.completed_at.is_none());
        assert!(!*state.subscribe().borrow());
    }

    #[test]
    fn completion_edge_fires_again_after_reset() {
        let mut state = SyncState::new();
        assert_eq!(mark_all(&mut state), 1);
        state.reset();
        assert_eq!(mark_all(&mut state), 1);
    }

    #[test]
    fn snapshot_tracks_partial_progress() {
        let mut state = SyncState::new();
        state.mark(Milestone::Login);
        state.mark(Milestone::JsonOutputMode);
        let snapshot = state.snapshot();
        assert!(snapshot.login);
        assert!(snapshot.json_output_mode);
        assert!(!snapshot.initial_status);
        assert!(!snapshot.complete);
        assert!(snapshot.completed_at.is_none());
    }
}
