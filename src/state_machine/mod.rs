//! Centralized state machine for dashboard state.
//!
//! This module provides the ONLY place where dashboard state changes. Poll
//! results, push messages and user actions all arrive as commands; the machine
//! applies them in the order received, emits events, and broadcasts snapshots
//! to subscribers via a watch channel.
//!
//! Ordering rule: within the tracked session the last applied update wins.
//! Updates produced for any other session are discarded without touching state.

mod commands;
mod events;
mod snapshot;

pub use commands::SyncCommand;
pub use events::SyncEvent;
pub use snapshot::{Artifacts, DashboardSnapshot, INITIAL_STAGE};

use crate::api::{PendingInterrupt, PushMessage, WorkflowStatus};
use crate::structured_logger::StructuredLogger;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

const EVENT_CAPACITY: usize = 256;

/// Owns the dashboard state, applies commands, emits events, broadcasts snapshots.
pub struct SyncMachine {
    state: DashboardSnapshot,
    snapshot_tx: watch::Sender<DashboardSnapshot>,
    events_tx: broadcast::Sender<SyncEvent>,
    logger: Option<Arc<StructuredLogger>>,
    seq: u64,
}

impl SyncMachine {
    /// Creates a machine in the idle state.
    ///
    /// Returns the machine and a watch receiver for snapshots.
    pub fn new(
        logger: Option<Arc<StructuredLogger>>,
    ) -> (Self, watch::Receiver<DashboardSnapshot>) {
        let state = DashboardSnapshot::default();
        let (snapshot_tx, snapshot_rx) = watch::channel(state.clone());
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let machine = Self {
            state,
            snapshot_tx,
            events_tx,
            logger,
            seq: 0,
        };
        (machine, snapshot_rx)
    }

    /// All mutations go through this single method.
    ///
    /// Returns the events produced. Applied commands advance `revision` and
    /// broadcast a snapshot; rejected ones (stale session, ignored push kind)
    /// leave state and revision untouched.
    pub fn apply(&mut self, command: SyncCommand) -> Vec<SyncEvent> {
        self.seq += 1;

        if let Some(logger) = &self.logger {
            logger.log_command(self.seq, &command);
        }

        let events = self.apply_internal(command);

        for event in &events {
            if let Some(logger) = &self.logger {
                logger.log_event(self.seq, event);
            }
            let _ = self.events_tx.send(event.clone());
        }

        if !events.iter().any(SyncEvent::is_rejection) {
            self.state.revision = self.seq;
            self.snapshot_tx.send_replace(self.state.clone());
        }

        events
    }

    fn apply_internal(&mut self, command: SyncCommand) -> Vec<SyncEvent> {
        use SyncCommand::*;
        let mut events = Vec::new();

        match command {
            StartRequested => {
                self.set_status(WorkflowStatus::Starting, &mut events);
                self.set_error(None, &mut events);
            }

            StartSucceeded {
                session_id,
                stage,
                progress,
            } => {
                self.open_session(session_id, &mut events);
                self.set_status(WorkflowStatus::Running, &mut events);
                self.set_stage(stage, &mut events);
                self.set_progress(progress, &mut events);
            }

            StartFailed { message } => {
                self.set_status(WorkflowStatus::Error, &mut events);
                self.set_error(Some(message), &mut events);
            }

            Attached { session_id } => {
                self.open_session(session_id, &mut events);
                self.set_status(WorkflowStatus::Running, &mut events);
                self.set_stage(INITIAL_STAGE.to_string(), &mut events);
                self.set_progress(0.0, &mut events);
            }

            Stopped { session_id } => {
                if let Some(reason) = self.stale(&session_id) {
                    return vec![reason];
                }
                self.close_session(&mut events);
                self.set_status(WorkflowStatus::Idle, &mut events);
                self.set_stage(INITIAL_STAGE.to_string(), &mut events);
                self.set_progress(0.0, &mut events);
                self.state.artifacts = Artifacts::default();
                self.set_interrupt(None, false, &mut events);
            }

            Detached => {
                self.close_session(&mut events);
            }

            InterruptAnswered { session_id } => {
                if let Some(reason) = self.stale(&session_id) {
                    return vec![reason];
                }
                self.set_interrupt(None, true, &mut events);
                self.set_status(WorkflowStatus::Running, &mut events);
            }

            InterruptDismissed => {
                self.set_interrupt(None, false, &mut events);
            }

            SnapshotFetched {
                session_id,
                snapshot,
            } => {
                if let Some(reason) = self.stale(&session_id) {
                    return vec![reason];
                }
                self.set_status(snapshot.status.clone(), &mut events);
                self.set_stage(snapshot.current_stage.clone(), &mut events);
                self.set_progress(snapshot.progress, &mut events);
                self.state.artifacts = Artifacts::from(&snapshot);
                events.push(SyncEvent::ArtifactsReplaced {
                    counts: self.state.artifacts.counts(),
                });
                self.set_interrupt(snapshot.pending_interrupt, false, &mut events);
                self.set_error(snapshot.error_message, &mut events);
            }

            PushReceived {
                session_id,
                message,
            } => {
                if let Some(reason) = self.stale(&session_id) {
                    return vec![reason];
                }
                self.dispatch_push(message, &mut events);
            }

            PushConnectivity {
                session_id,
                connected,
            } => {
                if let Some(reason) = self.stale(&session_id) {
                    return vec![reason];
                }
                if self.state.connected != connected {
                    self.state.connected = connected;
                    events.push(SyncEvent::ConnectivityChanged { connected });
                }
            }

            RequestFailed {
                session_id,
                message,
            } => {
                if let Some(session_id) = session_id {
                    if let Some(reason) = self.stale(&session_id) {
                        return vec![reason];
                    }
                }
                self.set_error(Some(message), &mut events);
            }
        }

        events
    }

    /// One dispatcher over the push message kind.
    fn dispatch_push(&mut self, message: PushMessage, events: &mut Vec<SyncEvent>) {
        if let Some(claimed) = message_session(&message) {
            if let Some(reason) = self.stale(claimed) {
                events.push(reason);
                return;
            }
        }

        match message {
            PushMessage::StatusUpdate {
                status,
                current_stage,
                ..
            } => {
                self.set_status(status, events);
                self.set_stage(current_stage, events);
            }
            PushMessage::ProgressUpdate {
                current_stage,
                progress,
                ..
            } => {
                self.set_stage(current_stage, events);
                self.set_progress(progress, events);
            }
            PushMessage::InterruptRequired { interrupt, .. } => {
                self.set_interrupt(Some(interrupt), false, events);
                self.set_status(WorkflowStatus::WaitingForInput, events);
            }
            PushMessage::WorkflowCompleted { .. } => {
                self.set_status(WorkflowStatus::Completed, events);
                self.set_progress(1.0, events);
            }
            PushMessage::WorkflowError { error, .. } => {
                self.set_status(WorkflowStatus::Error, events);
                self.set_error(Some(error), events);
            }
            PushMessage::InterruptResponseReceived { .. } => {
                self.set_interrupt(None, true, events);
                self.set_status(WorkflowStatus::Running, events);
            }
            PushMessage::Pong => {
                events.push(SyncEvent::PushIgnored {
                    kind: "pong".to_string(),
                });
            }
            PushMessage::Unrecognized { kind } => {
                tracing::debug!("Ignoring push message of unknown kind {:?}", kind);
                events.push(SyncEvent::PushIgnored { kind });
            }
        }
    }

    /// Returns a discard event if `session_id` is not the tracked session.
    fn stale(&self, session_id: &str) -> Option<SyncEvent> {
        if self.state.is_current(session_id) {
            return None;
        }
        tracing::debug!(
            "Discarding update for session {} (tracking {:?})",
            session_id,
            self.state.session_id
        );
        Some(SyncEvent::UpdateDiscarded {
            reason: format!("session {} is not current", session_id),
        })
    }

    fn open_session(&mut self, session_id: String, events: &mut Vec<SyncEvent>) {
        if self.state.is_current(&session_id) {
            return;
        }
        self.close_session(events);
        self.state.artifacts = Artifacts::default();
        self.set_interrupt(None, false, events);
        self.state.session_id = Some(session_id.clone());
        events.push(SyncEvent::SessionOpened { session_id });
    }

    fn close_session(&mut self, events: &mut Vec<SyncEvent>) {
        if let Some(session_id) = self.state.session_id.take() {
            events.push(SyncEvent::SessionClosed { session_id });
        }
        if self.state.connected {
            self.state.connected = false;
            events.push(SyncEvent::ConnectivityChanged { connected: false });
        }
    }

    fn set_status(&mut self, to: WorkflowStatus, events: &mut Vec<SyncEvent>) {
        if self.state.status != to {
            let from = std::mem::replace(&mut self.state.status, to.clone());
            events.push(SyncEvent::StatusChanged { from, to });
        }
    }

    fn set_stage(&mut self, to: String, events: &mut Vec<SyncEvent>) {
        if self.state.current_stage != to {
            let from = std::mem::replace(&mut self.state.current_stage, to.clone());
            events.push(SyncEvent::StageChanged { from, to });
        }
    }

    fn set_progress(&mut self, to: f64, events: &mut Vec<SyncEvent>) {
        if self.state.progress != to {
            let from = std::mem::replace(&mut self.state.progress, to);
            events.push(SyncEvent::ProgressChanged { from, to });
        }
    }

    fn set_error(&mut self, error: Option<String>, events: &mut Vec<SyncEvent>) {
        if self.state.error == error {
            return;
        }
        match &error {
            Some(message) => events.push(SyncEvent::ErrorRecorded {
                message: message.clone(),
            }),
            None => events.push(SyncEvent::ErrorCleared),
        }
        self.state.error = error;
    }

    fn set_interrupt(
        &mut self,
        interrupt: Option<PendingInterrupt>,
        answered: bool,
        events: &mut Vec<SyncEvent>,
    ) {
        if self.state.pending_interrupt == interrupt {
            return;
        }
        match &interrupt {
            Some(raised) => events.push(SyncEvent::InterruptRaised {
                kind: raised.kind.clone(),
                stage: raised.stage.clone(),
            }),
            None => events.push(SyncEvent::InterruptCleared { answered }),
        }
        self.state.pending_interrupt = interrupt;
    }

    /// Current state.
    pub fn snapshot(&self) -> &DashboardSnapshot {
        &self.state
    }

    pub fn session_id(&self) -> Option<&str> {
        self.state.session_id.as_deref()
    }

    pub fn subscribe(&self) -> watch::Receiver<DashboardSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events_tx.subscribe()
    }
}

/// Session id a push message claims to be about, if it names one.
fn message_session(message: &PushMessage) -> Option<&str> {
    match message {
        PushMessage::StatusUpdate { session_id, .. }
        | PushMessage::ProgressUpdate { session_id, .. }
        | PushMessage::InterruptRequired { session_id, .. }
        | PushMessage::WorkflowCompleted { session_id }
        | PushMessage::WorkflowError { session_id, .. }
        | PushMessage::InterruptResponseReceived { session_id, .. } => session_id.as_deref(),
        PushMessage::Pong | PushMessage::Unrecognized { .. } => None,
    }
}
