//! Events emitted by the state machine after processing commands.
//!
//! These drive the audit log and notifications (the follow loop prints status
//! transitions from them). Full state is delivered via the watch channel's
//! `DashboardSnapshot`.

use super::snapshot::ArtifactCounts;
use crate::api::WorkflowStatus;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    StatusChanged {
        from: WorkflowStatus,
        to: WorkflowStatus,
    },
    StageChanged { from: String, to: String },
    ProgressChanged { from: f64, to: f64 },
    SessionOpened { session_id: String },
    SessionClosed { session_id: String },
    /// A status fetch replaced every artifact collection
    ArtifactsReplaced { counts: ArtifactCounts },
    InterruptRaised { kind: String, stage: String },
    /// `answered` is false for a local dismissal or a server-side clear
    InterruptCleared { answered: bool },
    ErrorRecorded { message: String },
    ErrorCleared,
    ConnectivityChanged { connected: bool },
    /// The command targeted a session that is no longer current
    UpdateDiscarded { reason: String },
    /// A push message kind with no effect on state
    PushIgnored { kind: String },
}

impl SyncEvent {
    /// True for events that mean the command was not applied.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            SyncEvent::UpdateDiscarded { .. } | SyncEvent::PushIgnored { .. }
        )
    }
}
