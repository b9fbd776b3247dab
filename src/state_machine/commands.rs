//! Commands that can mutate dashboard state.
//!
//! All state changes MUST go through the state machine's `apply()` method.
//! Commands that originate from a session (fetch results, push messages,
//! failures) carry the session id they were produced for so stale ones can be
//! discarded.

use crate::api::{PushMessage, StatusSnapshot};
use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub enum SyncCommand {
    // Session lifecycle
    /// Optimistic transition before the start call resolves
    StartRequested,
    /// The server accepted the start request
    StartSucceeded {
        session_id: String,
        stage: String,
        progress: f64,
    },
    /// The start call failed; no session is assigned
    StartFailed { message: String },
    /// Begin tracking an existing server session
    Attached { session_id: String },
    /// The server confirmed the stop
    Stopped { session_id: String },
    /// Stop tracking locally without telling the server
    Detached,

    // Interrupts
    /// The server accepted a response to the pending interrupt
    InterruptAnswered { session_id: String },
    /// Local-only dismissal
    InterruptDismissed,

    // Sync sources
    /// A status fetch returned
    SnapshotFetched {
        session_id: String,
        snapshot: StatusSnapshot,
    },
    /// A push message arrived on the channel opened for `session_id`
    PushReceived {
        session_id: String,
        message: PushMessage,
    },
    PushConnectivity { session_id: String, connected: bool },
    /// A transport call failed. `None` means the call was not session-bound.
    RequestFailed {
        session_id: Option<String>,
        message: String,
    },
}

impl SyncCommand {
    /// Compact JSON description for the audit log. Artifact payloads are
    /// summarized, not copied.
    pub fn describe(&self) -> Value {
        match self {
            SyncCommand::StartRequested => json!({"command": "StartRequested"}),
            SyncCommand::StartSucceeded {
                session_id,
                stage,
                progress,
            } => json!({
                "command": "StartSucceeded",
                "session_id": session_id,
                "stage": stage,
                "progress": progress
            }),
            SyncCommand::StartFailed { message } => {
                json!({"command": "StartFailed", "message": message})
            }
            SyncCommand::Attached { session_id } => {
                json!({"command": "Attached", "session_id": session_id})
            }
            SyncCommand::Stopped { session_id } => {
                json!({"command": "Stopped", "session_id": session_id})
            }
            SyncCommand::Detached => json!({"command": "Detached"}),
            SyncCommand::InterruptAnswered { session_id } => {
                json!({"command": "InterruptAnswered", "session_id": session_id})
            }
            SyncCommand::InterruptDismissed => json!({"command": "InterruptDismissed"}),
            SyncCommand::SnapshotFetched {
                session_id,
                snapshot,
            } => json!({
                "command": "SnapshotFetched",
                "session_id": session_id,
                "status": snapshot.status,
                "stage": snapshot.current_stage,
                "progress": snapshot.progress,
                "has_interrupt": snapshot.pending_interrupt.is_some()
            }),
            SyncCommand::PushReceived {
                session_id,
                message,
            } => json!({
                "command": "PushReceived",
                "session_id": session_id,
                "kind": message.kind()
            }),
            SyncCommand::PushConnectivity {
                session_id,
                connected,
            } => json!({
                "command": "PushConnectivity",
                "session_id": session_id,
                "connected": connected
            }),
            SyncCommand::RequestFailed {
                session_id,
                message,
            } => json!({
                "command": "RequestFailed",
                "session_id": session_id,
                "message": message
            }),
        }
    }
}
