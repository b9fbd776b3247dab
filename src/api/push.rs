//! Messages exchanged over the push channel (`/ws/{session_id}`).
//!
//! Server messages are JSON objects tagged by `type`. Kinds this client does not
//! know decode to [`PushMessage::Unrecognized`] so the dispatcher can log and
//! skip them instead of tearing the channel down.

use super::protocol::{PendingInterrupt, WorkflowStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Server-to-client push message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    StatusUpdate {
        #[serde(default)]
        session_id: Option<String>,
        status: WorkflowStatus,
        #[serde(default)]
        current_stage: String,
    },
    ProgressUpdate {
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        current_stage: String,
        progress: f64,
    },
    InterruptRequired {
        #[serde(default)]
        session_id: Option<String>,
        interrupt: PendingInterrupt,
    },
    WorkflowCompleted {
        #[serde(default)]
        session_id: Option<String>,
    },
    WorkflowError {
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        error: String,
    },
    InterruptResponseReceived {
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        response: String,
    },
    Pong,
    #[serde(skip)]
    Unrecognized { kind: String },
}

const KNOWN_KINDS: &[&str] = &[
    "status_update",
    "progress_update",
    "interrupt_required",
    "workflow_completed",
    "workflow_error",
    "interrupt_response_received",
    "pong",
];

impl PushMessage {
    /// Decodes one text frame.
    ///
    /// Unknown kinds are not an error; malformed JSON and known kinds with a
    /// broken payload are.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if !KNOWN_KINDS.contains(&kind.as_str()) {
            return Ok(PushMessage::Unrecognized { kind });
        }
        serde_json::from_value(value)
    }

    /// Wire name of the message kind.
    pub fn kind(&self) -> &str {
        match self {
            PushMessage::StatusUpdate { .. } => "status_update",
            PushMessage::ProgressUpdate { .. } => "progress_update",
            PushMessage::InterruptRequired { .. } => "interrupt_required",
            PushMessage::WorkflowCompleted { .. } => "workflow_completed",
            PushMessage::WorkflowError { .. } => "workflow_error",
            PushMessage::InterruptResponseReceived { .. } => "interrupt_response_received",
            PushMessage::Pong => "pong",
            PushMessage::Unrecognized { kind } => kind,
        }
    }
}

/// Client-to-server push message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Keep-alive; the server answers with `pong`.
    Ping,
}

impl ClientMessage {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
