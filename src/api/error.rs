//! Transport error normalization.
//!
//! Every failure of a request/response call collapses into one of these
//! variants. The `Display` text is what ends up in the dashboard's error field.

use std::io;

/// Generic message used when a failure response carries no `detail`.
const GENERIC_FAILURE: &str = "request failed";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    /// 404 from the server: the session id is stale or was never valid.
    #[error("workflow session not found")]
    NotFound,
    /// Any other non-success status.
    #[error("{detail}")]
    Server { status: u16, detail: String },
    #[error("request timed out")]
    Timeout,
    /// No response at all.
    #[error("network error: {message}")]
    Network { message: String },
    #[error("invalid response from workflow API: {message}")]
    Decode { message: String },
}

impl TransportError {
    /// Builds the error for a non-success HTTP status from the raw response body.
    pub fn from_status(status: u16, body: &str) -> Self {
        if status == 404 {
            return TransportError::NotFound;
        }
        let detail = extract_detail(body)
            .unwrap_or_else(|| format!("{} with status {}", GENERIC_FAILURE, status));
        TransportError::Server { status, detail }
    }

    pub fn from_ureq(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(status) => TransportError::from_status(status, ""),
            ureq::Error::Timeout(_) => TransportError::Timeout,
            ureq::Error::Io(e) => TransportError::from_io(e),
            other => TransportError::Network {
                message: other.to_string(),
            },
        }
    }

    fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportError::Timeout,
            _ => TransportError::Network {
                message: err.to_string(),
            },
        }
    }

    pub fn decode(err: impl std::fmt::Display) -> Self {
        TransportError::Decode {
            message: err.to_string(),
        }
    }
}

/// Pulls the `detail` string out of a JSON error body.
fn extract_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::String(detail) if !detail.trim().is_empty() => Some(detail.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}
