//! Structured JSONL logger for sync auditing.
//!
//! Every command applied by the sync state machine, and every event it
//! produced, is written as one JSON line with:
//! - The state machine's sequence number (the order updates were applied in)
//! - ISO 8601 timestamps with microsecond precision
//! - A run label for correlating one monitor process
//!
//! This is the record to consult when a slow poll overwrote a newer push.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::state_machine::{SyncCommand, SyncEvent};

pub struct StructuredLogger {
    run: String,
    log_file: Mutex<File>,
    log_path: PathBuf,
}

/// A single log entry in JSONL format.
#[derive(Serialize, Deserialize)]
pub struct LogEntry {
    /// State machine sequence number (0 for entries outside the machine)
    pub seq: u64,
    /// ISO 8601 timestamp with microseconds
    pub ts: String,
    pub run: String,
    /// Component that emitted the log
    pub component: String,
    pub event: Value,
}

impl StructuredLogger {
    /// Creates a logger appending to `<logs_dir>/events.jsonl`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file opened.
    pub fn new(run: &str, logs_dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(logs_dir)?;
        let log_path = logs_dir.join("events.jsonl");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        Ok(Self {
            run: run.to_string(),
            log_file: Mutex::new(file),
            log_path,
        })
    }

    /// Logs a structured event. Thread-safe; write failures are dropped.
    pub fn log(&self, seq: u64, component: &str, event: impl Serialize) {
        let entry = LogEntry {
            seq,
            ts: Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
            run: self.run.clone(),
            component: component.to_string(),
            event: serde_json::to_value(event).unwrap_or(Value::Null),
        };

        if let Ok(mut file) = self.log_file.lock() {
            if let Ok(line) = serde_json::to_string(&entry) {
                let _ = writeln!(file, "{}", line);
                let _ = file.flush();
            }
        }
    }

    pub fn log_command(&self, seq: u64, command: &SyncCommand) {
        self.log(
            seq,
            "Sync",
            serde_json::json!({
                "type": "SyncCommand",
                "command": command.describe()
            }),
        );
    }

    pub fn log_event(&self, seq: u64, event: &SyncEvent) {
        self.log(
            seq,
            "Sync",
            serde_json::json!({
                "type": "SyncEvent",
                "event": event
            }),
        );
    }

    /// Logs push channel lifecycle (connect, close, replace).
    pub fn log_channel(&self, session_id: &str, action: &str) {
        self.log(
            0,
            "Channel",
            serde_json::json!({
                "type": "PushChannel",
                "session_id": session_id,
                "action": action
            }),
        );
    }

    pub fn path(&self) -> &PathBuf {
        &self.log_path
    }
}

#[cfg(test)]
#[path = "tests/structured_logger_tests.rs"]
mod tests;
