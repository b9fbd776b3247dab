//! Home-based storage paths for the monitor.
//!
//! Everything lives under `~/.sdlc-monitor/` (or `$SDLC_MONITOR_HOME`):
//! - `config.yaml` - Optional configuration file
//! - `logs/debug.log` - Diagnostic log
//! - `logs/events.jsonl` - Sync audit log for runs without a session
//! - `logs/sessions/<session-id>/events.jsonl` - Sync audit log per session

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// The name of the monitor directory under the home directory.
const MONITOR_DIR: &str = ".sdlc-monitor";

/// Overrides the monitor directory location.
pub const HOME_ENV: &str = "SDLC_MONITOR_HOME";

/// Returns the monitor directory: `~/.sdlc-monitor/`
///
/// Creates the directory if it doesn't exist.
///
/// # Errors
///
/// Returns an error if:
/// - Home directory cannot be determined
/// - Directory creation fails
pub fn monitor_home_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os(HOME_ENV) {
        Some(custom) if !custom.is_empty() => PathBuf::from(custom),
        _ => dirs::home_dir()
            .context("Could not determine home directory for monitor storage")?
            .join(MONITOR_DIR),
    };
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create monitor directory: {}", dir.display()))?;
    Ok(dir)
}

/// Returns the default config path: `~/.sdlc-monitor/config.yaml`. The file may not exist.
pub fn config_path() -> Result<PathBuf> {
    Ok(monitor_home_dir()?.join("config.yaml"))
}

/// Returns the logs directory: `~/.sdlc-monitor/logs/`
///
/// Creates the directory if it doesn't exist.
pub fn logs_dir() -> Result<PathBuf> {
    let dir = monitor_home_dir()?.join("logs");
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create logs directory: {}", dir.display()))?;
    Ok(dir)
}

/// Returns the debug log path: `~/.sdlc-monitor/logs/debug.log`
pub fn debug_log_path() -> Result<PathBuf> {
    Ok(logs_dir()?.join("debug.log"))
}

/// Returns the per-session logs directory: `~/.sdlc-monitor/logs/sessions/<session-id>/`
///
/// Creates the directory if it doesn't exist.
pub fn session_logs_dir(session_id: &str) -> Result<PathBuf> {
    let dir = logs_dir()?.join("sessions").join(sanitize(session_id));
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create session logs directory: {}", dir.display()))?;
    Ok(dir)
}

/// Session ids are server-assigned; keep them from escaping the logs directory.
fn sanitize(session_id: &str) -> String {
    let cleaned: String = session_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
