//! Diagnostic logging setup.

use crate::paths;
use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Environment variable holding the filter directives.
pub const LOG_FILTER_ENV: &str = "SDLC_MONITOR_LOG";
const DEFAULT_LOG_FILTER: &str = "sdlc_monitor=info";

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Installs the global subscriber: always `~/.sdlc-monitor/logs/debug.log`,
/// plus stderr when `verbose`.
pub fn init_logging(verbose: bool) -> Result<()> {
    let path = paths::debug_log_path()?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open debug log: {}", path.display()))?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_filter(filter());

    let console_layer = verbose.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(filter())
    });

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::debug!("Logging to {}", path.display());
    Ok(())
}
