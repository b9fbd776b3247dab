//! Follow mode: renders store snapshots and answers interrupts from input lines.
//!
//! The loop reacts to three sources:
//! - snapshot changes (print a status line, prompt for a new interrupt)
//! - sync events (push channel opened or lost)
//! - input lines (answer the interrupt, or run a `/command`)
//! - the shutdown future (detach and hand back the session id)
//!
//! It returns once the workflow reaches a terminal status.

use crate::api::PendingInterrupt;
use crate::render;
use crate::state_machine::{DashboardSnapshot, SyncEvent};
use crate::store::WorkflowStore;
use anyhow::Result;
use std::future::Future;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::broadcast::error::RecvError;

/// How a follow session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum FollowOutcome {
    /// The workflow completed or failed.
    Finished(DashboardSnapshot),
    /// The user stopped the workflow.
    Stopped,
    /// Interrupted locally; the workflow keeps running on the server.
    Detached(Option<String>),
}

/// A line of user input.
#[derive(Debug, Clone, PartialEq)]
enum InputCommand {
    Dismiss,
    Stop,
    Status,
    Answer(String),
    Unknown(String),
}

fn parse_input(line: &str) -> Option<InputCommand> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(match line {
        "/dismiss" => InputCommand::Dismiss,
        "/stop" => InputCommand::Stop,
        "/status" => InputCommand::Status,
        other if other.starts_with('/') => InputCommand::Unknown(other.to_string()),
        other => InputCommand::Answer(other.to_string()),
    })
}

/// Per-loop render memory so nothing is printed twice.
#[derive(Default)]
struct RenderState {
    last_key: Option<render::StatusKey>,
    prompted: Option<PendingInterrupt>,
}

impl RenderState {
    fn render<W: Write>(&mut self, snapshot: &DashboardSnapshot, out: &mut W) -> Result<()> {
        let key = render::status_key(snapshot);
        if self.last_key.as_ref() != Some(&key) {
            writeln!(out, "{}", render::status_line(snapshot))?;
            self.last_key = Some(key);
        }

        match &snapshot.pending_interrupt {
            Some(interrupt) if self.prompted.as_ref() != Some(interrupt) => {
                writeln!(out, "{}", render::interrupt_prompt(interrupt))?;
                self.prompted = Some(interrupt.clone());
            }
            Some(_) => {}
            None => self.prompted = None,
        }
        out.flush()?;
        Ok(())
    }
}

/// Follows the store's tracked session until it finishes, is stopped, or
/// `shutdown` resolves.
pub async fn follow<R, W, S>(
    store: &WorkflowStore,
    input: R,
    out: &mut W,
    shutdown: S,
) -> Result<FollowOutcome>
where
    R: AsyncBufRead + Unpin,
    W: Write,
    S: Future<Output = ()>,
{
    let mut snapshots = store.subscribe();
    let mut events = store.events();
    let mut events_open = true;
    let mut lines = input.lines();
    let mut input_open = true;
    let mut state = RenderState::default();
    tokio::pin!(shutdown);

    loop {
        let snapshot = snapshots.borrow_and_update().clone();
        state.render(&snapshot, out)?;
        if snapshot.status.is_terminal() {
            writeln!(out, "{}", render::summary(&snapshot))?;
            return Ok(FollowOutcome::Finished(snapshot));
        }

        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    anyhow::bail!("Workflow store closed");
                }
            }
            event = events.recv(), if events_open => match event {
                Ok(SyncEvent::ConnectivityChanged { connected }) => {
                    writeln!(out, "{}", render::connectivity_notice(connected))?;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Follow loop skipped {} sync events", skipped);
                }
                Err(RecvError::Closed) => events_open = false,
            },
            line = lines.next_line(), if input_open => match line? {
                Some(line) => {
                    if let Some(command) = parse_input(&line) {
                        if handle_input(store, command, out).await? {
                            return Ok(FollowOutcome::Stopped);
                        }
                    }
                }
                None => {
                    tracing::debug!("Input closed; following without interaction");
                    input_open = false;
                }
            },
            _ = &mut shutdown => {
                let session_id = store.detach();
                return Ok(FollowOutcome::Detached(session_id));
            }
        }
    }
}

/// Runs one input command. Returns true when the workflow was stopped.
async fn handle_input<W: Write>(
    store: &WorkflowStore,
    command: InputCommand,
    out: &mut W,
) -> Result<bool> {
    match command {
        InputCommand::Dismiss => {
            store.dismiss_interrupt();
            writeln!(out, "[interrupt] Dismissed locally")?;
        }
        InputCommand::Stop => match store.stop_workflow().await {
            Ok(()) => {
                writeln!(out, "[workflow] Stopped")?;
                return Ok(true);
            }
            Err(e) => writeln!(out, "[error] Stop failed: {}", e)?,
        },
        InputCommand::Status => match store.fetch_status().await {
            Ok(()) => writeln!(out, "{}", render::status_line(&store.snapshot()))?,
            Err(e) => writeln!(out, "[error] Status fetch failed: {}", e)?,
        },
        InputCommand::Answer(response) => {
            if store.snapshot().pending_interrupt.is_none() {
                writeln!(out, "[interrupt] Nothing to answer right now")?;
            } else {
                match store.respond_to_interrupt(response, None).await {
                    Ok(()) => writeln!(out, "[interrupt] Response sent")?,
                    Err(e) => writeln!(out, "[error] Response failed: {}", e)?,
                }
            }
        }
        InputCommand::Unknown(command) => {
            writeln!(
                out,
                "[error] Unknown command {}; use /dismiss, /stop or /status",
                command
            )?;
        }
    }
    out.flush()?;
    Ok(false)
}

#[cfg(test)]
#[path = "tests/monitor_tests.rs"]
mod tests;
