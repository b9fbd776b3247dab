//! Workflow status store.
//!
//! `WorkflowStore` tracks at most one workflow session. It owns:
//! - the sync state machine (the only place dashboard state changes)
//! - one poll loop per session, fetching status every `poll_interval`
//! - one push channel per session, pumped into the state machine
//!
//! Both sources race; the state machine applies whatever arrives last and
//! discards anything produced for a session that is no longer tracked. Starting,
//! attaching, stopping or detaching always tears the previous session's tasks
//! down first, so loops and channels never accumulate.

use crate::api::{
    HealthStatus, PushChannel, PushCloser, PushConnector, PushEvent, RespondRequest,
    SessionSummary, StartRequest, TransportError, WorkflowApi,
};
use crate::state_machine::{DashboardSnapshot, SyncCommand, SyncEvent, SyncMachine};
use crate::structured_logger::StructuredLogger;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Synchronization settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub poll_interval: Duration,
    /// Stage shown right after a successful start
    pub first_stage: String,
    /// Placeholder progress shown right after a successful start
    pub start_progress: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            first_stage: "user_stories".to_string(),
            start_progress: 0.1,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Rejected locally; nothing was sent.
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Background work owned by the tracked session.
#[derive(Default)]
struct SessionTasks {
    poller: Option<JoinHandle<()>>,
    pump: Option<JoinHandle<()>>,
    closer: Option<PushCloser>,
}

impl SessionTasks {
    fn teardown(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
        if let Some(mut closer) = self.closer.take() {
            if !closer.is_closed() {
                tracing::debug!("Closing push channel");
            }
            closer.close();
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

struct StoreInner {
    api: Arc<dyn WorkflowApi>,
    push: Arc<dyn PushConnector>,
    config: SyncConfig,
    machine: Mutex<SyncMachine>,
    tasks: Mutex<SessionTasks>,
    logger: Option<Arc<StructuredLogger>>,
}

impl StoreInner {
    fn machine(&self) -> MutexGuard<'_, SyncMachine> {
        self.machine.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn tasks(&self) -> MutexGuard<'_, SessionTasks> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn apply(&self, command: SyncCommand) -> Vec<SyncEvent> {
        self.machine().apply(command)
    }

    fn current_session(&self) -> Option<String> {
        self.machine().session_id().map(str::to_string)
    }

    fn is_current(&self, session_id: &str) -> bool {
        self.machine().snapshot().is_current(session_id)
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        self.tasks
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .teardown();
    }
}

/// Handle to the store. Clones share state.
#[derive(Clone)]
pub struct WorkflowStore {
    inner: Arc<StoreInner>,
}

impl WorkflowStore {
    pub fn new(
        api: Arc<dyn WorkflowApi>,
        push: Arc<dyn PushConnector>,
        config: SyncConfig,
        logger: Option<Arc<StructuredLogger>>,
    ) -> Self {
        let (machine, _snapshot_rx) = SyncMachine::new(logger.clone());
        Self {
            inner: Arc::new(StoreInner {
                api,
                push,
                config,
                machine: Mutex::new(machine),
                tasks: Mutex::new(SessionTasks::default()),
                logger,
            }),
        }
    }

    /// Starts a new workflow and begins tracking it.
    ///
    /// Returns the server-assigned session id. A blank `requirements` is
    /// rejected before anything is sent or changed.
    pub async fn start_workflow(&self, request: StartRequest) -> Result<String, StoreError> {
        if request.requirements.trim().is_empty() {
            return Err(StoreError::Validation(
                "requirements must not be empty".to_string(),
            ));
        }
        if let Some(previous) = self.inner.current_session() {
            tracing::warn!(
                "Starting a new workflow while session {} is tracked; it keeps running on the server",
                previous
            );
        }

        self.inner.apply(SyncCommand::StartRequested);
        let response = match self.inner.api.start(&request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Workflow start failed: {}", e);
                // Any previously tracked session is dropped, not marked failed.
                self.inner.tasks().teardown();
                self.inner.apply(SyncCommand::Detached);
                self.inner.apply(SyncCommand::StartFailed {
                    message: e.to_string(),
                });
                return Err(e.into());
            }
        };

        let session_id = response.session_id;
        tracing::info!("Workflow session {} started", session_id);
        self.inner.tasks().teardown();
        self.inner.apply(SyncCommand::StartSucceeded {
            session_id: session_id.clone(),
            stage: self.inner.config.first_stage.clone(),
            progress: self.inner.config.start_progress,
        });
        self.begin_tracking(&session_id).await;
        Ok(session_id)
    }

    /// Stops the tracked workflow on the server. Without a session this does nothing.
    pub async fn stop_workflow(&self) -> Result<(), StoreError> {
        let Some(session_id) = self.inner.current_session() else {
            return Ok(());
        };

        match self.inner.api.stop(&session_id).await {
            Ok(_) => {
                tracing::info!("Workflow session {} stopped", session_id);
                self.inner.tasks().teardown();
                self.inner.apply(SyncCommand::Stopped { session_id });
                Ok(())
            }
            Err(e) => Err(self.record_failure(&session_id, e)),
        }
    }

    /// Answers the pending interrupt. Without a session this does nothing.
    pub async fn respond_to_interrupt(
        &self,
        response: impl Into<String>,
        additional_data: Option<Value>,
    ) -> Result<(), StoreError> {
        let Some(session_id) = self.inner.current_session() else {
            return Ok(());
        };

        let request = RespondRequest {
            response: response.into(),
            additional_data,
        };
        match self.inner.api.respond(&session_id, &request).await {
            Ok(_) => {
                self.inner
                    .apply(SyncCommand::InterruptAnswered { session_id });
                Ok(())
            }
            Err(e) => Err(self.record_failure(&session_id, e)),
        }
    }

    /// Fetches the full status of the tracked session. Without a session this
    /// does nothing.
    pub async fn fetch_status(&self) -> Result<(), StoreError> {
        match self.inner.current_session() {
            Some(session_id) => fetch_session(&self.inner, &session_id)
                .await
                .map_err(StoreError::from),
            None => Ok(()),
        }
    }

    /// Clears the pending interrupt locally. The server is not told.
    pub fn dismiss_interrupt(&self) {
        self.inner.apply(SyncCommand::InterruptDismissed);
    }

    /// Tracks an existing server session and fetches its status right away.
    pub async fn attach(&self, session_id: &str) -> Result<(), StoreError> {
        self.inner.tasks().teardown();
        self.inner.apply(SyncCommand::Attached {
            session_id: session_id.to_string(),
        });
        tracing::info!("Attached to workflow session {}", session_id);
        self.begin_tracking(session_id).await;
        fetch_session(&self.inner, session_id)
            .await
            .map_err(StoreError::from)
    }

    /// Stops tracking without telling the server. Returns the session that was tracked.
    pub fn detach(&self) -> Option<String> {
        let session_id = self.inner.current_session();
        self.inner.tasks().teardown();
        self.inner.apply(SyncCommand::Detached);
        session_id
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, StoreError> {
        self.inner.api.list_sessions().await.map_err(|e| {
            self.inner.apply(SyncCommand::RequestFailed {
                session_id: None,
                message: e.to_string(),
            });
            e.into()
        })
    }

    pub async fn health(&self) -> Result<HealthStatus, StoreError> {
        self.inner.api.health().await.map_err(|e| {
            self.inner.apply(SyncCommand::RequestFailed {
                session_id: None,
                message: e.to_string(),
            });
            e.into()
        })
    }

    /// Watch receiver that always holds the latest snapshot.
    pub fn subscribe(&self) -> watch::Receiver<DashboardSnapshot> {
        self.inner.machine().subscribe()
    }

    /// Receiver for state machine events applied after this call.
    pub fn events(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.machine().subscribe_events()
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        self.inner.machine().snapshot().clone()
    }

    fn record_failure(&self, session_id: &str, error: TransportError) -> StoreError {
        tracing::warn!("Request for session {} failed: {}", session_id, error);
        self.inner.apply(SyncCommand::RequestFailed {
            session_id: Some(session_id.to_string()),
            message: error.to_string(),
        });
        error.into()
    }

    /// Spawns the poll loop and opens the push channel for `session_id`.
    async fn begin_tracking(&self, session_id: &str) {
        let poller = spawn_poller(
            Arc::downgrade(&self.inner),
            session_id.to_string(),
            self.inner.config.poll_interval,
        );
        self.inner.tasks().poller = Some(poller);
        self.open_push(session_id).await;
    }

    async fn open_push(&self, session_id: &str) {
        let channel = match self.inner.push.connect(session_id).await {
            Ok(channel) => channel,
            Err(e) => {
                tracing::warn!(
                    "Push channel unavailable for session {}, relying on polling: {}",
                    session_id,
                    e
                );
                return;
            }
        };
        let PushChannel { events, closer } = channel;

        {
            let mut tasks = self.inner.tasks();
            if !self.inner.is_current(session_id) {
                // Superseded while connecting; dropping the closer shuts it down.
                return;
            }
            if let Some(mut previous) = tasks.closer.replace(closer) {
                previous.close();
            }
            self.inner.apply(SyncCommand::PushConnectivity {
                session_id: session_id.to_string(),
                connected: true,
            });
            let pump = spawn_pump(
                Arc::downgrade(&self.inner),
                session_id.to_string(),
                events,
            );
            if let Some(previous) = tasks.pump.replace(pump) {
                previous.abort();
            }
        }

        if let Some(logger) = &self.inner.logger {
            logger.log_channel(session_id, "connected");
        }
    }
}

async fn fetch_session(inner: &StoreInner, session_id: &str) -> Result<(), TransportError> {
    match inner.api.status(session_id).await {
        Ok(snapshot) => {
            inner.apply(SyncCommand::SnapshotFetched {
                session_id: session_id.to_string(),
                snapshot,
            });
            Ok(())
        }
        Err(e) => {
            inner.apply(SyncCommand::RequestFailed {
                session_id: Some(session_id.to_string()),
                message: e.to_string(),
            });
            Err(e)
        }
    }
}

/// Polls while `session_id` is tracked and not in a terminal status.
fn spawn_poller(inner: Weak<StoreInner>, session_id: String, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            {
                let machine = inner.machine();
                let snapshot = machine.snapshot();
                if !snapshot.is_current(&session_id) || snapshot.status.is_terminal() {
                    break;
                }
            }
            if let Err(e) = fetch_session(&inner, &session_id).await {
                tracing::debug!("Poll for session {} failed, retrying: {}", session_id, e);
            }
        }
        tracing::debug!("Poll loop for session {} ended", session_id);
    })
}

/// Feeds push events for `session_id` into the state machine until the channel closes.
fn spawn_pump(
    inner: Weak<StoreInner>,
    session_id: String,
    mut events: mpsc::UnboundedReceiver<PushEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let Some(inner) = inner.upgrade() else {
                break;
            };
            match event {
                PushEvent::Message(message) => {
                    inner.apply(SyncCommand::PushReceived {
                        session_id: session_id.clone(),
                        message,
                    });
                }
                PushEvent::Closed { reason } => {
                    tracing::info!(
                        "Push channel for session {} closed: {}",
                        session_id,
                        reason.as_deref().unwrap_or("no reason given")
                    );
                    inner.apply(SyncCommand::PushConnectivity {
                        session_id: session_id.clone(),
                        connected: false,
                    });
                    if let Some(logger) = &inner.logger {
                        logger.log_channel(&session_id, "closed");
                    }
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
