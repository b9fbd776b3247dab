//! Scripted transport fakes shared by store and follow-loop tests.

use super::*;
use crate::api::protocol::{Ack, StartResponse};
use crate::api::{StatusSnapshot, WorkflowStatus};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::oneshot;

#[derive(Default)]
pub(crate) struct FakeApi {
    pub(crate) calls: Mutex<Vec<String>>,
    pub(crate) start_results: Mutex<VecDeque<Result<StartResponse, TransportError>>>,
    pub(crate) status_results: Mutex<VecDeque<Result<StatusSnapshot, TransportError>>>,
    pub(crate) respond_error: Mutex<Option<TransportError>>,
    pub(crate) stop_error: Mutex<Option<TransportError>>,
}

impl FakeApi {
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    pub(crate) fn queue_start(&self, session_id: &str) {
        self.start_results.lock().unwrap().push_back(Ok(StartResponse {
            session_id: session_id.to_string(),
            status: WorkflowStatus::Started,
        }));
    }

    pub(crate) fn queue_status(&self, result: Result<StatusSnapshot, TransportError>) {
        self.status_results.lock().unwrap().push_back(result);
    }
}

pub(crate) fn status_doc(session_id: &str, status: &str, stage: &str, progress: f64) -> StatusSnapshot {
    serde_json::from_value(serde_json::json!({
        "session_id": session_id,
        "status": status,
        "current_stage": stage,
        "progress": progress
    }))
    .unwrap()
}

#[async_trait]
impl WorkflowApi for FakeApi {
    async fn start(&self, request: &StartRequest) -> Result<StartResponse, TransportError> {
        self.record(format!("start:{}", request.requirements));
        self.start_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(TransportError::Network {
                    message: "no start scripted".to_string(),
                })
            })
    }

    async fn status(&self, session_id: &str) -> Result<StatusSnapshot, TransportError> {
        self.record(format!("status:{}", session_id));
        self.status_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(status_doc(session_id, "running", "user_stories", 0.1)))
    }

    async fn respond(
        &self,
        session_id: &str,
        request: &RespondRequest,
    ) -> Result<Ack, TransportError> {
        self.record(format!("respond:{}:{}", session_id, request.response));
        match self.respond_error.lock().unwrap().take() {
            Some(e) => Err(e),
            None => Ok(Ack {
                status: "response_received".to_string(),
            }),
        }
    }

    async fn stop(&self, session_id: &str) -> Result<Ack, TransportError> {
        self.record(format!("stop:{}", session_id));
        match self.stop_error.lock().unwrap().take() {
            Some(e) => Err(e),
            None => Ok(Ack {
                status: "stopped".to_string(),
            }),
        }
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, TransportError> {
        self.record("list".to_string());
        Ok(vec![])
    }

    async fn health(&self) -> Result<HealthStatus, TransportError> {
        self.record("health".to_string());
        Err(TransportError::Timeout)
    }
}

pub(crate) struct FakeLink {
    pub(crate) session_id: String,
    pub(crate) events: mpsc::UnboundedSender<PushEvent>,
    pub(crate) shutdown: oneshot::Receiver<()>,
}

#[derive(Default)]
pub(crate) struct FakeConnector {
    pub(crate) fail: AtomicBool,
    pub(crate) links: Mutex<Vec<FakeLink>>,
}

impl FakeConnector {
    pub(crate) fn send(&self, index: usize, event: PushEvent) {
        let links = self.links.lock().unwrap();
        let _ = links[index].events.send(event);
    }

    pub(crate) fn is_shut_down(&self, index: usize) -> bool {
        let mut links = self.links.lock().unwrap();
        matches!(
            links[index].shutdown.try_recv(),
            Ok(()) | Err(oneshot::error::TryRecvError::Closed)
        )
    }

    pub(crate) fn sessions(&self) -> Vec<String> {
        self.links
            .lock()
            .unwrap()
            .iter()
            .map(|link| link.session_id.clone())
            .collect()
    }
}

#[async_trait]
impl PushConnector for FakeConnector {
    async fn connect(&self, session_id: &str) -> Result<PushChannel, TransportError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::Network {
                message: "connection refused".to_string(),
            });
        }
        let (channel, events, shutdown) = PushChannel::pair();
        self.links.lock().unwrap().push(FakeLink {
            session_id: session_id.to_string(),
            events,
            shutdown,
        });
        Ok(channel)
    }
}

pub(crate) fn create_store() -> (WorkflowStore, Arc<FakeApi>, Arc<FakeConnector>) {
    let api = Arc::new(FakeApi::default());
    let push = Arc::new(FakeConnector::default());
    let store = WorkflowStore::new(api.clone(), push.clone(), SyncConfig::default(), None);
    (store, api, push)
}

pub(crate) async fn start(store: &WorkflowStore, api: &FakeApi, session_id: &str) {
    api.queue_start(session_id);
    let started = store
        .start_workflow(StartRequest::new("Build a CRM"))
        .await
        .unwrap();
    assert_eq!(started, session_id);
}
