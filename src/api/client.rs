//! Request/response client for the workflow REST API.

use super::error::TransportError;
use super::protocol::{
    Ack, HealthStatus, RespondRequest, SessionSummary, StartRequest, StartResponse,
    StatusSnapshot,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Request/response surface of the workflow API.
///
/// The store only talks to the server through this trait so tests can script
/// responses without a network.
#[async_trait]
pub trait WorkflowApi: Send + Sync {
    async fn start(&self, request: &StartRequest) -> Result<StartResponse, TransportError>;

    async fn status(&self, session_id: &str) -> Result<StatusSnapshot, TransportError>;

    async fn respond(
        &self,
        session_id: &str,
        request: &RespondRequest,
    ) -> Result<Ack, TransportError>;

    async fn stop(&self, session_id: &str) -> Result<Ack, TransportError>;

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, TransportError>;

    async fn health(&self) -> Result<HealthStatus, TransportError>;
}

#[derive(Debug, Clone, Copy)]
enum Method {
    Get,
    Post,
    Delete,
}

/// ureq-backed implementation. Calls run on the blocking pool.
#[derive(Clone)]
pub struct HttpWorkflowApi {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpWorkflowApi {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn execute<T>(
        &self,
        method: Method,
        path: String,
        body: Option<String>,
    ) -> Result<T, TransportError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let agent = self.agent.clone();
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("{:?} {}", method, url);
        tokio::task::spawn_blocking(move || blocking_request(&agent, method, &url, body))
            .await
            .map_err(|e| TransportError::Network {
                message: format!("request task failed: {}", e),
            })?
    }
}

fn blocking_request<T: DeserializeOwned>(
    agent: &ureq::Agent,
    method: Method,
    url: &str,
    body: Option<String>,
) -> Result<T, TransportError> {
    let result = match method {
        Method::Get => agent.get(url).call(),
        Method::Delete => agent.delete(url).call(),
        Method::Post => agent
            .post(url)
            .header("Content-Type", "application/json")
            .send(body.as_deref().unwrap_or("{}")),
    };
    let mut response = result.map_err(TransportError::from_ureq)?;
    let status = response.status().as_u16();
    let text = response
        .body_mut()
        .read_to_string()
        .map_err(TransportError::from_ureq)?;

    if !(200..300).contains(&status) {
        return Err(TransportError::from_status(status, &text));
    }
    serde_json::from_str(&text).map_err(TransportError::decode)
}

fn encode(body: &impl serde::Serialize) -> Result<String, TransportError> {
    serde_json::to_string(body).map_err(TransportError::decode)
}

#[async_trait]
impl WorkflowApi for HttpWorkflowApi {
    async fn start(&self, request: &StartRequest) -> Result<StartResponse, TransportError> {
        let body = encode(request)?;
        self.execute(Method::Post, "/workflow/start".to_string(), Some(body))
            .await
    }

    async fn status(&self, session_id: &str) -> Result<StatusSnapshot, TransportError> {
        self.execute(Method::Get, format!("/workflow/{}/status", session_id), None)
            .await
    }

    async fn respond(
        &self,
        session_id: &str,
        request: &RespondRequest,
    ) -> Result<Ack, TransportError> {
        let body = encode(request)?;
        self.execute(
            Method::Post,
            format!("/workflow/{}/respond", session_id),
            Some(body),
        )
        .await
    }

    async fn stop(&self, session_id: &str) -> Result<Ack, TransportError> {
        self.execute(Method::Delete, format!("/workflow/{}", session_id), None)
            .await
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, TransportError> {
        self.execute(Method::Get, "/workflow/sessions".to_string(), None)
            .await
    }

    async fn health(&self) -> Result<HealthStatus, TransportError> {
        self.execute(Method::Get, "/".to_string(), None).await
    }
}

#[cfg(test)]
#[path = "tests/client_tests.rs"]
mod tests;
