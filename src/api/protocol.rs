//! Request and response records for the workflow REST API.
//!
//! These mirror the server's JSON bodies field for field. Artifact payloads are
//! produced by LLM-backed workflow nodes, so decoding is deliberately tolerant:
//! every field has a default and unknown keys are kept rather than rejected.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Workflow lifecycle status as reported by the server.
///
/// Values the client does not know are mirrored verbatim through `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Idle,
    Starting,
    /// Server-side value between session creation and the first workflow step.
    Started,
    Running,
    WaitingForInput,
    Completed,
    Error,
    #[serde(untagged)]
    Other(String),
}

impl WorkflowStatus {
    /// Terminal statuses stop the poll loop.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowStatus::Completed | WorkflowStatus::Error)
    }

    pub fn as_str(&self) -> &str {
        match self {
            WorkflowStatus::Idle => "idle",
            WorkflowStatus::Starting => "starting",
            WorkflowStatus::Started => "started",
            WorkflowStatus::Running => "running",
            WorkflowStatus::WaitingForInput => "waiting_for_input",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Error => "error",
            WorkflowStatus::Other(value) => value,
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Body of `POST /workflow/start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartRequest {
    pub requirements: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stakeholders: Option<Vec<String>>,
}

impl StartRequest {
    pub fn new(requirements: impl Into<String>) -> Self {
        Self {
            requirements: requirements.into(),
            project_name: None,
            stakeholders: None,
        }
    }

    pub fn with_project_name(mut self, name: impl Into<String>) -> Self {
        self.project_name = Some(name.into());
        self
    }

    /// An empty list is sent as "no stakeholders" so the server applies its defaults.
    pub fn with_stakeholders(mut self, stakeholders: Vec<String>) -> Self {
        self.stakeholders = if stakeholders.is_empty() {
            None
        } else {
            Some(stakeholders)
        };
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartResponse {
    pub session_id: String,
    pub status: WorkflowStatus,
}

/// Body of `POST /workflow/{id}/respond`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RespondRequest {
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<Value>,
}

/// Acknowledgement returned by respond and stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub status: String,
}

/// Response of the health endpoint (`GET /`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub message: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// One row of `GET /workflow/sessions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub status: WorkflowStatus,
    #[serde(default)]
    pub current_stage: String,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// A human-input request raised by the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingInterrupt {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub stage: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserStory {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub story_points: Option<f64>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub persona: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub definition_of_done: Vec<String>,
    #[serde(default)]
    pub business_value: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// One entry of the review history.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReviewItem {
    #[serde(default)]
    pub iteration: u32,
    #[serde(default)]
    pub stage: String,
    #[serde(default)]
    pub reviewer: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub review_method: Option<String>,
    #[serde(default)]
    pub business_value_score: Option<f64>,
    #[serde(default)]
    pub completeness_score: Option<f64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ReviewItem {
    /// All numeric `*_score` fields, named ones first.
    pub fn scores(&self) -> Vec<(String, f64)> {
        let mut scores = Vec::new();
        if let Some(score) = self.business_value_score {
            scores.push(("business_value_score".to_string(), score));
        }
        if let Some(score) = self.completeness_score {
            scores.push(("completeness_score".to_string(), score));
        }
        for (key, value) in &self.extra {
            if key.ends_with("_score") {
                if let Some(score) = value.as_f64() {
                    scores.push((key.clone(), score));
                }
            }
        }
        scores
    }
}

/// A test suite is either a list of structured cases or generated test source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TestSuite {
    Cases(Vec<Value>),
    Source(String),
    Other(Value),
}

impl TestSuite {
    /// Number of cases, or 1 for a source file.
    pub fn case_count(&self) -> usize {
        match self {
            TestSuite::Cases(cases) => cases.len(),
            TestSuite::Source(_) | TestSuite::Other(_) => 1,
        }
    }
}

/// Full status document from `GET /workflow/{id}/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub session_id: String,
    pub status: WorkflowStatus,
    #[serde(default)]
    pub current_stage: String,
    #[serde(default)]
    pub progress: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_stories: Vec<UserStory>,
    #[serde(default, deserialize_with = "lenient_map")]
    pub design_docs: Map<String, Value>,
    #[serde(default, deserialize_with = "lenient_map")]
    pub code_files: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "lenient_map")]
    pub test_cases: BTreeMap<String, TestSuite>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub review_history: Vec<ReviewItem>,
    #[serde(default)]
    pub pending_interrupt: Option<PendingInterrupt>,
    #[serde(default)]
    pub error_message: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts a map, `null`, or an empty list (the server seeds some maps as `[]`).
fn lenient_map<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(T::default()),
        Value::Array(items) if items.is_empty() => Ok(T::default()),
        other => serde_json::from_value(other).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
