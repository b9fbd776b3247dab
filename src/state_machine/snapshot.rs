//! Read-only snapshot of dashboard state for rendering.
//!
//! Renderers NEVER mutate this; they receive new snapshots via watch channel.

use crate::api::{
    PendingInterrupt, ReviewItem, StatusSnapshot, TestSuite, UserStory, WorkflowStatus,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Stage shown before any session starts and after a stop.
pub const INITIAL_STAGE: &str = "requirements";

/// Generated artifacts of the current session.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Artifacts {
    pub user_stories: Vec<UserStory>,
    pub design_docs: Map<String, Value>,
    pub code_files: BTreeMap<String, String>,
    pub test_cases: BTreeMap<String, TestSuite>,
    pub review_history: Vec<ReviewItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ArtifactCounts {
    pub user_stories: usize,
    pub design_docs: usize,
    pub code_files: usize,
    pub test_cases: usize,
    pub reviews: usize,
}

impl Artifacts {
    pub fn counts(&self) -> ArtifactCounts {
        ArtifactCounts {
            user_stories: self.user_stories.len(),
            design_docs: self.design_docs.len(),
            code_files: self.code_files.len(),
            test_cases: self.test_cases.values().map(TestSuite::case_count).sum(),
            reviews: self.review_history.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.counts() == ArtifactCounts::default()
    }
}

impl From<&StatusSnapshot> for Artifacts {
    fn from(snapshot: &StatusSnapshot) -> Self {
        Self {
            user_stories: snapshot.user_stories.clone(),
            design_docs: snapshot.design_docs.clone(),
            code_files: snapshot.code_files.clone(),
            test_cases: snapshot.test_cases.clone(),
            review_history: snapshot.review_history.clone(),
        }
    }
}

/// Everything a renderer needs about the tracked session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    /// Tracked session, if any
    pub session_id: Option<String>,
    pub status: WorkflowStatus,
    pub current_stage: String,
    /// Stored exactly as received
    pub progress: f64,
    pub artifacts: Artifacts,
    pub pending_interrupt: Option<PendingInterrupt>,
    /// Message of the last failure
    pub error: Option<String>,
    /// Whether the push channel is open
    pub connected: bool,
    /// Sequence number of the last applied state change
    pub revision: u64,
}

impl Default for DashboardSnapshot {
    fn default() -> Self {
        Self {
            session_id: None,
            status: WorkflowStatus::Idle,
            current_stage: INITIAL_STAGE.to_string(),
            progress: 0.0,
            artifacts: Artifacts::default(),
            pending_interrupt: None,
            error: None,
            connected: false,
            revision: 0,
        }
    }
}

impl DashboardSnapshot {
    pub fn has_session(&self) -> bool {
        self.session_id.is_some()
    }

    /// True when `session_id` is the tracked session.
    pub fn is_current(&self, session_id: &str) -> bool {
        self.session_id.as_deref() == Some(session_id)
    }
}
