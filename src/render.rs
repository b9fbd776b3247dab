//! Plain-text rendering of dashboard state for the terminal.

use crate::api::{PendingInterrupt, SessionSummary, WorkflowStatus};
use crate::state_machine::DashboardSnapshot;
use std::fmt::Write;

/// Progress as a whole percentage. Display only; stored progress is untouched.
pub fn percent(progress: f64) -> String {
    format!("{:.0}%", progress * 100.0)
}

/// One-line status, e.g. `[abc123] running | design | 45%`.
pub fn status_line(snapshot: &DashboardSnapshot) -> String {
    let session = snapshot.session_id.as_deref().unwrap_or("no session");
    let mut line = format!(
        "[{}] {} | {} | {}",
        session,
        snapshot.status,
        snapshot.current_stage,
        percent(snapshot.progress)
    );
    if snapshot.has_session() && !snapshot.connected && !snapshot.status.is_terminal() {
        line.push_str(" | polling");
    }
    if let Some(error) = &snapshot.error {
        let _ = write!(line, " | error: {}", error);
    }
    line
}

/// Printed when the push channel opens or drops.
pub fn connectivity_notice(connected: bool) -> &'static str {
    if connected {
        "[push] Live updates connected"
    } else {
        "[push] Live updates lost; falling back to polling"
    }
}

/// Fields that warrant a new status line when they change.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusKey {
    status: WorkflowStatus,
    stage: String,
    percent: String,
    error: Option<String>,
}

pub fn status_key(snapshot: &DashboardSnapshot) -> StatusKey {
    StatusKey {
        status: snapshot.status.clone(),
        stage: snapshot.current_stage.clone(),
        percent: percent(snapshot.progress),
        error: snapshot.error.clone(),
    }
}

pub fn interrupt_prompt(interrupt: &PendingInterrupt) -> String {
    let mut out = String::new();
    let stage = if interrupt.stage.is_empty() {
        String::new()
    } else {
        format!(" at {}", interrupt.stage)
    };
    let _ = writeln!(out, "\n=== INPUT REQUIRED ({}{}) ===", interrupt.kind, stage);
    if !interrupt.message.is_empty() {
        let _ = writeln!(out, "{}", interrupt.message);
    }
    if !interrupt.options.is_empty() {
        let _ = writeln!(out, "Options: {}", interrupt.options.join(", "));
    }
    out.push_str("Type a response, or /dismiss, /stop, /status");
    out
}

/// Artifact overview, printed when a workflow ends and by `status`.
pub fn summary(snapshot: &DashboardSnapshot) -> String {
    let mut out = String::new();
    match &snapshot.status {
        WorkflowStatus::Completed => out.push_str("[workflow] Completed\n"),
        WorkflowStatus::Error => {
            let _ = writeln!(
                out,
                "[workflow] Failed: {}",
                snapshot.error.as_deref().unwrap_or("unknown error")
            );
        }
        other => {
            let _ = writeln!(out, "[workflow] {} at {}", other, snapshot.current_stage);
        }
    }

    let artifacts = &snapshot.artifacts;
    if artifacts.is_empty() {
        out.push_str("No artifacts yet.");
        return out;
    }
    let counts = artifacts.counts();
    let _ = writeln!(out, "User stories:     {}", counts.user_stories);
    for story in &artifacts.user_stories {
        let points = story
            .story_points
            .map(|p| format!(" ({} pts)", p))
            .unwrap_or_default();
        let _ = writeln!(out, "  - {} {}{}", story.id, story.title, points);
    }
    let _ = writeln!(out, "Design documents: {}", counts.design_docs);
    let _ = writeln!(out, "Code files:       {}", counts.code_files);
    for name in artifacts.code_files.keys() {
        let _ = writeln!(out, "  - {}", name);
    }
    let _ = writeln!(out, "Test cases:       {}", counts.test_cases);
    let _ = write!(out, "Reviews:          {}", counts.reviews);
    if let Some(review) = artifacts.review_history.last() {
        let _ = write!(
            out,
            "\n  latest: {} by {} at iteration {}",
            review.status, review.reviewer, review.iteration
        );
        for (name, score) in review.scores() {
            let _ = write!(out, "\n    {}: {}", name, score);
        }
    }
    out
}

pub fn session_table(sessions: &[SessionSummary]) -> String {
    if sessions.is_empty() {
        return "No workflow sessions.".to_string();
    }
    let id_width = sessions
        .iter()
        .map(|s| s.session_id.chars().count())
        .max()
        .unwrap_or(0)
        .max("SESSION".len());
    let mut out = format!(
        "{:<id_width$}  {:<18}  {:<14}  {:>8}  CREATED",
        "SESSION",
        "STATUS",
        "STAGE",
        "PROGRESS",
        id_width = id_width
    );
    for session in sessions {
        let _ = write!(
            out,
            "\n{:<id_width$}  {:<18}  {:<14}  {:>8}  {}",
            session.session_id,
            session.status.as_str(),
            session.current_stage,
            percent(session.progress),
            session.created_at.as_deref().unwrap_or("-"),
            id_width = id_width
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ReviewItem, UserStory};

    fn running_snapshot() -> DashboardSnapshot {
        DashboardSnapshot {
            session_id: Some("abc123".to_string()),
            status: WorkflowStatus::Running,
            current_stage: "design".to_string(),
            progress: 0.45,
            connected: true,
            ..DashboardSnapshot::default()
        }
    }

    #[test]
    fn test_status_line() {
        assert_eq!(
            status_line(&running_snapshot()),
            "[abc123] running | design | 45%"
        );
    }

    #[test]
    fn test_status_line_marks_polling_and_error() {
        let snapshot = DashboardSnapshot {
            connected: false,
            error: Some("request timed out".to_string()),
            ..running_snapshot()
        };
        assert_eq!(
            status_line(&snapshot),
            "[abc123] running | design | 45% | polling | error: request timed out"
        );
    }

    #[test]
    fn test_status_key_ignores_sub_percent_changes() {
        let a = running_snapshot();
        let b = DashboardSnapshot {
            progress: 0.4501,
            revision: 9,
            ..running_snapshot()
        };
        assert_eq!(status_key(&a), status_key(&b));
    }

    #[test]
    fn test_summary_without_artifacts() {
        let snapshot = DashboardSnapshot {
            status: WorkflowStatus::Completed,
            ..running_snapshot()
        };
        assert_eq!(summary(&snapshot), "[workflow] Completed\nNo artifacts yet.");
    }

    #[test]
    fn test_interrupt_prompt() {
        let prompt = interrupt_prompt(&PendingInterrupt {
            kind: "approval".to_string(),
            stage: "po_review".to_string(),
            message: "Approve the user stories?".to_string(),
            options: vec!["approve".to_string(), "reject".to_string()],
            timestamp: None,
        });
        assert!(prompt.contains("=== INPUT REQUIRED (approval at po_review) ==="));
        assert!(prompt.contains("Approve the user stories?"));
        assert!(prompt.contains("Options: approve, reject"));
    }

    #[test]
    fn test_summary_lists_artifacts() {
        let mut snapshot = DashboardSnapshot {
            status: WorkflowStatus::Completed,
            progress: 1.0,
            ..running_snapshot()
        };
        snapshot.artifacts.user_stories.push(UserStory {
            id: "US-1".to_string(),
            title: "Track leads".to_string(),
            story_points: Some(3.0),
            ..UserStory::default()
        });
        snapshot
            .artifacts
            .code_files
            .insert("app.py".to_string(), "print()".to_string());
        snapshot.artifacts.review_history.push(ReviewItem {
            iteration: 2,
            reviewer: "product_owner".to_string(),
            status: "approved".to_string(),
            business_value_score: Some(8.5),
            ..ReviewItem::default()
        });

        let text = summary(&snapshot);

        assert!(text.starts_with("[workflow] Completed"));
        assert!(text.contains("  - US-1 Track leads (3 pts)"));
        assert!(text.contains("  - app.py"));
        assert!(text.contains("latest: approved by product_owner at iteration 2"));
        assert!(text.contains("business_value_score: 8.5"));
    }

    #[test]
    fn test_summary_for_failure() {
        let snapshot = DashboardSnapshot {
            status: WorkflowStatus::Error,
            error: Some("Workflow failed: boom".to_string()),
            ..running_snapshot()
        };
        assert!(summary(&snapshot).starts_with("[workflow] Failed: Workflow failed: boom"));
    }

    #[test]
    fn test_session_table() {
        assert_eq!(session_table(&[]), "No workflow sessions.");

        let table = session_table(&[SessionSummary {
            session_id: "abc123".to_string(),
            status: WorkflowStatus::WaitingForInput,
            current_stage: "po_review".to_string(),
            progress: 0.2857,
            created_at: Some("2026-01-01T10:00:00".to_string()),
        }]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("SESSION"));
        assert!(lines[1].contains("waiting_for_input"));
        assert!(lines[1].contains("29%"));
        assert!(lines[1].ends_with("2026-01-01T10:00:00"));
    }
}
