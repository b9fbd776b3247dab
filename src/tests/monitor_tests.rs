//! Tests for follow mode, driven through the scripted store fakes.

use super::*;
use crate::api::{PushEvent, PushMessage, WorkflowStatus};
use crate::store::testing::{create_store, start};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

fn approval() -> PendingInterrupt {
    PendingInterrupt {
        kind: "approval".to_string(),
        stage: "po_review".to_string(),
        message: "Approve the user stories?".to_string(),
        options: vec!["approve".to_string(), "reject".to_string()],
        timestamp: None,
    }
}

fn text(out: &[u8]) -> String {
    String::from_utf8_lossy(out).to_string()
}

#[test]
fn test_parse_input() {
    assert_eq!(parse_input("   "), None);
    assert_eq!(parse_input("/dismiss"), Some(InputCommand::Dismiss));
    assert_eq!(parse_input(" /stop \n"), Some(InputCommand::Stop));
    assert_eq!(parse_input("/status"), Some(InputCommand::Status));
    assert_eq!(
        parse_input("/retry"),
        Some(InputCommand::Unknown("/retry".to_string()))
    );
    assert_eq!(
        parse_input("approve with notes\n"),
        Some(InputCommand::Answer("approve with notes".to_string()))
    );
}

#[tokio::test(start_paused = true)]
async fn test_follow_until_completed() {
    let (store, api, push) = create_store();
    start(&store, &api, "abc123").await;
    let mut out = Vec::new();

    let (outcome, ()) = tokio::join!(
        follow(&store, tokio::io::empty(), &mut out, std::future::pending()),
        async {
            settle().await;
            push.send(
                0,
                PushEvent::Message(PushMessage::ProgressUpdate {
                    session_id: None,
                    current_stage: "design".to_string(),
                    progress: 0.45,
                }),
            );
            settle().await;
            push.send(
                0,
                PushEvent::Message(PushMessage::WorkflowCompleted { session_id: None }),
            );
        }
    );

    match outcome.unwrap() {
        FollowOutcome::Finished(snapshot) => {
            assert_eq!(snapshot.status, WorkflowStatus::Completed)
        }
        other => panic!("Expected Finished, got {:?}", other),
    }
    let output = text(&out);
    assert!(output.contains("[abc123] running | user_stories | 10%"));
    assert!(output.contains("[abc123] running | design | 45%"));
    assert!(output.contains("[abc123] completed | design | 100%"));
    assert!(output.contains("[workflow] Completed"));
}

#[tokio::test(start_paused = true)]
async fn test_answers_interrupt_from_input() {
    let (store, api, push) = create_store();
    start(&store, &api, "abc123").await;
    let (mut keyboard, stdin) = tokio::io::duplex(256);
    let mut out = Vec::new();

    let (outcome, ()) = tokio::join!(
        follow(&store, BufReader::new(stdin), &mut out, std::future::pending()),
        async {
            settle().await;
            push.send(
                0,
                PushEvent::Message(PushMessage::InterruptRequired {
                    session_id: None,
                    interrupt: approval(),
                }),
            );
            settle().await;
            keyboard.write_all(b"approve\n").await.unwrap();
            settle().await;
            push.send(
                0,
                PushEvent::Message(PushMessage::WorkflowCompleted { session_id: None }),
            );
        }
    );

    assert!(matches!(outcome.unwrap(), FollowOutcome::Finished(_)));
    assert_eq!(api.count("respond:abc123:approve"), 1);
    let output = text(&out);
    assert_eq!(output.matches("=== INPUT REQUIRED").count(), 1);
    assert!(output.contains("[interrupt] Response sent"));
    assert!(output.contains("[abc123] waiting_for_input | user_stories | 10%"));
}

#[tokio::test(start_paused = true)]
async fn test_answer_without_interrupt_is_not_sent() {
    let (store, api, push) = create_store();
    start(&store, &api, "abc123").await;
    let (mut keyboard, stdin) = tokio::io::duplex(256);
    let mut out = Vec::new();

    let (outcome, ()) = tokio::join!(
        follow(&store, BufReader::new(stdin), &mut out, std::future::pending()),
        async {
            settle().await;
            keyboard.write_all(b"approve\n/bogus\n").await.unwrap();
            settle().await;
            push.send(
                0,
                PushEvent::Message(PushMessage::WorkflowCompleted { session_id: None }),
            );
        }
    );

    assert!(outcome.is_ok());
    assert_eq!(api.count("respond:abc123:approve"), 0);
    let output = text(&out);
    assert!(output.contains("[interrupt] Nothing to answer right now"));
    assert!(output.contains("[error] Unknown command /bogus"));
}

#[tokio::test(start_paused = true)]
async fn test_dismiss_command_is_local() {
    let (store, api, push) = create_store();
    start(&store, &api, "abc123").await;
    let (mut keyboard, stdin) = tokio::io::duplex(256);
    let mut out = Vec::new();

    let (outcome, ()) = tokio::join!(
        follow(&store, BufReader::new(stdin), &mut out, std::future::pending()),
        async {
            settle().await;
            push.send(
                0,
                PushEvent::Message(PushMessage::InterruptRequired {
                    session_id: None,
                    interrupt: approval(),
                }),
            );
            settle().await;
            keyboard.write_all(b"/dismiss\n").await.unwrap();
            settle().await;
            assert!(store.snapshot().pending_interrupt.is_none());
            push.send(
                0,
                PushEvent::Message(PushMessage::WorkflowError {
                    session_id: None,
                    error: "Workflow failed: reviewer crashed".to_string(),
                }),
            );
        }
    );

    match outcome.unwrap() {
        FollowOutcome::Finished(snapshot) => {
            assert_eq!(snapshot.status, WorkflowStatus::Error)
        }
        other => panic!("Expected Finished, got {:?}", other),
    }
    assert!(api.calls().iter().all(|c| !c.starts_with("respond")));
    let output = text(&out);
    assert!(output.contains("[interrupt] Dismissed locally"));
    assert!(output.contains("[workflow] Failed: Workflow failed: reviewer crashed"));
}

#[tokio::test(start_paused = true)]
async fn test_reports_lost_push_channel() {
    let (store, api, push) = create_store();
    start(&store, &api, "abc123").await;
    let mut out = Vec::new();

    let outcome = follow(&store, tokio::io::empty(), &mut out, async {
        settle().await;
        push.send(0, PushEvent::Closed { reason: None });
        tokio::time::sleep(Duration::from_millis(100)).await;
    })
    .await
    .unwrap();

    assert_eq!(outcome, FollowOutcome::Detached(Some("abc123".to_string())));
    let output = text(&out);
    assert!(output.contains("[push] Live updates lost; falling back to polling"));
}

#[tokio::test(start_paused = true)]
async fn test_stop_command_ends_follow() {
    let (store, api, _push) = create_store();
    start(&store, &api, "abc123").await;
    let mut out = Vec::new();

    let outcome = follow(
        &store,
        BufReader::new(&b"/stop\n"[..]),
        &mut out,
        std::future::pending(),
    )
    .await
    .unwrap();

    assert_eq!(outcome, FollowOutcome::Stopped);
    assert_eq!(api.count("stop:abc123"), 1);
    assert!(text(&out).contains("[workflow] Stopped"));
}

#[tokio::test(start_paused = true)]
async fn test_status_command_fetches() {
    let (store, api, _push) = create_store();
    start(&store, &api, "abc123").await;
    let mut out = Vec::new();

    let outcome = follow(
        &store,
        BufReader::new(&b"/status\n"[..]),
        &mut out,
        tokio::time::sleep(Duration::from_millis(100)),
    )
    .await
    .unwrap();

    assert_eq!(outcome, FollowOutcome::Detached(Some("abc123".to_string())));
    assert_eq!(api.count("status:abc123"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_detaches_without_stopping() {
    let (store, api, push) = create_store();
    start(&store, &api, "abc123").await;
    let mut out = Vec::new();

    let outcome = follow(
        &store,
        tokio::io::empty(),
        &mut out,
        tokio::time::sleep(Duration::from_secs(5)),
    )
    .await
    .unwrap();

    assert_eq!(outcome, FollowOutcome::Detached(Some("abc123".to_string())));
    assert_eq!(api.count("stop:abc123"), 0);
    assert!(push.is_shut_down(0));
    assert!(store.snapshot().session_id.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_already_finished_session_returns_immediately() {
    let (store, api, push) = create_store();
    start(&store, &api, "abc123").await;
    push.send(
        0,
        PushEvent::Message(PushMessage::WorkflowCompleted { session_id: None }),
    );
    settle().await;
    let mut out = Vec::new();

    let outcome = follow(&store, tokio::io::empty(), &mut out, std::future::pending())
        .await
        .unwrap();

    assert!(matches!(outcome, FollowOutcome::Finished(_)));
    assert!(text(&out).contains("[workflow] Completed"));
}
