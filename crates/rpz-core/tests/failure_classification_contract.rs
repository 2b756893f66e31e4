//! Architectural Contract Test: Failure Classification
//!
//! This test verifies that every failed sync task reports a typed cause and
//! that a failure ends the task without retries or partial side effects.
//!
//! Constraints verified:
//! - Fetch errors are classified as fetch and leave the zone file untouched
//! - Nameserver timeouts and non-zero exits keep their kind
//! - A failed load skips ALSO-NOTIFY and NOTIFY
//! - Nothing is retried inside a task
//!
//! If this test fails, someone has:
//! - Collapsed failure causes into strings
//! - Added retry loops to the sync task
//! - Started writing feed content before the download completed

mod common;

use common::*;
use rpz_core::error::{FailureKind, ServerSyncError};
use rpz_core::sync::{SyncOptions, SyncPhase, SyncRunner, SyncStatus};
use rpz_core::zone::{Action, Rule};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn notify_everything() -> SyncOptions {
    SyncOptions {
        dry_run: false,
        also_notify: vec!["192.0.2.10".to_string()],
        notify: true,
    }
}

#[tokio::test]
async fn fetch_failure_leaves_previous_zone_file() {
    let dir = tempdir().unwrap();
    let zone = remote_zone(dir.path(), "feed", "0 * * * *", true);
    std::fs::write(&zone.file_path, "previous content\n").unwrap();

    let feed = MockFeedSource::failing();
    let probe = MockFeedSource::sharing_counters_with(&feed);
    let server = RecordingServer::new();
    let runner = SyncRunner::new(Arc::new(feed), Arc::new(server.clone()), notify_everything());

    let outcome = runner.run(&zone).await;

    assert_eq!(outcome.status, SyncStatus::Failed);
    assert_eq!(outcome.failure_kind(), Some(FailureKind::Fetch));
    assert_eq!(outcome.failure.as_ref().unwrap().phase, SyncPhase::Building);
    assert_eq!(probe.fetch_call_count(), 1, "fetch must not be retried");
    assert_eq!(server.call_count(), 0);
    assert_eq!(
        std::fs::read_to_string(&zone.file_path).unwrap(),
        "previous content\n"
    );
}

#[tokio::test]
async fn load_timeout_is_reported_as_timeout() {
    let dir = tempdir().unwrap();
    let zone = static_zone(dir.path(), "rpz", 30, vec![Rule::new("a.example", Action::Drop)]);
    let server = RecordingServer::new().failing_load(ServerSyncError::Timeout {
        command: format!("pdnsutil zone load rpz {}", zone.file_path.display()),
        timeout: Duration::from_secs(30),
        stdout: String::new(),
        stderr: String::new(),
    });
    let runner = SyncRunner::new(
        Arc::new(MockFeedSource::failing()),
        Arc::new(server.clone()),
        notify_everything(),
    );

    let outcome = runner.run(&zone).await;

    assert_eq!(outcome.status, SyncStatus::Failed);
    assert_eq!(outcome.failure_kind(), Some(FailureKind::Timeout));
    assert_eq!(outcome.failure.as_ref().unwrap().phase, SyncPhase::Applying);

    // Exactly one load attempt; the follow-up calls never happen
    assert_eq!(server.call_count(), 1);
    assert!(server.calls()[0].starts_with("load rpz "));
}

#[tokio::test]
async fn non_zero_exit_keeps_exit_code_and_output() {
    let dir = tempdir().unwrap();
    let zone = static_zone(dir.path(), "rpz", 30, vec![Rule::new("a.example", Action::Drop)]);
    let server = RecordingServer::new().failing_load(ServerSyncError::NonZeroExit {
        command: "pdnsutil zone load rpz".to_string(),
        code: 1,
        stdout: String::new(),
        stderr: "Zone 'rpz' not found".to_string(),
    });
    let runner = SyncRunner::new(
        Arc::new(MockFeedSource::failing()),
        Arc::new(server),
        SyncOptions::default(),
    );

    let outcome = runner.run(&zone).await;

    assert_eq!(outcome.failure_kind(), Some(FailureKind::NonZeroExit(1)));
    let message = &outcome.failure.as_ref().unwrap().message;
    assert!(message.contains("Zone 'rpz' not found"), "message was: {message}");
}

#[tokio::test]
async fn also_notify_failure_skips_notify() {
    let dir = tempdir().unwrap();
    let zone = static_zone(dir.path(), "rpz", 30, vec![Rule::new("a.example", Action::Drop)]);
    let server = RecordingServer::new()
        .failing_also_notify(ServerSyncError::execution("pdnsutil metadata set", "No such file or directory"));
    let runner = SyncRunner::new(
        Arc::new(MockFeedSource::failing()),
        Arc::new(server.clone()),
        notify_everything(),
    );

    let outcome = runner.run(&zone).await;

    assert_eq!(outcome.failure_kind(), Some(FailureKind::Execution));
    let calls = server.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[1].starts_with("also-notify rpz"));
    assert!(!calls.iter().any(|c| c.starts_with("notify")));
}

#[tokio::test]
async fn write_failure_is_reported_before_server_contact() {
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"x").unwrap();
    let zone = static_zone(&blocker, "rpz", 30, vec![Rule::new("a.example", Action::Drop)]);
    let server = RecordingServer::new();
    let runner = SyncRunner::new(
        Arc::new(MockFeedSource::failing()),
        Arc::new(server.clone()),
        SyncOptions::default(),
    );

    let outcome = runner.run(&zone).await;

    assert_eq!(outcome.failure_kind(), Some(FailureKind::Write));
    assert_eq!(outcome.failure.as_ref().unwrap().phase, SyncPhase::Writing);
    assert_eq!(server.call_count(), 0);
}
