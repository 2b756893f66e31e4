//! Architectural Contract Test: Scheduling
//!
//! This test verifies which triggers each zone gets and that they fire the
//! way they are declared.
//!
//! Constraints verified:
//! - Static zones sync exactly once after the startup delay
//! - Remote zones follow their reload schedule
//! - `fetch_on_start` adds a startup sync before the first scheduled one
//! - Invalid orchestrator input is rejected at construction
//!
//! If this test fails, someone has changed how zones map to triggers.

mod common;

use common::*;
use rpz_core::orchestrator::{Orchestrator, OrchestratorOptions, Trigger, TriggerKind};
use rpz_core::sync::{SyncOptions, SyncRunner};
use rpz_core::traits::NoopMetrics;
use rpz_core::zone::{Action, Rule};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn runner(feed: MockFeedSource, server: &RecordingServer) -> SyncRunner {
    SyncRunner::new(Arc::new(feed), Arc::new(server.clone()), SyncOptions::default())
}

#[tokio::test]
async fn static_zone_syncs_exactly_once() {
    let dir = tempdir().unwrap();
    let zones = vec![static_zone(dir.path(), "rpz", 30, vec![Rule::new("a.example", Action::Drop)])];
    let server = RecordingServer::new();
    let (orchestrator, mut events) = Orchestrator::new(
        zones,
        runner(MockFeedSource::failing(), &server),
        Arc::new(NoopMetrics),
        fast_options(),
    )
    .unwrap();

    let entry = orchestrator.entry("rpz").unwrap();
    assert_eq!(entry.triggers.len(), 1);
    assert!(matches!(entry.triggers[0], Trigger::OneShot { .. }));

    let _ = tokio::time::timeout(
        Duration::from_millis(500),
        orchestrator.run_until(std::future::pending::<()>()),
    )
    .await;

    let completions: Vec<_> = drain_events(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            rpz_core::OrchestratorEvent::JobCompleted { trigger, .. } => Some(trigger),
            _ => None,
        })
        .collect();
    assert_eq!(completions, vec![TriggerKind::Startup]);
    assert_eq!(server.call_count(), 1);
}

#[tokio::test]
async fn startup_delay_is_honored() {
    let dir = tempdir().unwrap();
    let zones = vec![static_zone(dir.path(), "rpz", 30, vec![Rule::new("a.example", Action::Drop)])];
    let server = RecordingServer::new();
    let options = OrchestratorOptions {
        startup_delay: Duration::from_millis(400),
        ..fast_options()
    };
    let (orchestrator, mut events) = Orchestrator::new(
        zones,
        runner(MockFeedSource::failing(), &server),
        Arc::new(NoopMetrics),
        options,
    )
    .unwrap();

    let started = tokio::time::Instant::now();
    let handle = tokio::spawn(async move { orchestrator.run_until(std::future::pending::<()>()).await });

    let outcomes = wait_for_completions(&mut events, 1, Duration::from_secs(5)).await;
    assert_eq!(outcomes.len(), 1);
    assert!(started.elapsed() >= Duration::from_millis(400));
    handle.abort();
}

#[tokio::test]
async fn remote_zone_follows_schedule_after_startup_fetch() {
    let dir = tempdir().unwrap();
    // Every second
    let zones = vec![remote_zone(dir.path(), "feed", "* * * * * *", true)];
    let server = RecordingServer::new();
    let (orchestrator, mut events) = Orchestrator::new(
        zones,
        runner(MockFeedSource::serving("a.example CNAME ."), &server),
        Arc::new(NoopMetrics),
        fast_options(),
    )
    .unwrap();

    let entry = orchestrator.entry("feed").unwrap();
    let kinds: Vec<_> = entry.triggers.iter().map(Trigger::kind).collect();
    assert_eq!(kinds, vec![TriggerKind::Startup, TriggerKind::Scheduled]);

    let handle = tokio::spawn(async move { orchestrator.run_until(std::future::pending::<()>()).await });

    let mut triggers = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(4), async {
        while triggers.len() < 3 {
            match events.recv().await {
                Some(rpz_core::OrchestratorEvent::JobCompleted { trigger, .. }) => triggers.push(trigger),
                Some(_) => {}
                None => break,
            }
        }
    })
    .await;
    handle.abort();

    assert_eq!(triggers.len(), 3, "schedule should keep firing: {triggers:?}");
    assert_eq!(triggers[0], TriggerKind::Startup);
    assert!(triggers[1..].iter().all(|t| *t == TriggerKind::Scheduled));
}

#[tokio::test]
async fn remote_zone_without_startup_fetch_waits_for_schedule() {
    let dir = tempdir().unwrap();
    let zones = vec![remote_zone(dir.path(), "feed", "0 0 1 1 *", false)];
    let server = RecordingServer::new();
    let feed = MockFeedSource::serving("a.example CNAME .");
    let probe = MockFeedSource::sharing_counters_with(&feed);
    let (orchestrator, _events) = Orchestrator::new(
        zones,
        runner(feed, &server),
        Arc::new(NoopMetrics),
        fast_options(),
    )
    .unwrap();

    let _ = tokio::time::timeout(
        Duration::from_millis(300),
        orchestrator.run_until(std::future::pending::<()>()),
    )
    .await;

    assert_eq!(probe.fetch_call_count(), 0);
    assert_eq!(server.call_count(), 0);
}

#[test]
fn construction_rejects_invalid_input() {
    let dir = tempdir().unwrap();
    let server = RecordingServer::new();

    let empty = Orchestrator::new(
        Vec::new(),
        runner(MockFeedSource::failing(), &server),
        Arc::new(NoopMetrics),
        fast_options(),
    );
    assert!(empty.is_err());

    let duplicate = Orchestrator::new(
        vec![
            static_zone(dir.path(), "rpz", 30, Vec::new()),
            static_zone(dir.path(), "rpz", 30, Vec::new()),
        ],
        runner(MockFeedSource::failing(), &server),
        Arc::new(NoopMetrics),
        fast_options(),
    );
    assert!(duplicate.is_err());

    let no_capacity = Orchestrator::new(
        vec![static_zone(dir.path(), "rpz", 30, Vec::new())],
        runner(MockFeedSource::failing(), &server),
        Arc::new(NoopMetrics),
        OrchestratorOptions {
            event_channel_capacity: 0,
            ..fast_options()
        },
    );
    assert!(no_capacity.is_err());
}
