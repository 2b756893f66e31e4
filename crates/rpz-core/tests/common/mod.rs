//! Test doubles and common utilities for contract tests
//!
//! This module provides minimal test doubles that record how the sync
//! pipeline uses its collaborators without touching the network or a real
//! nameserver.

#![allow(dead_code)]

use rpz_core::error::{Error, Result, ServerSyncError};
use rpz_core::orchestrator::{OrchestratorEvent, OrchestratorOptions};
use rpz_core::sync::SyncOutcome;
use rpz_core::traits::{FeedSource, ZoneServer};
use rpz_core::zone::{ReloadSchedule, Rule, SoaParams, ZoneKind, ZoneSpec};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// A feed source serving fixed text, or failing
pub struct MockFeedSource {
    body: Option<String>,
    fetch_call_count: Arc<AtomicUsize>,
}

impl MockFeedSource {
    /// Serve `body` on every fetch
    pub fn serving(body: &str) -> Self {
        Self {
            body: Some(body.to_string()),
            fetch_call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail every fetch with a fetch error
    pub fn failing() -> Self {
        Self {
            body: None,
            fetch_call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Get the number of times fetch_lines() was called
    pub fn fetch_call_count(&self) -> usize {
        self.fetch_call_count.load(Ordering::SeqCst)
    }

    /// Create a new MockFeedSource that shares counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            body: other.body.clone(),
            fetch_call_count: Arc::clone(&other.fetch_call_count),
        }
    }
}

#[async_trait::async_trait]
impl FeedSource for MockFeedSource {
    async fn fetch_lines(&self, url: &str) -> Result<Vec<String>> {
        self.fetch_call_count.fetch_add(1, Ordering::SeqCst);
        match &self.body {
            Some(body) => Ok(body.lines().map(str::to_string).collect()),
            None => Err(Error::fetch(format!("GET {url}: 503 Service Unavailable"))),
        }
    }

    fn source_name(&self) -> &'static str {
        "mock"
    }
}

/// A ZoneServer that records calls and tracks concurrency
#[derive(Clone)]
pub struct RecordingServer {
    /// Calls in order, e.g. "load rpz /tmp/rpz.zone"
    calls: Arc<std::sync::Mutex<Vec<String>>>,
    /// Calls currently executing
    active: Arc<AtomicUsize>,
    /// Highest value `active` ever reached
    max_active: Arc<AtomicUsize>,
    /// Time each call takes
    delay: Duration,
    /// Error returned by load_zone()
    load_error: Option<ServerSyncError>,
    /// Error returned by set_also_notify()
    also_notify_error: Option<ServerSyncError>,
}

impl RecordingServer {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(std::sync::Mutex::new(Vec::new())),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
            load_error: None,
            also_notify_error: None,
        }
    }

    /// Make every call take `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make load_zone() fail with `error`
    pub fn failing_load(mut self, error: ServerSyncError) -> Self {
        self.load_error = Some(error);
        self
    }

    /// Make set_also_notify() fail with `error`
    pub fn failing_also_notify(mut self, error: ServerSyncError) -> Self {
        self.also_notify_error = Some(error);
        self
    }

    /// Recorded calls in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Highest number of calls that ever overlapped
    pub fn max_concurrent_calls(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    async fn call(&self, description: String, error: Option<&ServerSyncError>) -> std::result::Result<(), ServerSyncError> {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        self.calls.lock().unwrap().push(description);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        match error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl ZoneServer for RecordingServer {
    async fn load_zone(&self, zone_name: &str, zone_file: &Path) -> std::result::Result<(), ServerSyncError> {
        self.call(
            format!("load {} {}", zone_name, zone_file.display()),
            self.load_error.as_ref(),
        )
        .await
    }

    async fn set_also_notify(&self, zone_name: &str, hosts: &[String]) -> std::result::Result<(), ServerSyncError> {
        self.call(
            format!("also-notify {} {}", zone_name, hosts.join(" ")),
            self.also_notify_error.as_ref(),
        )
        .await
    }

    async fn notify_zone(&self, zone_name: &str) -> std::result::Result<(), ServerSyncError> {
        self.call(format!("notify {zone_name}"), None).await
    }

    fn server_name(&self) -> &'static str {
        "recording"
    }
}

fn soa() -> SoaParams {
    SoaParams {
        nameserver: "ns1.example.net".to_string(),
        hostmaster_email: "hostmaster@example.net".to_string(),
        refresh: 3600,
        retry: 600,
        expire: 604800,
        negative_ttl: 30,
    }
}

/// A static zone writing to `<dir>/<name>.zone`
pub fn static_zone(dir: &Path, name: &str, ttl: u32, rules: Vec<Rule>) -> ZoneSpec {
    ZoneSpec {
        name: name.to_string(),
        ttl,
        soa: soa(),
        file_path: zone_path(dir, name),
        kind: ZoneKind::Static { rules },
    }
}

/// A remote zone writing to `<dir>/<name>.zone`
pub fn remote_zone(dir: &Path, name: &str, schedule: &str, fetch_on_start: bool) -> ZoneSpec {
    ZoneSpec {
        name: name.to_string(),
        ttl: 30,
        soa: soa(),
        file_path: zone_path(dir, name),
        kind: ZoneKind::Remote {
            url: format!("https://feeds.example/{name}.zone"),
            schedule: ReloadSchedule::parse(schedule).expect("valid schedule"),
            fetch_on_start,
        },
    }
}

pub fn zone_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.zone"))
}

/// Orchestrator options with short delays for tests
pub fn fast_options() -> OrchestratorOptions {
    OrchestratorOptions {
        startup_delay: Duration::from_millis(10),
        shutdown_grace: Duration::from_secs(5),
        event_channel_capacity: 1000,
    }
}

/// Body lines of a zone file: everything after the header's blank line
pub fn body_lines(content: &str) -> Vec<String> {
    content
        .split_once("\n\n")
        .map(|(_, body)| body.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Wait until `count` JobCompleted events arrived, or `within` elapses
///
/// Returns the outcomes in completion order.
pub async fn wait_for_completions(
    events: &mut mpsc::Receiver<OrchestratorEvent>,
    count: usize,
    within: Duration,
) -> Vec<SyncOutcome> {
    let mut outcomes = Vec::new();
    let _ = tokio::time::timeout(within, async {
        while outcomes.len() < count {
            match events.recv().await {
                Some(OrchestratorEvent::JobCompleted { outcome, .. }) => outcomes.push(outcome),
                Some(_) => {}
                None => break,
            }
        }
    })
    .await;
    outcomes
}

/// Drain every event currently buffered
pub fn drain_events(events: &mut mpsc::Receiver<OrchestratorEvent>) -> Vec<OrchestratorEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
