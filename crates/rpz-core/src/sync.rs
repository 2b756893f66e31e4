//! Sync task
//!
//! A sync task regenerates one zone file and applies it to the server:
//!
//! ```text
//! Building ──▶ Writing ──┬──▶ Applying ──▶ Done(Succeeded | Failed)
//!                        └──▶ DryRunStop ─▶ Done(SkippedDryRun)
//! ```
//!
//! Phases run strictly in order. The first error ends the task as `Failed`
//! and later phases are skipped. Nothing is retried; the zone waits for its
//! next scheduled trigger.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

use crate::content;
use crate::error::{Error, FailureKind, Result};
use crate::traits::{FeedSource, ZoneServer};
use crate::zone::ZoneSpec;
use crate::zonefile::ZoneFileWriter;

/// Phase of a sync task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Rendering rules or downloading the feed
    Building,
    /// Writing the zone file
    Writing,
    /// Dry run: stopping before the server is contacted
    DryRunStop,
    /// Loading the zone into the server
    Applying,
    /// Finished
    Done,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::Building => "building",
            SyncPhase::Writing => "writing",
            SyncPhase::DryRunStop => "dry_run_stop",
            SyncPhase::Applying => "applying",
            SyncPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Terminal status of a sync task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncStatus {
    Succeeded,
    Failed,
    SkippedDryRun,
}

impl SyncStatus {
    /// Label used for metrics
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Succeeded => "success",
            SyncStatus::Failed => "error",
            SyncStatus::SkippedDryRun => "dry_run",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a sync task failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFailure {
    /// Phase the error occurred in
    pub phase: SyncPhase,
    /// Classified cause
    pub kind: FailureKind,
    /// Human-readable detail (command output, HTTP status, I/O error)
    pub message: String,
}

impl fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed ({}): {}", self.phase, self.kind, self.message)
    }
}

/// Result of one sync task execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub zone: String,
    pub status: SyncStatus,
    pub duration: Duration,
    pub failure: Option<SyncFailure>,
}

impl SyncOutcome {
    /// Failure cause, if the task failed
    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure.as_ref().map(|f| f.kind)
    }
}

/// Options shared by every sync task
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Stop after writing the zone file
    pub dry_run: bool,
    /// Hosts set as ALSO-NOTIFY metadata after a load
    pub also_notify: Vec<String>,
    /// Send a NOTIFY after a load
    pub notify: bool,
}

/// Runs sync tasks against injected collaborators
///
/// The runner holds no per-zone state: [`SyncRunner::run`] is a function of
/// the zone and the options, which keeps it testable apart from scheduling.
pub struct SyncRunner {
    feed: Arc<dyn FeedSource>,
    server: Arc<dyn ZoneServer>,
    writer: ZoneFileWriter,
    options: SyncOptions,
}

impl SyncRunner {
    /// Create a new runner
    pub fn new(
        feed: Arc<dyn FeedSource>,
        server: Arc<dyn ZoneServer>,
        options: SyncOptions,
    ) -> Self {
        Self {
            feed,
            server,
            writer: ZoneFileWriter::new(),
            options,
        }
    }

    /// Execute one sync of `zone`
    ///
    /// Never returns an error: failures are reported in the outcome.
    pub async fn run(&self, zone: &ZoneSpec) -> SyncOutcome {
        let started = Instant::now();
        info!(zone = %zone.name, kind = zone.kind_name(), "Syncing RPZ zone");

        let (status, failure) = match self.execute(zone).await {
            Ok(status) => (status, None),
            Err((phase, err)) => {
                error!(
                    zone = %zone.name,
                    phase = %phase,
                    cause = %err.failure_kind(),
                    "Failed to sync RPZ zone: {}",
                    err
                );
                let failure = SyncFailure {
                    phase,
                    kind: err.failure_kind(),
                    message: err.to_string(),
                };
                (SyncStatus::Failed, Some(failure))
            }
        };

        let outcome = SyncOutcome {
            zone: zone.name.clone(),
            status,
            duration: started.elapsed(),
            failure,
        };

        info!(
            zone = %zone.name,
            phase = %SyncPhase::Done,
            status = %outcome.status,
            duration_ms = outcome.duration.as_millis() as u64,
            "Sync finished"
        );
        outcome
    }

    async fn execute(&self, zone: &ZoneSpec) -> std::result::Result<SyncStatus, (SyncPhase, Error)> {
        let body = self
            .phase(zone, SyncPhase::Building, content::zone_body(zone, self.feed.as_ref()))
            .await?;

        let file = self
            .phase(zone, SyncPhase::Writing, self.writer.write(zone, body))
            .await?;

        if self.options.dry_run {
            info!(
                zone = %zone.name,
                phase = %SyncPhase::DryRunStop,
                "[DRY RUN] Zone file written to {}, not loading",
                file.path.display()
            );
            return Ok(SyncStatus::SkippedDryRun);
        }

        self.phase(zone, SyncPhase::Applying, self.apply(zone, &file.path))
            .await?;

        Ok(SyncStatus::Succeeded)
    }

    async fn apply(&self, zone: &ZoneSpec, path: &std::path::Path) -> Result<()> {
        self.server.load_zone(&zone.name, path).await?;
        info!(
            zone = %zone.name,
            server = self.server.server_name(),
            "Zone loaded from {}",
            path.display()
        );

        if !self.options.also_notify.is_empty() {
            self.server
                .set_also_notify(&zone.name, &self.options.also_notify)
                .await?;
            info!(zone = %zone.name, hosts = ?self.options.also_notify, "ALSO-NOTIFY set");
        }

        if self.options.notify {
            self.server.notify_zone(&zone.name).await?;
            info!(zone = %zone.name, "NOTIFY sent");
        }

        Ok(())
    }

    /// Log entry into `phase`, run it, and tag any error with the phase
    async fn phase<T>(
        &self,
        zone: &ZoneSpec,
        phase: SyncPhase,
        fut: impl Future<Output = Result<T>>,
    ) -> std::result::Result<T, (SyncPhase, Error)> {
        info!(zone = %zone.name, phase = %phase, "Sync phase started");
        fut.await.map_err(|e| (phase, e))
    }
}
