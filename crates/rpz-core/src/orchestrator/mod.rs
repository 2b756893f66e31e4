//! Job orchestrator
//!
//! The Orchestrator decides when each zone is synced and guarantees that at
//! most one sync task runs at any instant.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//! │ OneShot      │  │ Recurring    │  │ Recurring    │   one task per trigger
//! │ (blocklist)  │  │ (feed-a)     │  │ (feed-b)     │
//! └──────────────┘  └──────────────┘  └──────────────┘
//!        │                 │                 │
//!        └──────────── due jobs ─────────────┘
//!                          ▼
//!                 ┌─────────────────┐
//!                 │ dispatch loop   │  FIFO queue + semaphore(1)
//!                 └─────────────────┘
//!                          │
//!            ┌─────────────┴─────────────┐
//!            ▼                           ▼
//!     ┌─────────────┐             ┌─────────────┐
//!     │ SyncRunner  │──outcome──▶ │ MetricsSink │ + OrchestratorEvent
//!     └─────────────┘             └─────────────┘
//! ```
//!
//! ## Scheduling
//!
//! - Static zones: one one-shot job after the startup delay
//! - Remote zones: a recurring job on the reload schedule, plus a one-shot
//!   job after the startup delay when `fetch_on_start` is set
//!
//! Due jobs wait in arrival order for the single execution permit; they are
//! never dropped while the orchestrator runs and never run concurrently. The
//! zone files and the nameserver have no locks of their own, so this limit
//! is a correctness requirement.

use chrono::{DateTime, Local, TimeZone};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::error::{Error, Result};
use crate::sync::{SyncOutcome, SyncRunner};
use crate::traits::MetricsSink;
use crate::zone::{ReloadSchedule, ZoneKind, ZoneSpec};

/// What fired a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    /// Fired once, shortly after startup
    Startup,
    /// Fired by the zone's reload schedule
    Scheduled,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerKind::Startup => f.write_str("startup"),
            TriggerKind::Scheduled => f.write_str("scheduled"),
        }
    }
}

/// One trigger of a schedule entry
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Fire once, `delay` after the orchestrator starts
    OneShot { delay: Duration },
    /// Fire on every match of the cron schedule
    Recurring { schedule: ReloadSchedule },
}

impl Trigger {
    pub fn kind(&self) -> TriggerKind {
        match self {
            Trigger::OneShot { .. } => TriggerKind::Startup,
            Trigger::Recurring { .. } => TriggerKind::Scheduled,
        }
    }
}

/// Binds a zone to its triggers
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    pub zone: Arc<ZoneSpec>,
    pub triggers: Vec<Trigger>,
}

impl ScheduleEntry {
    /// Build the triggers for `zone`
    pub fn for_zone(zone: Arc<ZoneSpec>, startup_delay: Duration) -> Self {
        let triggers = match &zone.kind {
            ZoneKind::Static { .. } => vec![Trigger::OneShot {
                delay: startup_delay,
            }],
            ZoneKind::Remote {
                schedule,
                fetch_on_start,
                ..
            } => {
                let mut triggers = Vec::with_capacity(2);
                if *fetch_on_start {
                    triggers.push(Trigger::OneShot {
                        delay: startup_delay,
                    });
                }
                triggers.push(Trigger::Recurring {
                    schedule: schedule.clone(),
                });
                triggers
            }
        };

        Self { zone, triggers }
    }
}

/// Events emitted by the Orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorEvent {
    /// Orchestrator started
    Started { zones: usize, triggers: usize },

    /// A job became due and was queued
    JobQueued {
        zone: String,
        trigger: TriggerKind,
        queue_len: usize,
    },

    /// A job acquired the execution permit
    JobStarted { zone: String, trigger: TriggerKind },

    /// A job finished
    JobCompleted {
        trigger: TriggerKind,
        outcome: SyncOutcome,
    },

    /// A queued job was discarded at shutdown
    JobDropped { zone: String, trigger: TriggerKind },

    /// Orchestrator stopped
    Stopped { reason: String },
}

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Delay before one-shot jobs fire
    pub startup_delay: Duration,
    /// How long shutdown waits for the in-flight job
    pub shutdown_grace: Duration,
    /// Capacity of the event channel
    pub event_channel_capacity: usize,
}

impl From<&SchedulerConfig> for OrchestratorOptions {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            startup_delay: config.startup_delay(),
            shutdown_grace: config.shutdown_grace(),
            event_channel_capacity: config.event_channel_capacity,
        }
    }
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

/// A due job waiting for the execution permit
#[derive(Debug)]
struct Job {
    zone: Arc<ZoneSpec>,
    trigger: TriggerKind,
}

/// Core job orchestrator
///
/// ## Lifecycle
///
/// 1. Create with [`Orchestrator::new()`]
/// 2. Run with [`Orchestrator::run()`] or [`Orchestrator::run_until()`]
/// 3. On shutdown, triggers stop, queued jobs are dropped and the in-flight
///    job gets the grace period to finish before it is aborted
pub struct Orchestrator {
    /// Schedule entries by zone name
    entries: BTreeMap<String, ScheduleEntry>,

    /// Sync task runner
    runner: Arc<SyncRunner>,

    /// Outcome sink
    metrics: Arc<dyn MetricsSink>,

    /// Execution gate, capacity 1
    gate: Arc<Semaphore>,

    options: OrchestratorOptions,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<OrchestratorEvent>,
}

impl Orchestrator {
    /// Create a new orchestrator
    ///
    /// # Returns
    ///
    /// A tuple of (orchestrator, event_receiver)
    pub fn new(
        zones: Vec<ZoneSpec>,
        runner: SyncRunner,
        metrics: Arc<dyn MetricsSink>,
        options: OrchestratorOptions,
    ) -> Result<(Self, mpsc::Receiver<OrchestratorEvent>)> {
        if zones.is_empty() {
            return Err(Error::config("No zones configured"));
        }
        if options.event_channel_capacity == 0 {
            return Err(Error::config("Event channel capacity must be > 0"));
        }

        let mut entries = BTreeMap::new();
        for zone in zones {
            let name = zone.name.clone();
            let entry = ScheduleEntry::for_zone(Arc::new(zone), options.startup_delay);
            if entries.insert(name.clone(), entry).is_some() {
                return Err(Error::config(format!("Zone '{name}' is scheduled twice")));
            }
        }

        let (tx, rx) = mpsc::channel(options.event_channel_capacity);

        let orchestrator = Self {
            entries,
            runner: Arc::new(runner),
            metrics,
            gate: Arc::new(Semaphore::new(1)),
            options,
            event_tx: tx,
        };

        Ok((orchestrator, rx))
    }

    /// Schedule entries, ordered by zone name
    pub fn entries(&self) -> impl Iterator<Item = &ScheduleEntry> {
        self.entries.values()
    }

    /// Schedule entry for one zone
    pub fn entry(&self, zone_name: &str) -> Option<&ScheduleEntry> {
        self.entries.get(zone_name)
    }

    /// Run until CTRL-C
    pub async fn run(&self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for CTRL-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run until `shutdown` completes
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let (job_tx, mut job_rx) = mpsc::unbounded_channel::<Job>();
        let started_at = Instant::now();

        let mut triggers = JoinSet::new();
        for entry in self.entries.values() {
            for trigger in &entry.triggers {
                triggers.spawn(fire_trigger(
                    entry.zone.clone(),
                    trigger.clone(),
                    started_at,
                    job_tx.clone(),
                ));
            }
        }
        // Trigger tasks hold the only senders: the channel closes once every
        // trigger has fired its last job.
        drop(job_tx);

        info!(
            "Orchestrator started: {} zone(s), {} trigger(s)",
            self.entries.len(),
            triggers.len()
        );
        self.emit_event(OrchestratorEvent::Started {
            zones: self.entries.len(),
            triggers: triggers.len(),
        });

        let mut pending: VecDeque<Job> = VecDeque::new();
        let mut running: JoinSet<()> = JoinSet::new();
        let mut triggers_open = true;

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }

                Some(result) = running.join_next(), if !running.is_empty() => {
                    if let Err(e) = result {
                        error!("Sync job panicked: {}", e);
                    }
                }

                permit = self.gate.clone().acquire_owned(), if !pending.is_empty() => {
                    let permit = permit.map_err(|e| Error::Other(format!("Execution gate closed: {e}")))?;
                    if let Some(job) = pending.pop_front() {
                        self.start_job(&mut running, job, permit);
                    }
                }

                job = job_rx.recv(), if triggers_open => match job {
                    Some(job) => {
                        debug!(zone = %job.zone.name, trigger = %job.trigger, "Job due");
                        let zone = job.zone.name.clone();
                        let trigger = job.trigger;
                        pending.push_back(job);
                        self.emit_event(OrchestratorEvent::JobQueued {
                            zone,
                            trigger,
                            queue_len: pending.len(),
                        });
                    }
                    None => {
                        debug!("All triggers have fired their last job");
                        triggers_open = false;
                    }
                },
            }
        }

        self.shutdown(triggers, pending, running).await;
        Ok(())
    }

    /// Spawn `job`; it holds `permit` until its outcome is reported
    fn start_job(&self, running: &mut JoinSet<()>, job: Job, permit: OwnedSemaphorePermit) {
        info!(zone = %job.zone.name, trigger = %job.trigger, "Starting sync job");
        self.emit_event(OrchestratorEvent::JobStarted {
            zone: job.zone.name.clone(),
            trigger: job.trigger,
        });

        let runner = Arc::clone(&self.runner);
        let metrics = Arc::clone(&self.metrics);
        let event_tx = self.event_tx.clone();

        running.spawn(async move {
            let outcome = runner.run(&job.zone).await;
            metrics.record(&outcome);
            send_event(
                &event_tx,
                OrchestratorEvent::JobCompleted {
                    trigger: job.trigger,
                    outcome,
                },
            );
            drop(permit);
        });
    }

    async fn shutdown(
        &self,
        mut triggers: JoinSet<()>,
        pending: VecDeque<Job>,
        mut running: JoinSet<()>,
    ) {
        triggers.shutdown().await;

        if !pending.is_empty() {
            warn!("Dropping {} queued job(s) at shutdown", pending.len());
        }
        for job in pending {
            self.emit_event(OrchestratorEvent::JobDropped {
                zone: job.zone.name.clone(),
                trigger: job.trigger,
            });
        }

        if !running.is_empty() {
            info!(
                "Waiting up to {:?} for the in-flight sync job",
                self.options.shutdown_grace
            );
            let drained = tokio::time::timeout(self.options.shutdown_grace, async {
                while running.join_next().await.is_some() {}
            })
            .await;

            if drained.is_err() {
                warn!(
                    "In-flight sync job did not finish within {:?}, aborting it",
                    self.options.shutdown_grace
                );
                running.shutdown().await;
            }
        }

        info!("Orchestrator stopped");
        self.emit_event(OrchestratorEvent::Stopped {
            reason: "Shutdown signal".to_string(),
        });
    }

    fn emit_event(&self, event: OrchestratorEvent) {
        send_event(&self.event_tx, event);
    }
}

/// Send an event without blocking; a full channel drops the event
fn send_event(tx: &mpsc::Sender<OrchestratorEvent>, event: OrchestratorEvent) {
    if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(event) {
        warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
    }
}

/// Next slot of `schedule` after `now`, on the wall clock of `now`'s timezone
fn next_slot<Tz: TimeZone>(
    schedule: &ReloadSchedule,
    now: &DateTime<Tz>,
    last_fired: Option<&DateTime<Tz>>,
) -> Option<DateTime<Tz>> {
    // Never fire the same schedule slot twice if the timer wakes early
    let from = match last_fired {
        Some(last) if last > now => last,
        _ => now,
    };
    schedule.next_after(from)
}

/// Drive one trigger, sending a job each time it fires
///
/// Recurring schedules follow the host's local time.
async fn fire_trigger(
    zone: Arc<ZoneSpec>,
    trigger: Trigger,
    started_at: Instant,
    tx: mpsc::UnboundedSender<Job>,
) {
    let kind = trigger.kind();
    match trigger {
        Trigger::OneShot { delay } => {
            tokio::time::sleep_until(started_at + delay).await;
            let _ = tx.send(Job { zone, trigger: kind });
        }
        Trigger::Recurring { schedule } => {
            let mut last_fired: Option<DateTime<Local>> = None;
            loop {
                let now = Local::now();
                let Some(next) = next_slot(&schedule, &now, last_fired.as_ref()) else {
                    warn!(
                        zone = %zone.name,
                        "Reload schedule '{}' has no upcoming runs",
                        schedule.expression()
                    );
                    return;
                };

                debug!(zone = %zone.name, "Next scheduled sync at {}", next);
                let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
                tokio::time::sleep(wait).await;

                last_fired = Some(next);
                if tx
                    .send(Job {
                        zone: Arc::clone(&zone),
                        trigger: kind,
                    })
                    .is_err()
                {
                    return;
                }
            }
        }
    }
}
