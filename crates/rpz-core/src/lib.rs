// # rpz-core
//
// Core library for the RPZ zone loader.
//
// ## Architecture Overview
//
// This library keeps an authoritative server's response policy zones in
// sync with static rule sets or remote feeds:
// - **Content**: Renders static rules or filters a downloaded feed
// - **ZoneFileWriter**: Synthesizes the zone header and writes the file
// - **ZoneServer**: Trait for applying a zone file to the nameserver
// - **SyncRunner**: Sequences content -> file -> server for one zone
// - **Orchestrator**: Schedules sync jobs, one at a time
//
// ## Design Principles
//
// 1. **Full regeneration**: Every sync rewrites the whole file and reloads the whole zone
// 2. **Single flight**: At most one sync touches the nameserver at any instant
// 3. **Contained failures**: A failed job is logged and reported, never fatal
// 4. **Library-First**: The daemon is a thin layer over this crate

pub mod config;
pub mod content;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod sync;
pub mod traits;
pub mod zone;
pub mod zonefile;

// Re-export core types for convenience
pub use config::{RpzConfig, SchedulerConfig, ZoneConfig, ZoneType};
pub use error::{Error, FailureKind, Result, ServerSyncError};
pub use metrics::JobMetrics;
pub use orchestrator::{Orchestrator, OrchestratorEvent, OrchestratorOptions, ScheduleEntry, Trigger, TriggerKind};
pub use sync::{SyncFailure, SyncOptions, SyncOutcome, SyncPhase, SyncRunner, SyncStatus};
pub use traits::{FeedSource, MetricsSink, NoopMetrics, ZoneServer};
pub use zone::{Action, ReloadSchedule, Rule, SoaParams, ZoneKind, ZoneSpec};
pub use zonefile::{ZoneFile, ZoneFileWriter};
