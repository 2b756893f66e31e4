// # Metrics Sink Trait
//
// Receives one event per completed sync job.

use crate::sync::SyncOutcome;

/// Trait for job outcome reporting
///
/// Called exactly once per completed job, while the job still holds the
/// execution gate, so outcomes are recorded in completion order.
/// Implementations must not block.
pub trait MetricsSink: Send + Sync {
    /// Record a job outcome (count by zone + result, duration by zone)
    fn record(&self, outcome: &SyncOutcome);
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record(&self, _outcome: &SyncOutcome) {}
}
