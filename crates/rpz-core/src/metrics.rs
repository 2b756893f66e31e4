//! In-memory job metrics
//!
//! [`JobMetrics`] counts completed jobs by zone and result and keeps a
//! duration histogram per zone, bucketed like the Prometheus client defaults. [`JobMetrics::render_prometheus`] produces the
//! Prometheus text exposition format for whatever endpoint serves it.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Mutex;
use std::time::Duration;

use crate::sync::SyncOutcome;
use crate::traits::MetricsSink;

const RELOAD_TOTAL: &str = "rpz_loader_zone_reload_total";
const RELOAD_DURATION: &str = "rpz_loader_zone_reload_duration_seconds";

/// Upper bounds of the duration buckets, in seconds
pub const DURATION_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Duration histogram for one zone
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DurationHistogram {
    pub count: u64,
    pub sum: Duration,
    /// Cumulative counts, one per entry of [`DURATION_BUCKETS`]
    pub buckets: [u64; DURATION_BUCKETS.len()],
}

impl DurationHistogram {
    fn observe(&mut self, duration: Duration) {
        self.count += 1;
        self.sum += duration;
        let seconds = duration.as_secs_f64();
        for (bucket, bound) in self.buckets.iter_mut().zip(DURATION_BUCKETS) {
            if seconds <= bound {
                *bucket += 1;
            }
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    /// (zone, result) -> completed jobs
    totals: BTreeMap<(String, String), u64>,
    /// zone -> durations
    durations: BTreeMap<String, DurationHistogram>,
}

/// Thread-safe in-memory metrics sink
#[derive(Debug, Default)]
pub struct JobMetrics {
    counters: Mutex<Counters>,
}

impl JobMetrics {
    /// Create an empty metrics sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Completed jobs for `zone` with `result` (`success`, `error`, `dry_run`)
    pub fn count(&self, zone: &str, result: &str) -> u64 {
        self.lock()
            .totals
            .get(&(zone.to_string(), result.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Completed jobs across all zones and results
    pub fn total(&self) -> u64 {
        self.lock().totals.values().sum()
    }

    /// Duration histogram for `zone`
    pub fn durations(&self, zone: &str) -> DurationHistogram {
        self.lock().durations.get(zone).copied().unwrap_or_default()
    }

    /// Render all series in the Prometheus text format
    pub fn render_prometheus(&self) -> String {
        let counters = self.lock();
        let mut out = String::new();

        let _ = writeln!(out, "# HELP {RELOAD_TOTAL} Total number of zone reloads attempted.");
        let _ = writeln!(out, "# TYPE {RELOAD_TOTAL} counter");
        for ((zone, result), value) in &counters.totals {
            let _ = writeln!(
                out,
                "{RELOAD_TOTAL}{{zone=\"{}\",result=\"{}\"}} {value}",
                escape_label(zone),
                escape_label(result)
            );
        }

        let _ = writeln!(out, "# HELP {RELOAD_DURATION} Duration of zone reloads.");
        let _ = writeln!(out, "# TYPE {RELOAD_DURATION} histogram");
        for (zone, histogram) in &counters.durations {
            let zone = escape_label(zone);
            for (bound, value) in DURATION_BUCKETS.iter().zip(histogram.buckets) {
                let _ = writeln!(
                    out,
                    "{RELOAD_DURATION}_bucket{{zone=\"{zone}\",le=\"{bound}\"}} {value}"
                );
            }
            let _ = writeln!(
                out,
                "{RELOAD_DURATION}_bucket{{zone=\"{zone}\",le=\"+Inf\"}} {}",
                histogram.count
            );
            let _ = writeln!(
                out,
                "{RELOAD_DURATION}_sum{{zone=\"{zone}\"}} {}",
                histogram.sum.as_secs_f64()
            );
            let _ = writeln!(
                out,
                "{RELOAD_DURATION}_count{{zone=\"{zone}\"}} {}",
                histogram.count
            );
        }

        out
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        // Counters stay consistent even if a holder panicked
        self.counters
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl MetricsSink for JobMetrics {
    fn record(&self, outcome: &SyncOutcome) {
        let mut counters = self.lock();
        *counters
            .totals
            .entry((outcome.zone.clone(), outcome.status.as_str().to_string()))
            .or_insert(0) += 1;

        counters
            .durations
            .entry(outcome.zone.clone())
            .or_default()
            .observe(outcome.duration);
    }
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
