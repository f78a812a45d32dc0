//! Collection Metrics Sink
//!
//! Process-wide cycle statistics. Purely observational: nothing in the
//! collector reads these back to make decisions.
//!
//! Counters live behind one lock so `snapshot` is a consistent
//! point-in-time view. Every update is mirrored to the `metrics` facade for
//! Prometheus export.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use parking_lot::Mutex;
use serde::Serialize;

use crate::domain::collection::CollectionMode;

/// Records published to the bus.
pub const RECORDS_PUBLISHED_TOTAL: &str = "trade_collector_records_published_total";
/// Records dropped as duplicates.
pub const DUPLICATES_FILTERED_TOTAL: &str = "trade_collector_duplicates_filtered_total";
/// Successful cycles.
pub const CYCLES_TOTAL: &str = "trade_collector_cycles_total";
/// Upstream page requests.
pub const API_CALLS_TOTAL: &str = "trade_collector_api_calls_total";
/// Failed cycles.
pub const ERRORS_TOTAL: &str = "trade_collector_errors_total";
/// Malformed upstream rows.
pub const ROWS_SKIPPED_TOTAL: &str = "trade_collector_rows_skipped_total";
/// Rejected bus publishes.
pub const PUBLISH_FAILURES_TOTAL: &str = "trade_collector_publish_failures_total";
/// Cycle wall time.
pub const CYCLE_DURATION_SECONDS: &str = "trade_collector_cycle_duration_seconds";

/// Outcome of one successful cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    /// Mode the cycle ran in.
    pub mode: CollectionMode,
    /// Records published.
    pub records: u64,
    /// Records dropped as duplicates.
    pub duplicates: u64,
    /// Upstream page requests.
    pub api_calls: u64,
    /// Malformed rows skipped.
    pub skipped: u64,
}

/// Point-in-time metrics view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Records published since start or reset.
    pub total_records_collected: u64,
    /// Duplicates filtered since start or reset.
    pub total_duplicates_filtered: u64,
    /// Successful cycles since start or reset.
    pub total_cycles_completed: u64,
    /// Upstream page requests since start or reset.
    pub total_api_calls: u64,
    /// Failed cycles since start or reset.
    pub total_errors: u64,
    /// Malformed rows since start or reset.
    pub total_rows_skipped: u64,
    /// Rejected publishes since start or reset.
    pub total_publish_failures: u64,
    /// Mean records per successful cycle.
    pub avg_records_per_cycle: f64,
    /// Duration of the most recent successful cycle.
    pub last_cycle_duration_ms: u64,
    /// Start of the most recent cycle.
    pub last_cycle_started_at: Option<DateTime<Utc>>,
    /// End of the most recent successful cycle.
    pub last_cycle_finished_at: Option<DateTime<Utc>>,
    /// Seconds since start or reset.
    pub uptime_secs: u64,
    /// Time of start or reset.
    pub started_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Counters {
    records_collected: u64,
    duplicates_filtered: u64,
    cycles_completed: u64,
    api_calls: u64,
    errors: u64,
    rows_skipped: u64,
    publish_failures: u64,
    last_cycle_duration: Duration,
    cycle_started: Option<Instant>,
    last_cycle_started_at: Option<DateTime<Utc>>,
    last_cycle_finished_at: Option<DateTime<Utc>>,
    started: Instant,
    started_at: DateTime<Utc>,
}

impl Counters {
    fn new() -> Self {
        Self {
            records_collected: 0,
            duplicates_filtered: 0,
            cycles_completed: 0,
            api_calls: 0,
            errors: 0,
            rows_skipped: 0,
            publish_failures: 0,
            last_cycle_duration: Duration::ZERO,
            cycle_started: None,
            last_cycle_started_at: None,
            last_cycle_finished_at: None,
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }
}

/// Accumulates collection statistics.
#[derive(Debug)]
pub struct MetricsSink {
    counters: Mutex<Counters>,
}

impl Default for MetricsSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink {
    /// Create a sink with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(Counters::new()),
        }
    }

    /// Mark the start of a cycle.
    pub fn start_cycle(&self) {
        let mut c = self.counters.lock();
        c.cycle_started = Some(Instant::now());
        c.last_cycle_started_at = Some(Utc::now());
    }

    /// Mark the successful end of a cycle.
    pub fn end_cycle(&self, stats: CycleStats) {
        let duration = {
            let mut c = self.counters.lock();
            let duration = c
                .cycle_started
                .take()
                .map_or(Duration::ZERO, |started| started.elapsed());
            c.records_collected += stats.records;
            c.duplicates_filtered += stats.duplicates;
            c.api_calls += stats.api_calls;
            c.rows_skipped += stats.skipped;
            c.cycles_completed += 1;
            c.last_cycle_duration = duration;
            c.last_cycle_finished_at = Some(Utc::now());
            duration
        };

        let mode = stats.mode.as_str();
        counter!(RECORDS_PUBLISHED_TOTAL, "mode" => mode).increment(stats.records);
        counter!(DUPLICATES_FILTERED_TOTAL).increment(stats.duplicates);
        counter!(API_CALLS_TOTAL).increment(stats.api_calls);
        counter!(ROWS_SKIPPED_TOTAL).increment(stats.skipped);
        counter!(CYCLES_TOTAL, "mode" => mode).increment(1);
        histogram!(CYCLE_DURATION_SECONDS, "mode" => mode).record(duration.as_secs_f64());

        tracing::info!(
            mode,
            collected = stats.records,
            duplicates = stats.duplicates,
            api_calls = stats.api_calls,
            duration_ms = duration.as_millis(),
            "Collection cycle completed"
        );
    }

    /// Count a failed cycle. `api_calls` made before the failure still count.
    pub fn record_error(&self, api_calls: u64) {
        {
            let mut c = self.counters.lock();
            c.errors += 1;
            c.api_calls += api_calls;
            c.cycle_started = None;
        }
        counter!(ERRORS_TOTAL).increment(1);
        counter!(API_CALLS_TOTAL).increment(api_calls);
    }

    /// Count rejected bus publishes.
    pub fn record_publish_failures(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.counters.lock().publish_failures += count;
        counter!(PUBLISH_FAILURES_TOTAL).increment(count);
    }

    /// Consistent view of all counters.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let c = self.counters.lock();
        let avg_records_per_cycle = if c.cycles_completed > 0 {
            c.records_collected as f64 / c.cycles_completed as f64
        } else {
            0.0
        };

        MetricsSnapshot {
            total_records_collected: c.records_collected,
            total_duplicates_filtered: c.duplicates_filtered,
            total_cycles_completed: c.cycles_completed,
            total_api_calls: c.api_calls,
            total_errors: c.errors,
            total_rows_skipped: c.rows_skipped,
            total_publish_failures: c.publish_failures,
            avg_records_per_cycle,
            last_cycle_duration_ms: u64::try_from(c.last_cycle_duration.as_millis())
                .unwrap_or(u64::MAX),
            last_cycle_started_at: c.last_cycle_started_at,
            last_cycle_finished_at: c.last_cycle_finished_at,
            uptime_secs: c.started.elapsed().as_secs(),
            started_at: c.started_at,
        }
    }

    /// Zero every counter and restart the uptime clock.
    pub fn reset(&self) {
        *self.counters.lock() = Counters::new();
        tracing::warn!("Collection metrics have been reset");
    }

    /// Emit the current snapshot as one structured log line.
    pub fn log_snapshot(&self) {
        let m = self.snapshot();
        tracing::info!(
            total_records_collected = m.total_records_collected,
            total_duplicates_filtered = m.total_duplicates_filtered,
            total_cycles_completed = m.total_cycles_completed,
            total_api_calls = m.total_api_calls,
            total_errors = m.total_errors,
            avg_records_per_cycle = %format!("{:.2}", m.avg_records_per_cycle),
            last_cycle_duration_ms = m.last_cycle_duration_ms,
            uptime_secs = m.uptime_secs,
            uptime_mins = m.uptime_secs / 60,
            started_at = %m.started_at,
            "Collection metrics"
        );
    }
}
