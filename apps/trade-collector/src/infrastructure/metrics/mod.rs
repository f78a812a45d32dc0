//! Prometheus Metrics Module
//!
//! Installs the Prometheus recorder behind the `metrics` facade. The
//! collector's `MetricsSink` emits the counters; this module only owns the
//! exporter and the metric descriptions.
//!
//! # Metrics
//!
//! - **Throughput**: records published, duplicates filtered, rows skipped
//! - **Cycles**: completed cycles, failed cycles, cycle duration
//! - **Upstream**: page requests issued
//! - **Bus**: rejected publishes
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;

use metrics::{Unit, describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::application::services::{
    API_CALLS_TOTAL, CYCLE_DURATION_SECONDS, CYCLES_TOTAL, DUPLICATES_FILTERED_TOTAL, ERRORS_TOTAL,
    PUBLISH_FAILURES_TOTAL, RECORDS_PUBLISHED_TOTAL, ROWS_SKIPPED_TOTAL,
};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if another global recorder was already installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        RECORDS_PUBLISHED_TOTAL,
        "Trade records published to the bus"
    );
    describe_counter!(
        DUPLICATES_FILTERED_TOTAL,
        "Trade records dropped as already seen"
    );
    describe_counter!(
        ROWS_SKIPPED_TOTAL,
        "Upstream rows skipped as malformed"
    );

    describe_counter!(CYCLES_TOTAL, "Collection cycles completed, by mode");
    describe_counter!(ERRORS_TOTAL, "Collection cycles that failed");
    describe_histogram!(
        CYCLE_DURATION_SECONDS,
        Unit::Seconds,
        "Wall time of a successful collection cycle"
    );

    describe_counter!(API_CALLS_TOTAL, "Upstream page requests issued");
    describe_counter!(
        PUBLISH_FAILURES_TOTAL,
        "Bus publishes that were rejected"
    );
}

// =============================================================================
// Tests
// =============================================================================
