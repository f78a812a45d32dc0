//! Application Services
//!
//! - `RateLimiter`: spaces upstream requests
//! - `PaginatedSource`: page-at-a-time fetching and range drains
//! - `MetricsSink`: cycle statistics
//! - `Collector`: backfill/incremental state machine and scheduler loop

mod collector;
mod metrics_sink;
mod paginated_source;
mod rate_limiter;

pub use collector::{
    Collector, CollectorConfig, CollectorPhase, CollectorPorts, CollectorStats, TickOutcome,
};
pub use metrics_sink::{
    API_CALLS_TOTAL, CYCLE_DURATION_SECONDS, CYCLES_TOTAL, CycleStats, DUPLICATES_FILTERED_TOTAL,
    ERRORS_TOTAL, MetricsSink, MetricsSnapshot, PUBLISH_FAILURES_TOTAL, RECORDS_PUBLISHED_TOTAL,
    ROWS_SKIPPED_TOTAL,
};
pub use paginated_source::{DrainSummary, PaginatedSource};
pub use rate_limiter::{DEFAULT_RATE_LIMIT, RateLimiter};
