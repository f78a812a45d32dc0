#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call,
        clippy::cast_possible_truncation
    )
)]

//! Trade Collector - Resumable Market Data Ingestion
//!
//! Polls the MOEX ISS trades API on a fixed delay, drops trades it has
//! already seen and republishes the rest onto the message bus. Progress is
//! kept in a durable cursor so a restart resumes where the last successful
//! cycle stopped.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Collection types and rules, no I/O
//!   - `trade`: Trade records and instrument metadata
//!   - `cursor`: Durable progress cursor
//!   - `collection`: Modes, fetch scopes and window arithmetic
//!   - `dedup`: Bounded per-instrument dedup cache
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Trade source, bus publisher, cursor store, clock
//!   - `services`: Rate limiter, paginated source, metrics sink, collector
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `iss`: ISS HTTP client and `{columns, data}` decoding
//!   - `bus`: Topic-keyed broadcast bus
//!   - `persistence`: JSON file and in-memory cursor stores
//!   - `clock`: Exchange-local clock
//!   - `config`: Environment-driven settings
//!   - `health`: Health, readiness and metrics HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//!                ┌───────────┐   ┌────────────┐   ┌─────────┐
//! ISS API ──────►│ Paginated │──►│ Collector  │──►│   Bus   │──► moex.trades
//!  (rate-limited)│  Source   │   │ (dedup)    │   │         │──► moex.instruments
//!                └───────────┘   └─────┬──────┘   └─────────┘
//!                                      │
//!                                      ▼
//!                               cursor file (JSON)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Collection types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::collection::{CollectionMode, CollectionWindow, FetchScope, InstrumentSelection};
pub use domain::cursor::ProgressCursor;
pub use domain::dedup::{DedupCache, DedupStats};
pub use domain::trade::{Security, TradeRecord, TradeSide};

// Ports
pub use application::ports::{
    BusMessage, BusPublisherPort, ClockPort, CursorStoreError, CursorStorePort, PageRequest,
    PublishError, SourceError, TradePage, TradeSourcePort,
};

// Services
pub use application::services::{
    Collector, CollectorConfig, CollectorPhase, CollectorPorts, CollectorStats, DrainSummary,
    MetricsSink, MetricsSnapshot, PaginatedSource, RateLimiter, TickOutcome,
};

// Infrastructure config
pub use infrastructure::config::{
    BusSettings, CollectionSettings, CollectorSettings, ConfigError, IssSettings, TickerMode,
};

// Adapters
pub use infrastructure::bus::{BroadcastBus, BusStats, SharedBroadcastBus};
pub use infrastructure::clock::{ExchangeClock, ManualClock};
pub use infrastructure::iss::{IssClient, IssClientConfig};
pub use infrastructure::persistence::{FileCursorStore, InMemoryCursorStore};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
