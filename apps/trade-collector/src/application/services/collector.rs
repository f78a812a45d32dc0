//! Trade Collector
//!
//! Drives collection cycles on a fixed-delay schedule and owns the
//! `BACKFILL -> INCREMENTAL` state machine.
//!
//! # Cycle
//!
//! ```text
//! tick ─► load cursor ─► mode?
//!          │
//!          ├─ Backfill:    drain [watermark, now) per scope, publish every
//!          │               batch as it arrives, then advance to now and
//!          │               mark backfill complete (one save)
//!          │
//!          └─ Incremental: fetch [watermark, min(now, watermark + max_gap)),
//!                          drop duplicates, publish survivors, advance to
//!                          the window end even if nothing survived
//! ```
//!
//! Any fetch or save failure leaves the persisted cursor untouched, so the
//! next tick retries the same range. Publish failures are logged and counted
//! but never fail a cycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::NaiveDateTime;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    BusMessage, BusPublisherPort, ClockPort, CursorStoreError, CursorStorePort, SourceError,
    TradeSourcePort,
};
use crate::application::services::{
    CycleStats, DrainSummary, MetricsSink, PaginatedSource, RateLimiter,
};
use crate::domain::collection::{CollectionMode, CollectionWindow, InstrumentSelection};
use crate::domain::dedup::{DedupCache, DedupStats};
use crate::domain::trade::TradeRecord;

// =============================================================================
// Configuration
// =============================================================================

/// Collector behaviour.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Whether ticks do any work.
    pub enabled: bool,
    /// Instruments to follow.
    pub selection: InstrumentSelection,
    /// Page size for every drain.
    pub batch_size: usize,
    /// Largest incremental window.
    pub max_gap: chrono::Duration,
    /// Delay between the end of one tick and the start of the next.
    pub interval: Duration,
    /// Period of the metrics log line; `None` disables it.
    pub metrics_log_interval: Option<Duration>,
    /// Topic for trade records.
    pub trades_topic: String,
    /// Topic for instrument metadata.
    pub instruments_topic: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            selection: InstrumentSelection::default(),
            batch_size: 5000,
            max_gap: chrono::Duration::minutes(5),
            interval: Duration::from_millis(3000),
            metrics_log_interval: Some(Duration::from_secs(60)),
            trades_topic: "moex.trades".to_string(),
            instruments_topic: "moex.instruments".to_string(),
        }
    }
}

/// Adapters the collector drives.
pub struct CollectorPorts {
    /// Upstream trades API.
    pub source: Arc<dyn TradeSourcePort>,
    /// Durable cursor storage.
    pub store: Arc<dyn CursorStorePort>,
    /// Outbound bus.
    pub bus: Arc<dyn BusPublisherPort>,
    /// Exchange-local clock.
    pub clock: Arc<dyn ClockPort>,
}

// =============================================================================
// Outcomes and Stats
// =============================================================================

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Collector disabled or has nothing configured.
    Idle,
    /// Backfill finished; the collector is now incremental.
    Backfilled {
        /// Records published during the drain.
        published: u64,
        /// New watermark.
        watermark: NaiveDateTime,
    },
    /// An incremental window was collected.
    Collected {
        /// Records returned by the upstream.
        fetched: u64,
        /// Records published.
        published: u64,
        /// Records dropped as duplicates.
        duplicates: u64,
        /// New watermark.
        watermark: NaiveDateTime,
    },
    /// The watermark is already at `now`.
    CaughtUp,
    /// The cycle failed; the cursor was not touched.
    Failed,
}

/// What the collector is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectorPhase {
    /// Not started, disabled, or nothing to collect.
    Idle,
    /// Bulk catch-up.
    Backfill,
    /// Steady state.
    Incremental,
}

impl From<CollectionMode> for CollectorPhase {
    fn from(mode: CollectionMode) -> Self {
        match mode {
            CollectionMode::Backfill => Self::Backfill,
            CollectionMode::Incremental => Self::Incremental,
        }
    }
}

/// Operator-facing collector state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectorStats {
    /// Whether the collector is enabled.
    pub enabled: bool,
    /// Selection mode (`specific` or `all`).
    pub mode: &'static str,
    /// Instruments configured in `specific` mode.
    pub configured_tickers: Vec<String>,
    /// Current phase.
    pub phase: CollectorPhase,
    /// Watermark after the last successful cycle.
    pub last_watermark: Option<NaiveDateTime>,
    /// Dedup cache sizes.
    pub processed_trades: DedupStats,
}

#[derive(Debug, thiserror::Error)]
enum CycleError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Cursor(#[from] CursorStoreError),
}

#[derive(Debug, Clone, Copy, Default)]
struct PublishTally {
    published: u64,
    failed: u64,
}

// =============================================================================
// Collector
// =============================================================================

/// Resumable trade collector.
pub struct Collector {
    config: CollectorConfig,
    source: PaginatedSource,
    dedup: Arc<DedupCache>,
    store: Arc<dyn CursorStorePort>,
    bus: Arc<dyn BusPublisherPort>,
    clock: Arc<dyn ClockPort>,
    metrics: Arc<MetricsSink>,
    tick_lock: Mutex<()>,
    phase: RwLock<CollectorPhase>,
    last_watermark: RwLock<Option<NaiveDateTime>>,
    ready: AtomicBool,
}

impl Collector {
    /// Wire a collector.
    #[must_use]
    pub fn new(
        config: CollectorConfig,
        ports: CollectorPorts,
        limiter: Arc<RateLimiter>,
        dedup: Arc<DedupCache>,
        metrics: Arc<MetricsSink>,
    ) -> Self {
        Self {
            config,
            source: PaginatedSource::new(ports.source, limiter),
            dedup,
            store: ports.store,
            bus: ports.bus,
            clock: ports.clock,
            metrics,
            tick_lock: Mutex::new(()),
            phase: RwLock::new(CollectorPhase::Idle),
            last_watermark: RwLock::new(None),
            ready: AtomicBool::new(false),
        }
    }

    /// Collector configuration.
    #[must_use]
    pub const fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Shared metrics sink.
    #[must_use]
    pub fn metrics(&self) -> &Arc<MetricsSink> {
        &self.metrics
    }

    /// Shared dedup cache.
    #[must_use]
    pub fn dedup(&self) -> &Arc<DedupCache> {
        &self.dedup
    }

    /// Whether a cycle has completed without error.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    /// Whether ticks can do any work.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.config.enabled && !self.config.selection.is_empty()
    }

    /// Snapshot of collector state.
    #[must_use]
    pub fn stats(&self) -> CollectorStats {
        let configured_tickers = match &self.config.selection {
            InstrumentSelection::Specific(symbols) => symbols.clone(),
            InstrumentSelection::All => Vec::new(),
        };
        CollectorStats {
            enabled: self.config.enabled,
            mode: self.config.selection.mode_str(),
            configured_tickers,
            phase: *self.phase.read(),
            last_watermark: *self.last_watermark.read(),
            processed_trades: self.dedup.stats(),
        }
    }

    /// Startup work: log the configuration and, when following all
    /// instruments, publish their metadata once.
    pub async fn initialize(&self) {
        if !self.config.enabled {
            tracing::info!("Trade collector is disabled");
            return;
        }

        tracing::info!(
            selection = self.config.selection.mode_str(),
            batch_size = self.config.batch_size,
            max_gap_secs = self.config.max_gap.num_seconds(),
            "Initializing trade collector"
        );

        match &self.config.selection {
            InstrumentSelection::All => self.publish_securities().await,
            InstrumentSelection::Specific(symbols) if symbols.is_empty() => {
                tracing::warn!("No instruments configured for specific mode; collector will idle");
            }
            InstrumentSelection::Specific(symbols) => {
                tracing::info!(tickers = ?symbols, "Collecting specific instruments");
            }
        }
    }

    /// Run one cycle. Never fails: errors are logged and counted.
    pub async fn tick(&self) -> TickOutcome {
        let _guard = self.tick_lock.lock().await;

        if !self.is_active() {
            *self.phase.write() = CollectorPhase::Idle;
            return TickOutcome::Idle;
        }

        let now = self.clock.now();
        let cursor = self.store.load(now).await;
        let mode = cursor.mode();
        *self.phase.write() = mode.into();

        let calls_before = self.source.requests_issued();

        let result = match mode {
            CollectionMode::Backfill => self.run_backfill(cursor, now).await,
            CollectionMode::Incremental => self.run_incremental(cursor, now).await,
        };

        match result {
            Ok(outcome) => {
                self.ready.store(true, Ordering::Relaxed);
                if let TickOutcome::Backfilled { .. } = outcome {
                    *self.phase.write() = CollectorPhase::Incremental;
                }
                outcome
            }
            Err(e) => {
                let api_calls = self.source.requests_issued() - calls_before;
                self.metrics.record_error(api_calls);
                tracing::error!(
                    mode = mode.as_str(),
                    error = %e,
                    "Collection cycle failed; cursor left unchanged"
                );
                TickOutcome::Failed
            }
        }
    }

    /// Tick on a fixed delay until `shutdown` fires. The in-flight tick
    /// always runs to completion.
    pub async fn run(&self, shutdown: CancellationToken) {
        self.initialize().await;

        let mut last_metrics_log = Instant::now();
        loop {
            self.tick().await;

            if let Some(every) = self.config.metrics_log_interval {
                if last_metrics_log.elapsed() >= every {
                    self.metrics.log_snapshot();
                    last_metrics_log = Instant::now();
                }
            }

            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(self.config.interval) => {}
            }
        }

        tracing::info!("Trade collector stopped");
    }

    /// Replace the persisted cursor with a fresh start-of-day cursor.
    ///
    /// # Errors
    ///
    /// Returns `CursorStoreError` if the fresh cursor cannot be saved.
    pub async fn reset_cursor(&self) -> Result<(), CursorStoreError> {
        let _guard = self.tick_lock.lock().await;
        let cursor = self.store.reset(self.clock.now()).await?;
        *self.last_watermark.write() = Some(cursor.last_watermark());
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Modes
    // -------------------------------------------------------------------------

    async fn run_backfill(
        &self,
        mut cursor: crate::domain::cursor::ProgressCursor,
        now: NaiveDateTime,
    ) -> Result<TickOutcome, CycleError> {
        let Some(window) = CollectionWindow::backfill(cursor.last_watermark(), now) else {
            let cursor = self.store.mark_backfill_complete(now).await?;
            *self.last_watermark.write() = Some(cursor.last_watermark());
            tracing::info!("Backfill range empty; switching to incremental");
            return Ok(TickOutcome::Backfilled {
                published: 0,
                watermark: cursor.last_watermark(),
            });
        };

        self.metrics.start_cycle();
        tracing::info!(
            from = %window.from,
            till = %window.till,
            span_secs = window.span().num_seconds(),
            "Starting backfill"
        );

        let mut tally = PublishTally::default();
        let mut summary = DrainSummary::default();
        for scope in self.config.selection.scopes() {
            let drained = self
                .source
                .drain_range(&scope, window, self.config.batch_size, |batch| {
                    let batch_tally = self.publish_trades(batch.iter());
                    tally.published += batch_tally.published;
                    tally.failed += batch_tally.failed;
                })
                .await?;
            tracing::info!(scope = %scope, records = drained.records, "Backfill scope drained");
            summary.merge(drained);
        }

        cursor.advance_watermark(now, now);
        cursor.record_stats(tally.published, 1, now);
        cursor.mark_backfill_complete(now);
        self.store.save(&cursor).await?;
        *self.last_watermark.write() = Some(cursor.last_watermark());

        self.metrics.record_publish_failures(tally.failed);
        self.metrics.end_cycle(CycleStats {
            mode: CollectionMode::Backfill,
            records: tally.published,
            duplicates: 0,
            api_calls: summary.pages,
            skipped: summary.skipped,
        });
        tracing::info!(
            published = tally.published,
            watermark = %cursor.last_watermark(),
            "Backfill complete; switching to incremental"
        );

        Ok(TickOutcome::Backfilled {
            published: tally.published,
            watermark: cursor.last_watermark(),
        })
    }

    async fn run_incremental(
        &self,
        mut cursor: crate::domain::cursor::ProgressCursor,
        now: NaiveDateTime,
    ) -> Result<TickOutcome, CycleError> {
        let Some(window) =
            CollectionWindow::incremental(cursor.last_watermark(), now, self.config.max_gap)
        else {
            tracing::trace!(watermark = %cursor.last_watermark(), "Watermark caught up");
            return Ok(TickOutcome::CaughtUp);
        };

        self.metrics.start_cycle();
        tracing::debug!(
            from = %window.from,
            till = %window.till,
            span_secs = window.span().num_seconds(),
            "Collecting window"
        );

        let mut fetched = Vec::new();
        let mut summary = DrainSummary::default();
        for scope in self.config.selection.scopes() {
            let (records, drained) = self
                .source
                .collect_all(&scope, window, self.config.batch_size)
                .await?;
            fetched.extend(records);
            summary.merge(drained);
        }

        let fresh = self.dedup.filter_new(&fetched);
        let duplicates = (fetched.len() - fresh.len()) as u64;
        let tally = self.publish_trades(fresh);

        if fetched.is_empty() {
            tracing::debug!(from = %window.from, till = %window.till, "No trades in window");
        } else if tally.published == 0 && tally.failed == 0 {
            tracing::debug!(duplicates, "No new trades in window");
        }

        cursor.advance_watermark(window.till, now);
        cursor.record_stats(tally.published, 1, now);
        self.store.save(&cursor).await?;
        *self.last_watermark.write() = Some(cursor.last_watermark());

        self.metrics.record_publish_failures(tally.failed);
        self.metrics.end_cycle(CycleStats {
            mode: CollectionMode::Incremental,
            records: tally.published,
            duplicates,
            api_calls: summary.pages,
            skipped: summary.skipped,
        });

        Ok(TickOutcome::Collected {
            fetched: fetched.len() as u64,
            published: tally.published,
            duplicates,
            watermark: cursor.last_watermark(),
        })
    }

    // -------------------------------------------------------------------------
    // Publishing
    // -------------------------------------------------------------------------

    /// Publish each record and mark it seen once the bus accepts it.
    fn publish_trades<'a, I>(&self, records: I) -> PublishTally
    where
        I: IntoIterator<Item = &'a TradeRecord>,
    {
        let mut tally = PublishTally::default();
        for record in records {
            let sent = BusMessage::trade(&self.config.trades_topic, record)
                .and_then(|message| self.bus.publish(message));
            match sent {
                Ok(()) => {
                    self.dedup.mark_seen(&record.instrument, record.seq);
                    tally.published += 1;
                    tracing::trace!(key = %record.key(), "Published trade");
                }
                Err(e) => {
                    tally.failed += 1;
                    tracing::warn!(key = %record.key(), error = %e, "Failed to publish trade");
                }
            }
        }
        tally
    }

    async fn publish_securities(&self) {
        let securities = match self.source.fetch_securities().await {
            Ok(securities) => securities,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load available securities");
                return;
            }
        };

        let mut failed = 0u64;
        for security in &securities {
            let sent = BusMessage::security(&self.config.instruments_topic, security)
                .and_then(|message| self.bus.publish(message));
            if let Err(e) = sent {
                failed += 1;
                tracing::warn!(secid = %security.security_id, error = %e, "Failed to publish security");
            }
        }
        self.metrics.record_publish_failures(failed);

        tracing::info!(
            securities = securities.len(),
            failed,
            "Published instrument metadata"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{
        MockBusPublisherPort, NoOpBusPublisher, PageRequest, PublishError, TradePage,
    };
    use crate::domain::collection::FetchScope;
    use crate::domain::cursor::ProgressCursor;
    use crate::domain::trade::{Security, TradeSide};
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::persistence::InMemoryCursorStore;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use parking_lot::Mutex as SyncMutex;
    use rust_decimal::Decimal;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn trade(instrument: &str, seq: u64) -> TradeRecord {
        TradeRecord {
            instrument: instrument.to_string(),
            seq,
            board_id: "TQBR".to_string(),
            timestamp: at(10, 1, 0),
            price: Decimal::new(30_000, 2),
            quantity: 1,
            value: Decimal::new(30_000, 2),
            side: TradeSide::Buy,
            period: None,
            trading_session: None,
            system_time: None,
            ts_offset: None,
        }
    }

    /// Serves a fixed record list by offset; optionally fails every request
    /// or only the request at one offset.
    #[derive(Default)]
    struct FakeSource {
        records: Vec<TradeRecord>,
        securities: Vec<Security>,
        failing: AtomicBool,
        fail_at_offset: SyncMutex<Option<usize>>,
        requests: SyncMutex<Vec<PageRequest>>,
    }

    impl FakeSource {
        fn with_records(records: Vec<TradeRecord>) -> Self {
            Self {
                records,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl TradeSourcePort for FakeSource {
        async fn fetch_trades(&self, request: &PageRequest) -> Result<TradePage, SourceError> {
            self.requests.lock().push(request.clone());
            if self.failing.load(Ordering::Relaxed)
                || *self.fail_at_offset.lock() == Some(request.offset)
            {
                return Err(SourceError::Status { status: 503 });
            }
            let matching: Vec<TradeRecord> = self
                .records
                .iter()
                .filter(|r| match &request.scope {
                    FetchScope::All => true,
                    FetchScope::Instrument(secid) => &r.instrument == secid,
                })
                .cloned()
                .collect();
            let page = matching
                .into_iter()
                .skip(request.offset)
                .take(request.limit)
                .collect();
            Ok(TradePage::new(page))
        }

        async fn fetch_securities(&self) -> Result<Vec<Security>, SourceError> {
            Ok(self.securities.clone())
        }
    }

    struct Harness {
        collector: Collector,
        source: Arc<FakeSource>,
        store: Arc<InMemoryCursorStore>,
        clock: Arc<ManualClock>,
    }

    fn harness(
        config: CollectorConfig,
        source: FakeSource,
        bus: Arc<dyn BusPublisherPort>,
        cursor: Option<ProgressCursor>,
        now: NaiveDateTime,
    ) -> Harness {
        let source = Arc::new(source);
        let store = Arc::new(cursor.map_or_else(InMemoryCursorStore::new, InMemoryCursorStore::with_cursor));
        let clock = Arc::new(ManualClock::new(now));
        let collector = Collector::new(
            config,
            CollectorPorts {
                source: Arc::clone(&source) as Arc<dyn TradeSourcePort>,
                store: Arc::clone(&store) as Arc<dyn CursorStorePort>,
                bus,
                clock: Arc::clone(&clock) as Arc<dyn ClockPort>,
            },
            Arc::new(RateLimiter::new(Duration::from_millis(1))),
            Arc::new(DedupCache::default()),
            Arc::new(MetricsSink::new()),
        );
        Harness {
            collector,
            source,
            store,
            clock,
        }
    }

    fn specific(symbols: &[&str]) -> CollectorConfig {
        CollectorConfig {
            selection: InstrumentSelection::Specific(
                symbols.iter().map(ToString::to_string).collect(),
            ),
            ..CollectorConfig::default()
        }
    }

    fn incremental_cursor(watermark: NaiveDateTime) -> ProgressCursor {
        let mut cursor = ProgressCursor::new(watermark, watermark);
        cursor.mark_backfill_complete(watermark);
        cursor
    }

    #[tokio::test(start_paused = true)]
    async fn incremental_filters_duplicates_and_advances() {
        let source = FakeSource::with_records(vec![
            trade("SBER", 1),
            trade("SBER", 2),
            trade("SBER", 3),
        ]);
        let mut bus = MockBusPublisherPort::new();
        bus.expect_publish()
            .withf(|m| m.topic == "moex.trades" && m.key != "SBER:2")
            .times(2)
            .returning(|_| Ok(()));

        let h = harness(
            specific(&["SBER"]),
            source,
            Arc::new(bus),
            Some(incremental_cursor(at(10, 0, 0))),
            at(10, 30, 0),
        );
        h.collector.dedup().mark_seen("SBER", 2);

        let outcome = h.collector.tick().await;

        assert_eq!(
            outcome,
            TickOutcome::Collected {
                fetched: 3,
                published: 2,
                duplicates: 1,
                watermark: at(10, 5, 0),
            }
        );
        let cursor = h.store.current().unwrap();
        assert_eq!(cursor.last_watermark(), at(10, 5, 0));
        assert_eq!(cursor.total_records_collected(), 2);
        assert_eq!(h.collector.metrics().snapshot().total_duplicates_filtered, 1);
        assert!(!h.collector.dedup().is_new("SBER", 3));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_window_still_advances() {
        let h = harness(
            specific(&["SBER"]),
            FakeSource::default(),
            Arc::new(NoOpBusPublisher),
            Some(incremental_cursor(at(10, 0, 0))),
            at(10, 2, 0),
        );

        let outcome = h.collector.tick().await;

        assert!(matches!(outcome, TickOutcome::Collected { fetched: 0, .. }));
        assert_eq!(h.store.current().unwrap().last_watermark(), at(10, 2, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn all_duplicate_window_still_advances() {
        let mut bus = MockBusPublisherPort::new();
        bus.expect_publish().never();
        let h = harness(
            specific(&["SBER"]),
            FakeSource::with_records(vec![trade("SBER", 7)]),
            Arc::new(bus),
            Some(incremental_cursor(at(10, 0, 0))),
            at(10, 1, 0),
        );
        h.collector.dedup().mark_seen("SBER", 7);

        let outcome = h.collector.tick().await;

        assert!(matches!(
            outcome,
            TickOutcome::Collected { published: 0, duplicates: 1, .. }
        ));
        assert_eq!(h.store.current().unwrap().last_watermark(), at(10, 1, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn long_pause_is_caught_up_in_max_gap_steps() {
        let h = harness(
            specific(&["SBER"]),
            FakeSource::default(),
            Arc::new(NoOpBusPublisher),
            Some(incremental_cursor(at(10, 0, 0))),
            at(10, 12, 0),
        );

        h.collector.tick().await;
        assert_eq!(h.store.current().unwrap().last_watermark(), at(10, 5, 0));
        h.collector.tick().await;
        assert_eq!(h.store.current().unwrap().last_watermark(), at(10, 10, 0));
        h.collector.tick().await;
        assert_eq!(h.store.current().unwrap().last_watermark(), at(10, 12, 0));
        assert_eq!(h.collector.tick().await, TickOutcome::CaughtUp);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_error_leaves_cursor_untouched() {
        let source = FakeSource::with_records(vec![trade("SBER", 1)]);
        source.failing.store(true, Ordering::Relaxed);
        let initial = incremental_cursor(at(10, 0, 0));
        let h = harness(
            specific(&["SBER"]),
            source,
            Arc::new(NoOpBusPublisher),
            Some(initial.clone()),
            at(10, 3, 0),
        );

        assert_eq!(h.collector.tick().await, TickOutcome::Failed);
        assert_eq!(h.store.current().unwrap(), initial);
        assert_eq!(h.collector.metrics().snapshot().total_errors, 1);
        assert!(!h.collector.is_ready());

        h.source.failing.store(false, Ordering::Relaxed);
        assert!(matches!(
            h.collector.tick().await,
            TickOutcome::Collected { published: 1, .. }
        ));
        assert!(h.collector.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn backfill_drains_then_switches_mode() {
        let records: Vec<TradeRecord> = (0..12_000).map(|seq| trade("SBER", seq)).collect();
        let h = harness(
            CollectorConfig {
                selection: InstrumentSelection::All,
                ..CollectorConfig::default()
            },
            FakeSource::with_records(records),
            Arc::new(NoOpBusPublisher),
            None,
            at(13, 0, 0),
        );

        let outcome = h.collector.tick().await;

        assert_eq!(
            outcome,
            TickOutcome::Backfilled {
                published: 12_000,
                watermark: at(13, 0, 0),
            }
        );
        let offsets: Vec<usize> = h.source.requests.lock().iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![0, 5000, 10_000]);

        let cursor = h.store.current().unwrap();
        assert!(cursor.backfill_complete());
        assert_eq!(cursor.last_watermark(), at(13, 0, 0));
        assert_eq!(cursor.total_records_collected(), 12_000);
        assert_eq!(h.collector.stats().phase, CollectorPhase::Incremental);
    }

    #[tokio::test(start_paused = true)]
    async fn backfill_failure_is_retried_from_scratch() {
        let source = FakeSource::with_records(vec![trade("SBER", 1)]);
        source.failing.store(true, Ordering::Relaxed);
        let h = harness(
            specific(&["SBER"]),
            source,
            Arc::new(NoOpBusPublisher),
            None,
            at(9, 0, 0),
        );

        assert_eq!(h.collector.tick().await, TickOutcome::Failed);
        assert!(h.store.current().is_none());

        h.source.failing.store(false, Ordering::Relaxed);
        h.clock.advance(chrono::Duration::seconds(3));
        let outcome = h.collector.tick().await;

        assert!(matches!(outcome, TickOutcome::Backfilled { published: 1, .. }));
        let requests = h.source.requests.lock();
        assert_eq!(requests.last().unwrap().from, Some(at(0, 0, 0)));
        assert_eq!(requests.last().unwrap().offset, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn backfill_failing_on_last_page_restarts_at_offset_zero() {
        let records: Vec<TradeRecord> = (0..12_000).map(|seq| trade("SBER", seq)).collect();
        let source = FakeSource::with_records(records);
        *source.fail_at_offset.lock() = Some(10_000);
        let h = harness(
            CollectorConfig {
                selection: InstrumentSelection::All,
                ..CollectorConfig::default()
            },
            source,
            Arc::new(NoOpBusPublisher),
            None,
            at(13, 0, 0),
        );

        assert_eq!(h.collector.tick().await, TickOutcome::Failed);
        assert!(h.store.current().is_none());
        let offsets: Vec<usize> = h.source.requests.lock().iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![0, 5000, 10_000]);

        *h.source.fail_at_offset.lock() = None;
        h.source.requests.lock().clear();
        let outcome = h.collector.tick().await;

        assert!(matches!(outcome, TickOutcome::Backfilled { published: 12_000, .. }));
        let offsets: Vec<usize> = h.source.requests.lock().iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![0, 5000, 10_000]);
        let cursor = h.store.current().unwrap();
        assert!(cursor.backfill_complete());
        assert_eq!(cursor.last_watermark(), at(13, 0, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_without_a_window_do_not_open_a_cycle() {
        let caught_up = harness(
            specific(&["SBER"]),
            FakeSource::default(),
            Arc::new(NoOpBusPublisher),
            Some(incremental_cursor(at(10, 0, 0))),
            at(10, 0, 0),
        );
        assert_eq!(caught_up.collector.tick().await, TickOutcome::CaughtUp);
        assert!(caught_up.collector.metrics().snapshot().last_cycle_started_at.is_none());

        let empty_backfill = harness(
            specific(&["SBER"]),
            FakeSource::default(),
            Arc::new(NoOpBusPublisher),
            Some(ProgressCursor::new(at(10, 0, 0), at(10, 0, 0))),
            at(10, 0, 0),
        );
        assert!(matches!(
            empty_backfill.collector.tick().await,
            TickOutcome::Backfilled { published: 0, .. }
        ));
        assert!(empty_backfill.collector.metrics().snapshot().last_cycle_started_at.is_none());
        assert!(empty_backfill.source.requests.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn backfill_does_not_filter_duplicates() {
        let mut bus = MockBusPublisherPort::new();
        bus.expect_publish().times(2).returning(|_| Ok(()));
        let h = harness(
            specific(&["SBER"]),
            FakeSource::with_records(vec![trade("SBER", 1), trade("SBER", 2)]),
            Arc::new(bus),
            None,
            at(9, 0, 0),
        );
        h.collector.dedup().mark_seen("SBER", 1);

        let outcome = h.collector.tick().await;

        assert!(matches!(outcome, TickOutcome::Backfilled { published: 2, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn specific_mode_fetches_each_instrument() {
        let h = harness(
            specific(&["SBER", "GAZP"]),
            FakeSource::with_records(vec![trade("SBER", 1), trade("GAZP", 1)]),
            Arc::new(NoOpBusPublisher),
            Some(incremental_cursor(at(10, 0, 0))),
            at(10, 1, 0),
        );

        let outcome = h.collector.tick().await;

        assert!(matches!(outcome, TickOutcome::Collected { published: 2, .. }));
        let scopes: Vec<FetchScope> = h.source.requests.lock().iter().map(|r| r.scope.clone()).collect();
        assert_eq!(
            scopes,
            vec![
                FetchScope::Instrument("SBER".to_string()),
                FetchScope::Instrument("GAZP".to_string())
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn publish_failure_does_not_fail_cycle() {
        let mut bus = MockBusPublisherPort::new();
        bus.expect_publish().returning(|m| {
            Err(PublishError::NoSubscribers { topic: m.topic })
        });
        let h = harness(
            specific(&["SBER"]),
            FakeSource::with_records(vec![trade("SBER", 1)]),
            Arc::new(bus),
            Some(incremental_cursor(at(10, 0, 0))),
            at(10, 1, 0),
        );

        let outcome = h.collector.tick().await;

        assert!(matches!(
            outcome,
            TickOutcome::Collected { fetched: 1, published: 0, .. }
        ));
        assert_eq!(h.store.current().unwrap().last_watermark(), at(10, 1, 0));
        assert_eq!(h.collector.metrics().snapshot().total_publish_failures, 1);
        assert!(h.collector.dedup().is_new("SBER", 1));
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_or_empty_collector_idles() {
        let disabled = harness(
            CollectorConfig {
                enabled: false,
                ..specific(&["SBER"])
            },
            FakeSource::default(),
            Arc::new(NoOpBusPublisher),
            None,
            at(10, 0, 0),
        );
        assert_eq!(disabled.collector.tick().await, TickOutcome::Idle);

        let empty = harness(
            specific(&[]),
            FakeSource::default(),
            Arc::new(NoOpBusPublisher),
            None,
            at(10, 0, 0),
        );
        empty.collector.initialize().await;
        assert_eq!(empty.collector.tick().await, TickOutcome::Idle);
        assert!(empty.source.requests.lock().is_empty());
        assert!(empty.store.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn all_mode_publishes_securities_on_startup() {
        let source = FakeSource {
            securities: vec![Security {
                security_id: "SBER".to_string(),
                board_id: "TQBR".to_string(),
                short_name: None,
                security_name: None,
                prev_price: None,
                lot_size: Some(10),
                face_value: None,
                status: None,
                market_price: None,
                currency_id: None,
            }],
            ..FakeSource::default()
        };
        let mut bus = MockBusPublisherPort::new();
        bus.expect_publish()
            .withf(|m| m.topic == "moex.instruments" && m.key == "SBER")
            .times(1)
            .returning(|_| Ok(()));
        let h = harness(
            CollectorConfig {
                selection: InstrumentSelection::All,
                ..CollectorConfig::default()
            },
            source,
            Arc::new(bus),
            None,
            at(10, 0, 0),
        );

        h.collector.initialize().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reset_cursor_restarts_backfill() {
        let h = harness(
            specific(&["SBER"]),
            FakeSource::default(),
            Arc::new(NoOpBusPublisher),
            Some(incremental_cursor(at(10, 0, 0))),
            at(10, 1, 0),
        );

        h.collector.reset_cursor().await.unwrap();

        let cursor = h.store.current().unwrap();
        assert!(!cursor.backfill_complete());
        assert_eq!(cursor.last_watermark(), at(0, 0, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_cancellation() {
        let h = harness(
            specific(&["SBER"]),
            FakeSource::default(),
            Arc::new(NoOpBusPublisher),
            Some(incremental_cursor(at(10, 0, 0))),
            at(10, 1, 0),
        );
        let collector = Arc::new(h.collector);
        let shutdown = CancellationToken::new();

        let task = tokio::spawn({
            let collector = Arc::clone(&collector);
            let shutdown = shutdown.clone();
            async move { collector.run(shutdown).await }
        });

        tokio::time::sleep(Duration::from_millis(7000)).await;
        shutdown.cancel();
        task.await.unwrap();

        assert!(collector.metrics().snapshot().total_cycles_completed >= 1);
        assert_eq!(h.store.current().unwrap().last_watermark(), at(10, 1, 0));
    }
}
