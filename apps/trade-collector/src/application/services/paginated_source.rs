//! Paginated Source
//!
//! Page-at-a-time access to the upstream trades API, rate limited on every
//! request. Two shapes are built on the single-page primitive:
//!
//! - `drain_range`: streams each non-empty page to a callback before asking
//!   for the next, so a backfill never holds the full range in memory.
//! - `collect_all`: gathers every page of a range into one vector.
//!
//! Offsets are zero-based row counts. A drain stops at the first page
//! shorter than the batch size; an exact multiple therefore costs one extra
//! request that comes back empty. There is no mid-drain checkpoint: a failed
//! drain restarts at offset 0.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::application::ports::{PageRequest, SourceError, TradePage, TradeSourcePort};
use crate::application::services::RateLimiter;
use crate::domain::collection::{CollectionWindow, FetchScope};
use crate::domain::trade::{Security, TradeRecord};

/// Totals for one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// Page requests issued.
    pub pages: u64,
    /// Non-empty batches delivered.
    pub batches: u64,
    /// Records delivered.
    pub records: u64,
    /// Rows skipped as malformed.
    pub skipped: u64,
}

impl DrainSummary {
    /// Fold another summary into this one.
    pub const fn merge(&mut self, other: Self) {
        self.pages += other.pages;
        self.batches += other.batches;
        self.records += other.records;
        self.skipped += other.skipped;
    }
}

/// Rate-limited pagination over a trade source.
pub struct PaginatedSource {
    source: Arc<dyn TradeSourcePort>,
    limiter: Arc<RateLimiter>,
    requests: AtomicU64,
}

impl std::fmt::Debug for PaginatedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaginatedSource")
            .field("limiter", &self.limiter)
            .field("requests", &self.requests)
            .finish_non_exhaustive()
    }
}

impl PaginatedSource {
    /// Wrap `source`, spacing requests through `limiter`.
    #[must_use]
    pub const fn new(source: Arc<dyn TradeSourcePort>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            source,
            limiter,
            requests: AtomicU64::new(0),
        }
    }

    /// Upstream requests issued so far, including failed ones.
    #[must_use]
    pub fn requests_issued(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Fetch one page.
    ///
    /// # Errors
    ///
    /// Propagates the upstream `SourceError`; nothing is retried here.
    pub async fn fetch_page(
        &self,
        scope: &FetchScope,
        window: Option<CollectionWindow>,
        limit: usize,
        offset: usize,
    ) -> Result<TradePage, SourceError> {
        self.throttle().await;

        let request = PageRequest {
            scope: scope.clone(),
            from: window.map(|w| w.from),
            till: window.map(|w| w.till),
            limit,
            offset,
        };
        let page = self.source.fetch_trades(&request).await?;

        if page.skipped > 0 {
            tracing::warn!(
                scope = %scope,
                offset,
                skipped = page.skipped,
                "Skipped malformed trade rows"
            );
        }
        tracing::debug!(
            scope = %scope,
            offset,
            limit,
            records = page.records.len(),
            "Fetched trade page"
        );

        Ok(page)
    }

    /// Page through `window`, handing each non-empty page to `on_batch`
    /// before requesting the next.
    ///
    /// # Errors
    ///
    /// Stops at the first failed page and returns its error. Batches already
    /// delivered stay delivered.
    pub async fn drain_range<F>(
        &self,
        scope: &FetchScope,
        window: CollectionWindow,
        batch_size: usize,
        mut on_batch: F,
    ) -> Result<DrainSummary, SourceError>
    where
        F: FnMut(Vec<TradeRecord>) + Send,
    {
        let batch_size = batch_size.max(1);
        let mut summary = DrainSummary::default();
        let mut offset = 0;

        loop {
            let page = self
                .fetch_page(scope, Some(window), batch_size, offset)
                .await?;
            let rows = page.row_count();
            summary.pages += 1;
            summary.skipped += page.skipped as u64;

            if !page.records.is_empty() {
                summary.batches += 1;
                summary.records += page.records.len() as u64;
                on_batch(page.records);
            }

            if rows < batch_size {
                break;
            }
            offset += batch_size;
        }

        tracing::debug!(
            scope = %scope,
            pages = summary.pages,
            records = summary.records,
            "Drained range"
        );
        Ok(summary)
    }

    /// Fetch every record in `window`.
    ///
    /// # Errors
    ///
    /// Returns the first page error; partial results are discarded.
    pub async fn collect_all(
        &self,
        scope: &FetchScope,
        window: CollectionWindow,
        batch_size: usize,
    ) -> Result<(Vec<TradeRecord>, DrainSummary), SourceError> {
        let mut records = Vec::new();
        let summary = self
            .drain_range(scope, window, batch_size, |batch| records.extend(batch))
            .await?;
        Ok((records, summary))
    }

    /// Wait for the limiter and count the request.
    async fn throttle(&self) {
        let waited = self.limiter.acquire().await;
        if !waited.is_zero() {
            tracing::trace!(
                waited_ms = waited.as_millis(),
                interval_ms = self.limiter.interval().as_millis(),
                "Rate limited"
            );
        }
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Fetch instrument metadata.
    ///
    /// # Errors
    ///
    /// Propagates the upstream `SourceError`.
    pub async fn fetch_securities(&self) -> Result<Vec<Security>, SourceError> {
        self.throttle().await;
        self.source.fetch_securities().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trade::TradeSide;
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveDateTime};
    use parking_lot::Mutex;
    use rust_decimal::Decimal;
    use std::time::Duration;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn window() -> CollectionWindow {
        CollectionWindow {
            from: at(10, 0),
            till: at(10, 5),
        }
    }

    fn trade(seq: u64) -> TradeRecord {
        TradeRecord {
            instrument: "SBER".to_string(),
            seq,
            board_id: "TQBR".to_string(),
            timestamp: at(10, 1),
            price: Decimal::ONE,
            quantity: 1,
            value: Decimal::ONE,
            side: TradeSide::Buy,
            period: None,
            trading_session: None,
            system_time: None,
            ts_offset: None,
        }
    }

    /// Serves `total` rows by offset, optionally flagging some as skipped.
    struct RowSource {
        total: usize,
        skipped_per_page: usize,
        fail_at_offset: Option<usize>,
        requests: Mutex<Vec<PageRequest>>,
    }

    impl RowSource {
        fn new(total: usize) -> Self {
            Self {
                total,
                skipped_per_page: 0,
                fail_at_offset: None,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TradeSourcePort for RowSource {
        async fn fetch_trades(&self, request: &PageRequest) -> Result<TradePage, SourceError> {
            self.requests.lock().push(request.clone());
            if self.fail_at_offset == Some(request.offset) {
                return Err(SourceError::Timeout);
            }
            let end = (request.offset + request.limit).min(self.total);
            let rows = end.saturating_sub(request.offset);
            let skipped = self.skipped_per_page.min(rows);
            let records = (request.offset + skipped..end)
                .map(|i| trade(i as u64))
                .collect();
            Ok(TradePage { records, skipped })
        }

        async fn fetch_securities(&self) -> Result<Vec<Security>, SourceError> {
            Ok(Vec::new())
        }
    }

    fn paginated(source: Arc<RowSource>) -> PaginatedSource {
        PaginatedSource::new(source, Arc::new(RateLimiter::new(Duration::from_millis(1000))))
    }

    #[tokio::test(start_paused = true)]
    async fn short_final_page_ends_drain() {
        let source = Arc::new(RowSource::new(12_000));
        let paginated = paginated(Arc::clone(&source));
        let mut sizes = Vec::new();

        let summary = paginated
            .drain_range(&FetchScope::All, window(), 5000, |batch| sizes.push(batch.len()))
            .await
            .unwrap();

        assert_eq!(sizes, vec![5000, 5000, 2000]);
        assert_eq!(summary.pages, 3);
        assert_eq!(paginated.requests_issued(), 3);
        assert_eq!(summary.records, 12_000);
        let offsets: Vec<usize> = source.requests.lock().iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![0, 5000, 10_000]);
    }

    #[tokio::test(start_paused = true)]
    async fn exact_multiple_needs_one_empty_page() {
        for k in 1..=3usize {
            let source = Arc::new(RowSource::new(k * 100));
            let paginated = paginated(Arc::clone(&source));
            let mut batches = 0;

            let summary = paginated
                .drain_range(&FetchScope::All, window(), 100, |_| batches += 1)
                .await
                .unwrap();

            assert_eq!(summary.pages, k as u64 + 1);
            assert_eq!(batches, k);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn empty_range_makes_one_request() {
        let source = Arc::new(RowSource::new(0));
        let paginated = paginated(Arc::clone(&source));
        let mut called = false;

        let summary = paginated
            .drain_range(&FetchScope::All, window(), 100, |_| called = true)
            .await
            .unwrap();

        assert_eq!(summary.pages, 1);
        assert!(!called);
    }

    #[tokio::test(start_paused = true)]
    async fn skipped_rows_do_not_shorten_pages() {
        let source = Arc::new(RowSource {
            skipped_per_page: 1,
            ..RowSource::new(200)
        });
        let paginated = paginated(Arc::clone(&source));

        let (records, summary) = paginated
            .collect_all(&FetchScope::All, window(), 100)
            .await
            .unwrap();

        assert_eq!(summary.pages, 3);
        assert_eq!(summary.skipped, 2);
        assert_eq!(records.len(), 198);
    }

    #[tokio::test(start_paused = true)]
    async fn page_error_propagates() {
        let source = Arc::new(RowSource {
            fail_at_offset: Some(100),
            ..RowSource::new(500)
        });
        let paginated = paginated(Arc::clone(&source));
        let mut delivered = 0;

        let result = paginated
            .drain_range(&FetchScope::All, window(), 100, |batch| delivered += batch.len())
            .await;

        assert!(matches!(result, Err(SourceError::Timeout)));
        assert_eq!(delivered, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn requests_carry_scope_and_window() {
        let source = Arc::new(RowSource::new(3));
        let paginated = paginated(Arc::clone(&source));
        let scope = FetchScope::Instrument("SBER".to_string());

        paginated.collect_all(&scope, window(), 50).await.unwrap();

        let requests = source.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].scope, scope);
        assert_eq!(requests[0].from, Some(at(10, 0)));
        assert_eq!(requests[0].till, Some(at(10, 5)));
        assert_eq!(requests[0].limit, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn pages_are_rate_limited() {
        let source = Arc::new(RowSource::new(250));
        let paginated = paginated(Arc::clone(&source));
        let start = tokio::time::Instant::now();

        paginated
            .collect_all(&FetchScope::All, window(), 100)
            .await
            .unwrap();

        assert!(start.elapsed() >= Duration::from_millis(2000));
    }
}
