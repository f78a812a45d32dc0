//! Cursor Store Port (Driven Port)
//!
//! Durable storage for the single progress cursor.
//!
//! `load` never fails: a missing or unreadable cursor degrades to a fresh
//! start-of-day cursor. `save` reports failures so the caller can log them.
//! The read-modify-write helpers are not transactional; all cursor mutation
//! must go through a single writer.

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::domain::cursor::ProgressCursor;

/// Cursor persistence error.
#[derive(Debug, thiserror::Error)]
pub enum CursorStoreError {
    /// Filesystem failure.
    #[error("Cursor I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Cursor could not be encoded.
    #[error("Cursor serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Port for cursor persistence.
#[async_trait]
pub trait CursorStorePort: Send + Sync {
    /// Load the persisted cursor, or a start-of-day default for `now`.
    async fn load(&self, now: NaiveDateTime) -> ProgressCursor;

    /// Overwrite the persisted cursor.
    async fn save(&self, cursor: &ProgressCursor) -> Result<(), CursorStoreError>;

    /// Move the persisted watermark forward.
    async fn advance_watermark(
        &self,
        watermark: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Result<ProgressCursor, CursorStoreError> {
        let mut cursor = self.load(now).await;
        cursor.advance_watermark(watermark, now);
        self.save(&cursor).await?;
        Ok(cursor)
    }

    /// Accumulate persisted statistics.
    async fn record_stats(
        &self,
        records: u64,
        cycles: u64,
        now: NaiveDateTime,
    ) -> Result<ProgressCursor, CursorStoreError> {
        let mut cursor = self.load(now).await;
        cursor.record_stats(records, cycles, now);
        self.save(&cursor).await?;
        Ok(cursor)
    }

    /// Persist the backfill-complete flag.
    async fn mark_backfill_complete(
        &self,
        now: NaiveDateTime,
    ) -> Result<ProgressCursor, CursorStoreError> {
        let mut cursor = self.load(now).await;
        cursor.mark_backfill_complete(now);
        self.save(&cursor).await?;
        Ok(cursor)
    }

    /// Replace the persisted cursor with a fresh start-of-day cursor.
    ///
    /// This re-enables backfill for the current day.
    async fn reset(&self, now: NaiveDateTime) -> Result<ProgressCursor, CursorStoreError> {
        let cursor = ProgressCursor::start_of_day(now);
        self.save(&cursor).await?;
        tracing::warn!(watermark = %cursor.last_watermark(), "Cursor has been reset");
        Ok(cursor)
    }
}
