//! Progress Cursor
//!
//! The durable record of "where did we leave off". A single cursor is
//! persisted and overwritten in place after every successful cycle.
//!
//! # Invariants
//!
//! - `last_watermark` never moves backward.
//! - A fresh cursor starts at the beginning of the current exchange day with
//!   backfill pending.

use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::domain::collection::CollectionMode;

/// Durable collection progress.
///
/// Serialized field names (`lastWatermark`, `backfillComplete`, ...) are part
/// of the on-disk format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressCursor {
    last_watermark: NaiveDateTime,
    backfill_complete: bool,
    total_records_collected: u64,
    total_cycles_completed: u64,
    last_updated: NaiveDateTime,
}

impl ProgressCursor {
    /// Create a cursor at `last_watermark` with backfill pending.
    #[must_use]
    pub const fn new(last_watermark: NaiveDateTime, now: NaiveDateTime) -> Self {
        Self {
            last_watermark,
            backfill_complete: false,
            total_records_collected: 0,
            total_cycles_completed: 0,
            last_updated: now,
        }
    }

    /// Create the default cursor: start of the day containing `now`.
    #[must_use]
    pub fn start_of_day(now: NaiveDateTime) -> Self {
        Self::new(now.date().and_time(NaiveTime::MIN), now)
    }

    /// Timestamp up to which data is considered collected.
    #[must_use]
    pub const fn last_watermark(&self) -> NaiveDateTime {
        self.last_watermark
    }

    /// Whether the one-time backfill has finished.
    #[must_use]
    pub const fn backfill_complete(&self) -> bool {
        self.backfill_complete
    }

    /// Cumulative records published across all process lifetimes.
    #[must_use]
    pub const fn total_records_collected(&self) -> u64 {
        self.total_records_collected
    }

    /// Cumulative successful cycles across all process lifetimes.
    #[must_use]
    pub const fn total_cycles_completed(&self) -> u64 {
        self.total_cycles_completed
    }

    /// Time of the last mutation.
    #[must_use]
    pub const fn last_updated(&self) -> NaiveDateTime {
        self.last_updated
    }

    /// Collection mode implied by this cursor.
    #[must_use]
    pub const fn mode(&self) -> CollectionMode {
        if self.backfill_complete {
            CollectionMode::Incremental
        } else {
            CollectionMode::Backfill
        }
    }

    /// Move the watermark forward to `watermark`.
    ///
    /// A target at or behind the current watermark leaves it unchanged.
    /// Returns `true` if the watermark moved.
    pub fn advance_watermark(&mut self, watermark: NaiveDateTime, now: NaiveDateTime) -> bool {
        self.last_updated = now;
        if watermark > self.last_watermark {
            self.last_watermark = watermark;
            true
        } else {
            false
        }
    }

    /// Accumulate cycle statistics.
    pub const fn record_stats(&mut self, records: u64, cycles: u64, now: NaiveDateTime) {
        self.total_records_collected = self.total_records_collected.saturating_add(records);
        self.total_cycles_completed = self.total_cycles_completed.saturating_add(cycles);
        self.last_updated = now;
    }

    /// Flip the cursor into incremental mode.
    pub const fn mark_backfill_complete(&mut self, now: NaiveDateTime) {
        self.backfill_complete = true;
        self.last_updated = now;
    }
}
