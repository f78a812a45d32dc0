//! Clock adapters.
//!
//! The exchange reports and filters trades in local time (Moscow, UTC+3, no
//! DST), so watermarks are kept as naive exchange-local timestamps.

use chrono::{FixedOffset, NaiveDateTime, Offset, Utc};
use parking_lot::RwLock;

use crate::application::ports::ClockPort;

/// Default exchange offset from UTC, in hours.
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 3;

/// Wall clock shifted to the exchange's fixed UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct ExchangeClock {
    offset: FixedOffset,
}

impl Default for ExchangeClock {
    fn default() -> Self {
        Self::from_offset_hours(DEFAULT_UTC_OFFSET_HOURS)
    }
}

impl ExchangeClock {
    /// Clock at a fixed offset.
    #[must_use]
    pub const fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Clock at `hours` east of UTC. Out-of-range offsets fall back to UTC.
    #[must_use]
    pub fn from_offset_hours(hours: i32) -> Self {
        let offset = hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix());
        Self { offset }
    }

    /// Configured offset.
    #[must_use]
    pub const fn offset(&self) -> FixedOffset {
        self.offset
    }
}

impl ClockPort for ExchangeClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.offset).naive_local()
    }
}

/// Manually driven clock for tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<NaiveDateTime>,
}

impl ManualClock {
    /// Clock frozen at `now`.
    #[must_use]
    pub const fn new(now: NaiveDateTime) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    /// Jump to `now`.
    pub fn set(&self, now: NaiveDateTime) {
        *self.now.write() = now;
    }

    /// Move forward by `by`.
    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.write();
        *now += by;
    }
}

impl ClockPort for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.read()
    }
}
