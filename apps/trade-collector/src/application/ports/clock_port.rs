//! Clock Port (Driven Port)
//!
//! Source of exchange-local wall-clock time. Watermarks, windows and the
//! start-of-day default are all expressed in exchange-local time.

use chrono::NaiveDateTime;

/// Port for reading the current exchange-local time.
pub trait ClockPort: Send + Sync {
    /// Current exchange-local time.
    fn now(&self) -> NaiveDateTime;
}
