//! Collection Modes and Windows
//!
//! The collector runs in one of two modes:
//!
//! - **Backfill**: one-time bulk catch-up over `[watermark, now)`.
//! - **Incremental**: steady-state windows of at most `max_gap` starting at
//!   the watermark.
//!
//! Windows are half-open: `from` is inclusive, `till` is exclusive.

use std::fmt;

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

// =============================================================================
// Collection Mode
// =============================================================================

/// Collector state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionMode {
    /// Bulk catch-up from the start watermark to now.
    Backfill,
    /// Bounded steady-state windows.
    Incremental,
}

impl CollectionMode {
    /// Get the mode name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Backfill => "backfill",
            Self::Incremental => "incremental",
        }
    }
}

// =============================================================================
// Fetch Scope
// =============================================================================

/// Instruments a single fetch applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FetchScope {
    /// Every instrument on the market.
    All,
    /// One named instrument.
    Instrument(String),
}

impl fmt::Display for FetchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("*"),
            Self::Instrument(secid) => f.write_str(secid),
        }
    }
}

/// Which instruments the collector follows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstrumentSelection {
    /// An explicit list of instruments, fetched one by one.
    Specific(Vec<String>),
    /// All instruments, fetched in one scope.
    All,
}

impl Default for InstrumentSelection {
    fn default() -> Self {
        Self::Specific(Vec::new())
    }
}

impl InstrumentSelection {
    /// Fetch scopes covering this selection, in fetch order.
    #[must_use]
    pub fn scopes(&self) -> Vec<FetchScope> {
        match self {
            Self::All => vec![FetchScope::All],
            Self::Specific(symbols) => symbols
                .iter()
                .map(|s| FetchScope::Instrument(s.clone()))
                .collect(),
        }
    }

    /// Whether the selection names nothing to collect.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Specific(symbols) if symbols.is_empty())
    }

    /// Get the selection mode name.
    #[must_use]
    pub const fn mode_str(&self) -> &'static str {
        match self {
            Self::Specific(_) => "specific",
            Self::All => "all",
        }
    }
}

// =============================================================================
// Collection Window
// =============================================================================

/// Half-open time range `[from, till)` requested in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionWindow {
    /// Inclusive start.
    pub from: NaiveDateTime,
    /// Exclusive end.
    pub till: NaiveDateTime,
}

impl CollectionWindow {
    /// Backfill range `[watermark, now)`.
    ///
    /// Returns `None` when the watermark is already at or past `now`.
    #[must_use]
    pub fn backfill(watermark: NaiveDateTime, now: NaiveDateTime) -> Option<Self> {
        (now > watermark).then_some(Self {
            from: watermark,
            till: now,
        })
    }

    /// Incremental window `[watermark, min(now, watermark + max_gap))`.
    ///
    /// Returns `None` when there is nothing new to request.
    #[must_use]
    pub fn incremental(
        watermark: NaiveDateTime,
        now: NaiveDateTime,
        max_gap: Duration,
    ) -> Option<Self> {
        let capped = watermark
            .checked_add_signed(max_gap)
            .map_or(now, |limit| limit.min(now));
        (capped > watermark).then_some(Self {
            from: watermark,
            till: capped,
        })
    }

    /// Window length.
    #[must_use]
    pub fn span(&self) -> Duration {
        self.till - self.from
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn incremental_window_is_capped_by_max_gap() {
        let window =
            CollectionWindow::incremental(at(10, 0, 0), at(11, 0, 0), Duration::minutes(5))
                .unwrap();
        assert_eq!(window.from, at(10, 0, 0));
        assert_eq!(window.till, at(10, 5, 0));
        assert_eq!(window.span(), Duration::minutes(5));
    }

    #[test]
    fn incremental_window_is_capped_by_now() {
        let window =
            CollectionWindow::incremental(at(10, 0, 0), at(10, 0, 3), Duration::minutes(5))
                .unwrap();
        assert_eq!(window.till, at(10, 0, 3));
    }

    #[test]
    fn incremental_window_empty_when_caught_up() {
        assert!(
            CollectionWindow::incremental(at(10, 0, 0), at(10, 0, 0), Duration::minutes(5))
                .is_none()
        );
        assert!(
            CollectionWindow::incremental(at(10, 0, 5), at(10, 0, 0), Duration::minutes(5))
                .is_none()
        );
    }

    #[test]
    fn backfill_window_spans_to_now() {
        let window = CollectionWindow::backfill(at(0, 0, 0), at(13, 30, 0)).unwrap();
        assert_eq!(window.from, at(0, 0, 0));
        assert_eq!(window.till, at(13, 30, 0));
        assert!(CollectionWindow::backfill(at(13, 30, 0), at(13, 30, 0)).is_none());
    }

    #[test]
    fn selection_scopes() {
        let specific = InstrumentSelection::Specific(vec!["SBER".into(), "GAZP".into()]);
        assert_eq!(
            specific.scopes(),
            vec![
                FetchScope::Instrument("SBER".into()),
                FetchScope::Instrument("GAZP".into())
            ]
        );
        assert_eq!(InstrumentSelection::All.scopes(), vec![FetchScope::All]);
        assert!(InstrumentSelection::default().is_empty());
        assert!(!InstrumentSelection::All.is_empty());
    }

    #[test]
    fn scope_display() {
        assert_eq!(FetchScope::All.to_string(), "*");
        assert_eq!(FetchScope::Instrument("SBER".into()).to_string(), "SBER");
    }
}
