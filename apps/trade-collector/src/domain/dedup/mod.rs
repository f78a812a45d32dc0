//! Deduplication Cache
//!
//! Bounded, per-instrument memory of already-published trade sequence
//! numbers. Volatile: held in process memory only, so a restart forgets
//! everything and a re-read window may be republished (at-least-once).
//!
//! # Eviction
//!
//! Each instrument keeps at most `capacity` sequence numbers. When the cap is
//! exceeded the numerically smallest entries are evicted first; sequence
//! numbers increase over time, so the smallest are the oldest.

use std::collections::{BTreeSet, HashMap};

use parking_lot::RwLock;
use serde::Serialize;

use crate::domain::trade::TradeRecord;

/// Default per-instrument capacity.
pub const DEFAULT_DEDUP_CAPACITY: usize = 10_000;

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DedupStats {
    /// Number of instruments with at least one tracked sequence number.
    pub instruments: usize,
    /// Total tracked sequence numbers across all instruments.
    pub total_entries: usize,
    /// Tracked sequence numbers per instrument, sorted by instrument.
    pub per_instrument: Vec<(String, usize)>,
}

/// Bounded per-instrument set of seen sequence numbers.
///
/// Safe to share between tasks; all methods take `&self`.
#[derive(Debug)]
pub struct DedupCache {
    capacity: usize,
    seen: RwLock<HashMap<String, BTreeSet<u64>>>,
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY)
    }
}

impl DedupCache {
    /// Create a cache holding at most `capacity` entries per instrument.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            seen: RwLock::new(HashMap::new()),
        }
    }

    /// Per-instrument capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether `seq` has not been recorded for `instrument`.
    #[must_use]
    pub fn is_new(&self, instrument: &str, seq: u64) -> bool {
        self.seen
            .read()
            .get(instrument)
            .is_none_or(|set| !set.contains(&seq))
    }

    /// Record `seq` as published for `instrument`, evicting the smallest
    /// entries if the instrument exceeds capacity.
    pub fn mark_seen(&self, instrument: &str, seq: u64) {
        let mut seen = self.seen.write();
        let set = seen.entry(instrument.to_string()).or_default();
        set.insert(seq);
        while set.len() > self.capacity {
            set.pop_first();
        }
    }

    /// Records not yet seen, in input order.
    ///
    /// Does not modify the cache; callers mark what they actually publish.
    #[must_use]
    pub fn filter_new<'a>(&self, records: &'a [TradeRecord]) -> Vec<&'a TradeRecord> {
        let seen = self.seen.read();
        records
            .iter()
            .filter(|r| {
                seen.get(&r.instrument)
                    .is_none_or(|set| !set.contains(&r.seq))
            })
            .collect()
    }

    /// Snapshot of cache sizes.
    #[must_use]
    pub fn stats(&self) -> DedupStats {
        let seen = self.seen.read();
        let mut per_instrument: Vec<(String, usize)> = seen
            .iter()
            .map(|(instrument, set)| (instrument.clone(), set.len()))
            .collect();
        per_instrument.sort_unstable();
        DedupStats {
            instruments: per_instrument.len(),
            total_entries: per_instrument.iter().map(|(_, n)| n).sum(),
            per_instrument,
        }
    }

    /// Forget everything.
    pub fn clear(&self) {
        self.seen.write().clear();
    }
}
