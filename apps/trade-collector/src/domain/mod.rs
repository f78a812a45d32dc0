//! Domain Layer - Core collection types and rules.
//!
//! This layer contains the trade record model, the durable progress cursor,
//! the collection window arithmetic and the bounded dedup cache. Nothing
//! here performs I/O.

/// Collection modes, fetch scopes and window arithmetic.
pub mod collection;

/// Durable progress cursor.
pub mod cursor;

/// Bounded per-instrument dedup cache.
pub mod dedup;

/// Trade records and instrument metadata.
pub mod trade;
