//! MOEX ISS adapter.
//!
//! - `client`: `reqwest` implementation of `TradeSourcePort`
//! - `wire`: `{columns, data}` block decoding

pub mod client;
pub mod wire;

pub use client::{DEFAULT_ISS_BASE_URL, IssClient, IssClientConfig};
pub use wire::{IssBlock, decode_securities, decode_trades};
