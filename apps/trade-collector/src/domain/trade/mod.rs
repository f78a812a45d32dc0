//! Trade Records and Instrument Metadata
//!
//! Canonical internal representation of a collected trade and of the
//! instrument (security) metadata published alongside it. These types are
//! codec-agnostic; the ISS wire mapping lives in the infrastructure layer.
//!
//! # Identity
//!
//! A trade is identified by `(instrument, seq)`. The sequence number is
//! unique per instrument and monotonically increasing, but not gapless.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Trade Side
// =============================================================================

/// Aggressor side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    /// Buyer-initiated trade.
    Buy,
    /// Seller-initiated trade.
    Sell,
    /// Side not reported by the exchange.
    #[default]
    Unknown,
}

impl TradeSide {
    /// Parse the exchange side code (`B` / `S`).
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "B" | "b" => Self::Buy,
            "S" | "s" => Self::Sell,
            _ => Self::Unknown,
        }
    }

    /// Get the side name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
            Self::Unknown => "unknown",
        }
    }
}

// =============================================================================
// Trade Record
// =============================================================================

/// A single exchange trade. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Instrument identifier (ISS `SECID`).
    pub instrument: String,
    /// Trade sequence number, unique per instrument (ISS `TRADENO`).
    pub seq: u64,
    /// Trading board (ISS `BOARDID`).
    pub board_id: String,
    /// Exchange-local event timestamp.
    pub timestamp: NaiveDateTime,
    /// Execution price.
    pub price: Decimal,
    /// Executed quantity in lots.
    pub quantity: i64,
    /// Trade value in quote currency.
    pub value: Decimal,
    /// Aggressor side.
    pub side: TradeSide,
    /// Trading period code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    /// Trading session code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trading_session: Option<String>,
    /// Exchange system time, passed through verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_time: Option<String>,
    /// Timestamp offset reported by the exchange.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts_offset: Option<i64>,
}

impl TradeRecord {
    /// Bus key for this record: `instrument:seq`.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}", self.instrument, self.seq)
    }
}

// =============================================================================
// Security
// =============================================================================

/// Instrument metadata, published once per instrument at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Security {
    /// Instrument identifier (ISS `SECID`).
    pub security_id: String,
    /// Trading board.
    pub board_id: String,
    /// Short display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    /// Full security name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_name: Option<String>,
    /// Previous session close price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_price: Option<Decimal>,
    /// Lot size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lot_size: Option<i64>,
    /// Face value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_value: Option<Decimal>,
    /// Trading status code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Market price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_price: Option<Decimal>,
    /// Quote currency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency_id: Option<String>,
}
