//! Trade Source Port (Driven Port)
//!
//! Interface to the upstream paginated trades API.

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::domain::collection::FetchScope;
use crate::domain::trade::{Security, TradeRecord};

/// Upstream fetch error. Every variant is transient for the collector: the
/// cursor does not advance and the next tick retries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// Transport-level failure.
    #[error("ISS request failed: {message}")]
    Http {
        /// Error details.
        message: String,
    },

    /// Non-success HTTP status.
    #[error("ISS returned status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// Response body could not be decoded.
    #[error("ISS response decode error: {message}")]
    Decode {
        /// Error details.
        message: String,
    },

    /// Request exceeded the configured timeout.
    #[error("ISS request timed out")]
    Timeout,
}

/// One page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Instruments to fetch.
    pub scope: FetchScope,
    /// Inclusive lower time bound.
    pub from: Option<NaiveDateTime>,
    /// Exclusive upper time bound.
    pub till: Option<NaiveDateTime>,
    /// Maximum rows in the page.
    pub limit: usize,
    /// Zero-based row offset.
    pub offset: usize,
}

/// Why a row was dropped while decoding a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// A required column is absent from the page or null in the row.
    MissingColumn(&'static str),
    /// A column holds a value of the wrong shape.
    InvalidValue {
        /// Column name.
        column: &'static str,
        /// Offending value.
        value: String,
    },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingColumn(column) => write!(f, "missing column {column}"),
            Self::InvalidValue { column, value } => {
                write!(f, "invalid value {value:?} in column {column}")
            }
        }
    }
}

/// A decoded page: valid records plus the number of rows skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradePage {
    /// Records decoded successfully, in upstream order.
    pub records: Vec<TradeRecord>,
    /// Rows dropped as malformed.
    pub skipped: usize,
}

impl TradePage {
    /// Create a page with no skipped rows.
    #[must_use]
    pub const fn new(records: Vec<TradeRecord>) -> Self {
        Self {
            records,
            skipped: 0,
        }
    }

    /// Rows the upstream returned, including skipped ones.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.records.len() + self.skipped
    }
}

/// Port for the upstream trades API.
#[async_trait]
pub trait TradeSourcePort: Send + Sync {
    /// Fetch one page of trades.
    async fn fetch_trades(&self, request: &PageRequest) -> Result<TradePage, SourceError>;

    /// Fetch metadata for every instrument on the market.
    async fn fetch_securities(&self) -> Result<Vec<Security>, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_count_includes_skipped() {
        let page = TradePage {
            records: Vec::new(),
            skipped: 3,
        };
        assert_eq!(page.row_count(), 3);
        assert_eq!(TradePage::default().row_count(), 0);
    }

    #[test]
    fn skip_reason_display() {
        assert_eq!(
            SkipReason::MissingColumn("TRADENO").to_string(),
            "missing column TRADENO"
        );
        let reason = SkipReason::InvalidValue {
            column: "PRICE",
            value: "abc".to_string(),
        };
        assert_eq!(reason.to_string(), "invalid value \"abc\" in column PRICE");
    }
}
