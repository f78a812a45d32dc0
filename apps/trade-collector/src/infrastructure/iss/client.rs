//! ISS HTTP Client
//!
//! `reqwest` adapter for the MOEX ISS trades and securities endpoints.
//! Rate limiting happens above this layer; every call here is exactly one
//! HTTP request.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;

use super::wire::{
    ISS_DATETIME_FORMAT, SecuritiesResponse, TradesResponse, decode_securities, decode_trades,
};
use crate::application::ports::{PageRequest, SourceError, TradePage, TradeSourcePort};
use crate::domain::collection::FetchScope;
use crate::domain::trade::Security;

/// Default ISS base address.
pub const DEFAULT_ISS_BASE_URL: &str = "https://iss.moex.com/iss";

/// ISS client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssClientConfig {
    /// Base address, without a trailing slash.
    pub base_url: String,
    /// Engine path segment (e.g. `stock`).
    pub engine: String,
    /// Market path segment (e.g. `shares`).
    pub market: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for IssClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ISS_BASE_URL.to_string(),
            engine: "stock".to_string(),
            market: "shares".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// HTTP client for the ISS API.
#[derive(Debug, Clone)]
pub struct IssClient {
    client: Client,
    config: IssClientConfig,
}

impl IssClient {
    /// Create a client from config.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Http` if the HTTP client cannot be built.
    pub fn new(config: IssClientConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SourceError::Http {
                message: e.to_string(),
            })?;

        Ok(Self { client, config })
    }

    /// Client settings.
    #[must_use]
    pub const fn config(&self) -> &IssClientConfig {
        &self.config
    }

    fn market_url(&self) -> String {
        format!(
            "{}/engines/{}/markets/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.engine,
            self.config.market
        )
    }

    fn trades_url(&self, scope: &FetchScope) -> String {
        match scope {
            FetchScope::All => format!("{}/trades.json", self.market_url()),
            FetchScope::Instrument(secid) => {
                format!("{}/securities/{secid}/trades.json", self.market_url())
            }
        }
    }

    fn trades_query(request: &PageRequest) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("iss.meta", "off".to_string()),
            ("iss.only", "trades".to_string()),
            ("reversed", "0".to_string()),
            ("start", request.offset.to_string()),
            ("limit", request.limit.to_string()),
        ];
        if let Some(from) = request.from {
            query.push(("from", from.format(ISS_DATETIME_FORMAT).to_string()));
        }
        if let Some(till) = request.till {
            query.push(("till", till.format(ISS_DATETIME_FORMAT).to_string()));
        }
        query
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&'static str, String)],
    ) -> Result<T, SourceError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url, status = status.as_u16(), "ISS request rejected");
            return Err(SourceError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(map_transport_error)?;
        serde_json::from_slice(&body).map_err(|e| SourceError::Decode {
            message: e.to_string(),
        })
    }
}

fn map_transport_error(e: reqwest::Error) -> SourceError {
    if e.is_timeout() {
        SourceError::Timeout
    } else {
        SourceError::Http {
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl TradeSourcePort for IssClient {
    async fn fetch_trades(&self, request: &PageRequest) -> Result<TradePage, SourceError> {
        let url = self.trades_url(&request.scope);
        let query = Self::trades_query(request);
        tracing::debug!(url = %url, offset = request.offset, limit = request.limit, "Fetching ISS trades");

        let response: TradesResponse = self.get_json(&url, &query).await?;
        Ok(response
            .trades
            .as_ref()
            .map(decode_trades)
            .unwrap_or_default())
    }

    async fn fetch_securities(&self) -> Result<Vec<Security>, SourceError> {
        let url = format!("{}/securities.json", self.market_url());
        let query = [
            ("iss.meta", "off".to_string()),
            ("iss.only", "securities".to_string()),
        ];
        tracing::debug!(url = %url, "Fetching ISS securities");

        let response: SecuritiesResponse = self.get_json(&url, &query).await?;
        let securities = response
            .securities
            .as_ref()
            .map(decode_securities)
            .unwrap_or_default();
        tracing::info!(count = securities.len(), "Loaded securities from ISS");
        Ok(securities)
    }
}
