//! Collector Configuration Settings
//!
//! Configuration types for the trade collector, loaded from environment
//! variables. Every knob falls back to its default when unset or
//! unparsable; only values that would make the collector unusable (zero
//! page size, zero interval, zero window) are rejected.

use std::path::PathBuf;
use std::time::Duration;

use crate::application::services::CollectorConfig;
use crate::domain::collection::InstrumentSelection;
use crate::domain::dedup::DEFAULT_DEDUP_CAPACITY;
use crate::infrastructure::bus::DEFAULT_BUS_CAPACITY;
use crate::infrastructure::clock::DEFAULT_UTC_OFFSET_HOURS;
use crate::infrastructure::iss::{DEFAULT_ISS_BASE_URL, IssClientConfig};
use crate::infrastructure::persistence::DEFAULT_CURSOR_PATH;

/// How the instrument list is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickerMode {
    /// Only the instruments in `COLLECTOR_TICKERS`.
    #[default]
    Specific,
    /// Every instrument on the market, one request scope.
    All,
}

impl TickerMode {
    /// Parse mode from string. Unknown values mean `Specific`.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "all" => Self::All,
            _ => Self::Specific,
        }
    }

    /// Mode name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Specific => "specific",
            Self::All => "all",
        }
    }
}

/// Upstream ISS API settings.
#[derive(Debug, Clone)]
pub struct IssSettings {
    /// API base address.
    pub base_url: String,
    /// Engine path segment.
    pub engine: String,
    /// Market path segment.
    pub market: String,
    /// Minimum spacing between requests.
    pub rate_limit: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Exchange-local clock offset, in hours east of UTC.
    pub utc_offset_hours: i32,
}

impl Default for IssSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ISS_BASE_URL.to_string(),
            engine: "stock".to_string(),
            market: "shares".to_string(),
            rate_limit: Duration::from_millis(1000),
            request_timeout: Duration::from_secs(10),
            utc_offset_hours: DEFAULT_UTC_OFFSET_HOURS,
        }
    }
}

impl IssSettings {
    /// HTTP client settings.
    #[must_use]
    pub fn client_config(&self) -> IssClientConfig {
        IssClientConfig {
            base_url: self.base_url.clone(),
            engine: self.engine.clone(),
            market: self.market.clone(),
            timeout: self.request_timeout,
        }
    }
}

/// Collection loop settings.
#[derive(Debug, Clone)]
pub struct CollectionSettings {
    /// Collector enabled flag.
    pub enabled: bool,
    /// Delay between ticks.
    pub interval: Duration,
    /// Instrument selection mode.
    pub ticker_mode: TickerMode,
    /// Instruments for `TickerMode::Specific`.
    pub tickers: Vec<String>,
    /// Page size for drains.
    pub batch_size: usize,
    /// Largest incremental window.
    pub max_gap: Duration,
    /// Dedup cap per instrument.
    pub dedup_capacity: usize,
    /// Cursor file location.
    pub cursor_path: PathBuf,
    /// Periodic metrics log interval (zero = off).
    pub metrics_log_interval: Duration,
    /// Health/stats HTTP port (0 = off).
    pub health_port: u16,
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_millis(3000),
            ticker_mode: TickerMode::Specific,
            tickers: Vec::new(),
            batch_size: 5000,
            max_gap: Duration::from_secs(300),
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
            cursor_path: PathBuf::from(DEFAULT_CURSOR_PATH),
            metrics_log_interval: Duration::from_secs(60),
            health_port: 8082,
        }
    }
}

impl CollectionSettings {
    /// Instruments to follow.
    #[must_use]
    pub fn selection(&self) -> InstrumentSelection {
        match self.ticker_mode {
            TickerMode::All => InstrumentSelection::All,
            TickerMode::Specific => InstrumentSelection::Specific(self.tickers.clone()),
        }
    }
}

/// Message bus settings.
#[derive(Debug, Clone)]
pub struct BusSettings {
    /// Topic for trade records.
    pub trades_topic: String,
    /// Topic for instrument metadata.
    pub instruments_topic: String,
    /// Per-topic buffer.
    pub capacity: usize,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            trades_topic: "moex.trades".to_string(),
            instruments_topic: "moex.instruments".to_string(),
            capacity: DEFAULT_BUS_CAPACITY,
        }
    }
}

/// Complete collector configuration.
#[derive(Debug, Clone, Default)]
pub struct CollectorSettings {
    /// Upstream API settings.
    pub iss: IssSettings,
    /// Collection loop settings.
    pub collection: CollectionSettings,
    /// Message bus settings.
    pub bus: BusSettings,
}

impl CollectorSettings {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a setting that must be positive is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a setting that must be positive is zero.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };
        let iss_defaults = IssSettings::default();
        let collection_defaults = CollectionSettings::default();
        let bus_defaults = BusSettings::default();

        let iss = IssSettings {
            base_url: env.string("ISS_BASE_URL", &iss_defaults.base_url),
            engine: env.string("ISS_ENGINE", &iss_defaults.engine),
            market: env.string("ISS_MARKET", &iss_defaults.market),
            rate_limit: env.positive_millis("ISS_RATE_LIMIT_MS", iss_defaults.rate_limit)?,
            request_timeout: env
                .parse::<u64>("ISS_REQUEST_TIMEOUT_SECS")
                .map_or(iss_defaults.request_timeout, Duration::from_secs),
            utc_offset_hours: env
                .parse("ISS_UTC_OFFSET_HOURS")
                .unwrap_or(iss_defaults.utc_offset_hours),
        };

        let collection = CollectionSettings {
            enabled: env.flag("COLLECTOR_ENABLED", collection_defaults.enabled),
            interval: env.positive_millis("COLLECTOR_INTERVAL_MS", collection_defaults.interval)?,
            ticker_mode: env
                .raw("COLLECTOR_TICKER_MODE")
                .map(|s| TickerMode::from_str_case_insensitive(&s))
                .unwrap_or_default(),
            tickers: env
                .raw("COLLECTOR_TICKERS")
                .map(|s| parse_tickers(&s))
                .unwrap_or_default(),
            batch_size: env.positive("COLLECTOR_BATCH_SIZE", collection_defaults.batch_size)?,
            max_gap: env.positive_secs("COLLECTOR_MAX_GAP_SECS", collection_defaults.max_gap)?,
            dedup_capacity: env.positive(
                "COLLECTOR_DEDUP_CAPACITY",
                collection_defaults.dedup_capacity,
            )?,
            cursor_path: env
                .raw("COLLECTOR_CURSOR_PATH")
                .filter(|s| !s.trim().is_empty())
                .map_or(collection_defaults.cursor_path, PathBuf::from),
            metrics_log_interval: env
                .parse::<u64>("COLLECTOR_METRICS_LOG_INTERVAL_SECS")
                .map_or(collection_defaults.metrics_log_interval, Duration::from_secs),
            health_port: env
                .parse("COLLECTOR_HEALTH_PORT")
                .unwrap_or(collection_defaults.health_port),
        };

        let bus = BusSettings {
            trades_topic: env.string("BUS_TRADES_TOPIC", &bus_defaults.trades_topic),
            instruments_topic: env.string("BUS_INSTRUMENTS_TOPIC", &bus_defaults.instruments_topic),
            capacity: env.parse("BUS_CAPACITY").unwrap_or(bus_defaults.capacity),
        };

        Ok(Self {
            iss,
            collection,
            bus,
        })
    }

    /// Collector service config.
    #[must_use]
    pub fn collector_config(&self) -> CollectorConfig {
        let max_gap = chrono::Duration::from_std(self.collection.max_gap)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        let metrics_log_interval = Some(self.collection.metrics_log_interval)
            .filter(|interval| !interval.is_zero());

        CollectorConfig {
            enabled: self.collection.enabled,
            selection: self.collection.selection(),
            batch_size: self.collection.batch_size,
            max_gap,
            interval: self.collection.interval,
            metrics_log_interval,
            trades_topic: self.bus.trades_topic.clone(),
            instruments_topic: self.bus.instruments_topic.clone(),
        }
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A setting holds a value the collector cannot run with.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// Environment variable name.
        key: String,
        /// Offending value.
        value: String,
    },
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.raw(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.raw(key).and_then(|v| v.trim().parse().ok())
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        self.raw(key)
            .map_or(default, |v| match v.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => true,
                "false" | "0" | "no" | "off" => false,
                _ => default,
            })
    }

    fn positive(&self, key: &str, default: usize) -> Result<usize, ConfigError> {
        match self.parse::<usize>(key) {
            Some(0) => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: "0".to_string(),
            }),
            Some(value) => Ok(value),
            None => Ok(default),
        }
    }

    fn positive_millis(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        self.positive_duration(key, default, Duration::from_millis)
    }

    fn positive_secs(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        self.positive_duration(key, default, Duration::from_secs)
    }

    fn positive_duration(
        &self,
        key: &str,
        default: Duration,
        unit: fn(u64) -> Duration,
    ) -> Result<Duration, ConfigError> {
        match self.parse::<u64>(key) {
            Some(0) => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: "0".to_string(),
            }),
            Some(n) => Ok(unit(n)),
            None => Ok(default),
        }
    }
}

fn parse_tickers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|t| t.trim().to_uppercase())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use test_case::test_case;

    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> Result<CollectorSettings, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        CollectorSettings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let settings = settings(&[]).unwrap();

        assert_eq!(settings.iss.base_url, "https://iss.moex.com/iss");
        assert_eq!(settings.iss.engine, "stock");
        assert_eq!(settings.iss.market, "shares");
        assert_eq!(settings.iss.rate_limit, Duration::from_millis(1000));
        assert_eq!(settings.iss.request_timeout, Duration::from_secs(10));
        assert_eq!(settings.iss.utc_offset_hours, 3);
        assert!(settings.collection.enabled);
        assert_eq!(settings.collection.interval, Duration::from_millis(3000));
        assert_eq!(settings.collection.ticker_mode, TickerMode::Specific);
        assert!(settings.collection.tickers.is_empty());
        assert_eq!(settings.collection.batch_size, 5000);
        assert_eq!(settings.collection.max_gap, Duration::from_secs(300));
        assert_eq!(settings.collection.dedup_capacity, 10_000);
        assert_eq!(
            settings.collection.cursor_path,
            PathBuf::from("data/collection-cursor.json")
        );
        assert_eq!(settings.collection.health_port, 8082);
        assert_eq!(settings.bus.trades_topic, "moex.trades");
        assert_eq!(settings.bus.instruments_topic, "moex.instruments");
        assert_eq!(settings.bus.capacity, 10_000);
    }

    #[test]
    fn overrides_are_applied() {
        let settings = settings(&[
            ("ISS_BASE_URL", "http://localhost:9000/iss"),
            ("ISS_RATE_LIMIT_MS", "250"),
            ("COLLECTOR_ENABLED", "false"),
            ("COLLECTOR_TICKER_MODE", "ALL"),
            ("COLLECTOR_BATCH_SIZE", "100"),
            ("COLLECTOR_MAX_GAP_SECS", "60"),
            ("COLLECTOR_HEALTH_PORT", "0"),
            ("BUS_TRADES_TOPIC", "trades.raw"),
        ])
        .unwrap();

        assert_eq!(settings.iss.base_url, "http://localhost:9000/iss");
        assert_eq!(settings.iss.rate_limit, Duration::from_millis(250));
        assert!(!settings.collection.enabled);
        assert_eq!(settings.collection.ticker_mode, TickerMode::All);
        assert_eq!(settings.collection.batch_size, 100);
        assert_eq!(settings.collection.max_gap, Duration::from_secs(60));
        assert_eq!(settings.collection.health_port, 0);
        assert_eq!(settings.bus.trades_topic, "trades.raw");
    }

    #[test]
    fn tickers_are_trimmed_and_uppercased() {
        let settings = settings(&[("COLLECTOR_TICKERS", " sber, GAZP ,,lkoh ")]).unwrap();
        assert_eq!(settings.collection.tickers, vec!["SBER", "GAZP", "LKOH"]);
        assert_eq!(
            settings.collection.selection(),
            InstrumentSelection::Specific(vec![
                "SBER".to_string(),
                "GAZP".to_string(),
                "LKOH".to_string()
            ])
        );
    }

    #[test_case("COLLECTOR_BATCH_SIZE" ; "batch size")]
    #[test_case("COLLECTOR_DEDUP_CAPACITY" ; "dedup capacity")]
    #[test_case("COLLECTOR_INTERVAL_MS" ; "interval")]
    #[test_case("ISS_RATE_LIMIT_MS" ; "rate limit")]
    #[test_case("COLLECTOR_MAX_GAP_SECS" ; "max gap")]
    fn zero_is_rejected(key: &str) {
        let err = settings(&[(key, "0")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: key.to_string(),
                value: "0".to_string()
            }
        );
    }

    #[test_case("COLLECTOR_BATCH_SIZE", "many" ; "non numeric")]
    #[test_case("COLLECTOR_BATCH_SIZE", "-5" ; "negative")]
    #[test_case("COLLECTOR_BATCH_SIZE", "" ; "empty")]
    fn unparsable_falls_back_to_default(key: &str, value: &str) {
        let settings = settings(&[(key, value)]).unwrap();
        assert_eq!(settings.collection.batch_size, 5000);
    }

    #[test_case("true", true ; "true")]
    #[test_case("0", false ; "zero")]
    #[test_case("OFF", false ; "off uppercase")]
    #[test_case("maybe", true ; "unknown keeps default")]
    fn enabled_flag_parsing(value: &str, expected: bool) {
        let settings = settings(&[("COLLECTOR_ENABLED", value)]).unwrap();
        assert_eq!(settings.collection.enabled, expected);
    }

    #[test]
    fn ticker_mode_parsing() {
        assert_eq!(TickerMode::from_str_case_insensitive("all"), TickerMode::All);
        assert_eq!(TickerMode::from_str_case_insensitive(" All "), TickerMode::All);
        assert_eq!(
            TickerMode::from_str_case_insensitive("specific"),
            TickerMode::Specific
        );
        assert_eq!(
            TickerMode::from_str_case_insensitive("unknown"),
            TickerMode::Specific
        );
    }

    #[test]
    fn collector_config_conversion() {
        let settings = settings(&[
            ("COLLECTOR_TICKERS", "SBER"),
            ("COLLECTOR_MAX_GAP_SECS", "120"),
            ("COLLECTOR_METRICS_LOG_INTERVAL_SECS", "0"),
        ])
        .unwrap();

        let config = settings.collector_config();

        assert_eq!(config.max_gap, chrono::Duration::minutes(2));
        assert_eq!(config.metrics_log_interval, None);
        assert_eq!(config.batch_size, 5000);
        assert_eq!(
            config.selection,
            InstrumentSelection::Specific(vec!["SBER".to_string()])
        );
        assert_eq!(config.trades_topic, "moex.trades");
    }

    #[test]
    fn client_config_conversion() {
        let settings = settings(&[("ISS_REQUEST_TIMEOUT_SECS", "3")]).unwrap();
        let client = settings.iss.client_config();
        assert_eq!(client.timeout, Duration::from_secs(3));
        assert_eq!(client.engine, "stock");
    }
}
