//! Configuration Module
//!
//! Environment-driven settings for the collector service.

mod settings;

pub use settings::{
    BusSettings, CollectionSettings, CollectorSettings, ConfigError, IssSettings, TickerMode,
};
