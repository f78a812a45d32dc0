//! Bus Publisher Port (Driven Port)
//!
//! Interface for publishing keyed messages onto the message bus.
//! Publishing is fire-and-forget from the collector's perspective: a failed
//! publish is logged and counted, it never fails a cycle.

use serde::Serialize;

use crate::domain::trade::{Security, TradeRecord};

/// Bus publishing error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    /// Nobody is listening on the topic.
    #[error("No subscribers on topic {topic}")]
    NoSubscribers {
        /// Topic name.
        topic: String,
    },

    /// Payload serialization failed.
    #[error("Payload serialization error: {message}")]
    Serialization {
        /// Error details.
        message: String,
    },
}

/// A keyed message on a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Destination topic.
    pub topic: String,
    /// Partitioning key.
    pub key: String,
    /// JSON payload.
    pub payload: String,
}

impl BusMessage {
    /// Build a message with a JSON-serialized payload.
    ///
    /// # Errors
    ///
    /// Returns `PublishError::Serialization` if the value cannot be encoded.
    pub fn json<T: Serialize>(
        topic: impl Into<String>,
        key: impl Into<String>,
        value: &T,
    ) -> Result<Self, PublishError> {
        let payload = serde_json::to_string(value).map_err(|e| PublishError::Serialization {
            message: e.to_string(),
        })?;
        Ok(Self {
            topic: topic.into(),
            key: key.into(),
            payload,
        })
    }

    /// Trade message keyed by `instrument:seq`.
    ///
    /// # Errors
    ///
    /// Returns `PublishError::Serialization` if the record cannot be encoded.
    pub fn trade(topic: &str, trade: &TradeRecord) -> Result<Self, PublishError> {
        Self::json(topic, trade.key(), trade)
    }

    /// Instrument metadata message keyed by security id.
    ///
    /// # Errors
    ///
    /// Returns `PublishError::Serialization` if the record cannot be encoded.
    pub fn security(topic: &str, security: &Security) -> Result<Self, PublishError> {
        Self::json(topic, security.security_id.clone(), security)
    }
}

/// Port for the outbound message bus.
#[cfg_attr(test, mockall::automock)]
pub trait BusPublisherPort: Send + Sync {
    /// Publish one message.
    ///
    /// # Errors
    ///
    /// Returns `PublishError` if the bus rejected the message.
    fn publish(&self, message: BusMessage) -> Result<(), PublishError>;
}

/// Publisher that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpBusPublisher;

impl BusPublisherPort for NoOpBusPublisher {
    fn publish(&self, _message: BusMessage) -> Result<(), PublishError> {
        Ok(())
    }
}
