//! Broadcast Bus Adapter
//!
//! In-process message bus built on tokio broadcast channels, one channel per
//! topic. Downstream consumers subscribe to a topic and receive every message
//! published after they subscribed.
//!
//! Publishing to a topic nobody listens on is reported as
//! `PublishError::NoSubscribers`; the collector treats that like any other
//! failed publish and leaves the record unmarked.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{BusMessage, BusPublisherPort, PublishError};

/// Default per-topic channel capacity.
pub const DEFAULT_BUS_CAPACITY: usize = 10_000;

// =============================================================================
// Broadcast Bus
// =============================================================================

/// Topic-keyed fan-out bus.
#[derive(Debug)]
pub struct BroadcastBus {
    capacity: usize,
    topics: RwLock<HashMap<String, broadcast::Sender<BusMessage>>>,
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl BroadcastBus {
    /// Create a bus whose topic channels buffer `capacity` messages.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            topics: RwLock::new(HashMap::new()),
        }
    }

    /// Per-topic channel capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Subscribe to `topic`, creating its channel on first use.
    #[must_use]
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<BusMessage> {
        if let Some(sender) = self.topics.read().get(topic) {
            return sender.subscribe();
        }
        self.topics
            .write()
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Active receivers on `topic`.
    #[must_use]
    pub fn receiver_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .get(topic)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Receiver counts for every known topic.
    #[must_use]
    pub fn stats(&self) -> BusStats {
        let mut topics: Vec<(String, usize)> = self
            .topics
            .read()
            .iter()
            .map(|(topic, sender)| (topic.clone(), sender.receiver_count()))
            .collect();
        topics.sort();
        BusStats { topics }
    }
}

impl BroadcastBus {
    /// Keep a receiver on `topic` until `stop` fires, logging each message
    /// at trace level.
    ///
    /// `stop` must outlive the collector task, otherwise the final tick
    /// publishes into an empty topic.
    pub fn spawn_tap(&self, topic: &str, stop: CancellationToken) -> JoinHandle<()> {
        let mut rx = self.subscribe(topic);
        let topic = topic.to_string();
        tokio::spawn(async move {
            loop {
                let received: Result<BusMessage, RecvError> = tokio::select! {
                    () = stop.cancelled() => break,
                    received = rx.recv() => received,
                };
                match received {
                    Ok(message) => {
                        tracing::trace!(topic = %topic, key = %message.key, "Bus message");
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(topic = %topic, skipped, "Bus tap lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

impl BusPublisherPort for BroadcastBus {
    fn publish(&self, message: BusMessage) -> Result<(), PublishError> {
        let topics = self.topics.read();
        let Some(sender) = topics.get(&message.topic) else {
            return Err(PublishError::NoSubscribers {
                topic: message.topic,
            });
        };

        let topic = message.topic.clone();
        sender
            .send(message)
            .map(|_| ())
            .map_err(|_| PublishError::NoSubscribers { topic })
    }
}

/// Shared bus reference.
pub type SharedBroadcastBus = Arc<BroadcastBus>;

/// Receiver counts per topic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusStats {
    /// `(topic, receivers)` sorted by topic.
    pub topics: Vec<(String, usize)>,
}

impl BusStats {
    /// Total receivers across all topics.
    #[must_use]
    pub fn total_receivers(&self) -> usize {
        self.topics.iter().map(|(_, n)| n).sum()
    }
}

// =============================================================================
// Tests
// =============================================================================
