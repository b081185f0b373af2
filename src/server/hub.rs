//! Per-subscriber fan-out of change frames.
//!
//! Each subscriber id owns at most one sink. Subscribing again with the same
//! id closes the previous sink, so a viewer that reconnects never receives
//! frames twice.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Why a sink refused a frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("connection closed")]
    Closed,
    #[error("outbound queue full")]
    Full,
}

/// Write side of one subscriber connection.
pub trait Sink: Send + Sync {
    /// Queues one encoded frame without waiting on the network.
    fn send(&self, frame: &str) -> Result<(), SinkError>;

    /// Asks the connection to close. Called at most once per subscription.
    fn close(&self);
}

#[derive(Error, Debug)]
pub enum BroadcastError {
    #[error("Subscriber not found: {0}")]
    SubscriberNotFound(String),

    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Outcome of publishing to one subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The sink failed and its subscription was dropped.
    Evicted,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FanoutReport {
    pub delivered: Vec<String>,
    pub evicted: Vec<String>,
    pub missing: Vec<String>,
}

/// Identifies one subscription so a closing connection only releases its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    subscriber_id: String,
    generation: u64,
}

impl SubscriptionHandle {
    pub fn subscriber_id(&self) -> &str {
        &self.subscriber_id
    }
}

struct Subscription {
    generation: u64,
    sink: Arc<dyn Sink>,
}

pub struct EventBroadcaster {
    subscribers: RwLock<HashMap<String, Subscription>>,
    next_generation: AtomicU64,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Registers `sink` for `subscriber_id`, closing any sink it replaces.
    pub async fn subscribe(
        &self,
        subscriber_id: impl Into<String>,
        sink: Arc<dyn Sink>,
    ) -> SubscriptionHandle {
        let subscriber_id = subscriber_id.into();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let mut subscribers = self.subscribers.write().await;
        if let Some(previous) =
            subscribers.insert(subscriber_id.clone(), Subscription { generation, sink })
        {
            tracing::info!("Replacing subscription for {}", subscriber_id);
            previous.sink.close();
        } else {
            tracing::debug!("New subscription for {}", subscriber_id);
        }

        SubscriptionHandle {
            subscriber_id,
            generation,
        }
    }

    /// Sends `event` to one subscriber.
    pub async fn publish<E: Serialize>(
        &self,
        event: &E,
        subscriber_id: &str,
    ) -> Result<Delivery, BroadcastError> {
        let frame = serde_json::to_string(event)?;
        self.deliver(&frame, subscriber_id)
            .await
            .ok_or_else(|| BroadcastError::SubscriberNotFound(subscriber_id.to_string()))
    }

    /// Sends `event` to the given subscribers, or to all of them.
    pub async fn publish_all<E: Serialize>(
        &self,
        event: &E,
        subscriber_ids: Option<&[String]>,
    ) -> Result<FanoutReport, BroadcastError> {
        let frame = serde_json::to_string(event)?;
        let targets = match subscriber_ids {
            Some(ids) => ids.to_vec(),
            None => self.list_subscribers().await,
        };

        let mut report = FanoutReport::default();
        for id in targets {
            match self.deliver(&frame, &id).await {
                Some(Delivery::Delivered) => report.delivered.push(id),
                Some(Delivery::Evicted) => report.evicted.push(id),
                None => report.missing.push(id),
            }
        }
        Ok(report)
    }

    /// Closes and removes a subscriber. No-op if absent.
    pub async fn unsubscribe(&self, subscriber_id: &str) {
        let removed = self.subscribers.write().await.remove(subscriber_id);
        if let Some(subscription) = removed {
            subscription.sink.close();
            tracing::debug!("Unsubscribed {}", subscriber_id);
        }
    }

    /// Removes the subscription behind `handle` if nothing has replaced it.
    pub async fn release(&self, handle: &SubscriptionHandle) -> bool {
        let mut subscribers = self.subscribers.write().await;
        match subscribers.get(&handle.subscriber_id) {
            Some(current) if current.generation == handle.generation => {
                subscribers.remove(&handle.subscriber_id);
                tracing::debug!("Released subscription for {}", handle.subscriber_id);
                true
            }
            _ => false,
        }
    }

    pub async fn list_subscribers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.subscribers.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    async fn deliver(&self, frame: &str, subscriber_id: &str) -> Option<Delivery> {
        let (generation, sink) = {
            let subscribers = self.subscribers.read().await;
            let subscription = subscribers.get(subscriber_id)?;
            (subscription.generation, subscription.sink.clone())
        };

        match sink.send(frame) {
            Ok(()) => Some(Delivery::Delivered),
            Err(e) => {
                tracing::warn!("Dropping subscriber {} after failed write: {}", subscriber_id, e);
                self.evict(subscriber_id, generation).await;
                Some(Delivery::Evicted)
            }
        }
    }

    async fn evict(&self, subscriber_id: &str, generation: u64) {
        let mut subscribers = self.subscribers.write().await;
        if subscribers
            .get(subscriber_id)
            .is_some_and(|s| s.generation == generation)
        {
            if let Some(subscription) = subscribers.remove(subscriber_id) {
                subscription.sink.close();
            }
        }
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
