//! Moves change-feed events to the matching subscriber.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use storyloom_core::{GameSnapshot, ServerFrame};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::feed::{ChangeFeedConsumer, ChangeSource, FeedError, FeedStatus, MutationEvent, WatchConfig};
use crate::server::{BroadcastError, Delivery, EventBroadcaster};

/// A record whose id is also the id of the subscriber that watches it.
pub trait Record {
    fn record_id(&self) -> &str;
}

impl Record for GameSnapshot {
    fn record_id(&self) -> &str {
        &self.id
    }
}

pub struct SyncCoordinator<S: ChangeSource, T> {
    consumer: ChangeFeedConsumer<S, T>,
    hub: Arc<EventBroadcaster>,
    shutdown: CancellationToken,
}

impl<S, T> SyncCoordinator<S, T>
where
    S: ChangeSource + 'static,
    T: Record + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(
        consumer: ChangeFeedConsumer<S, T>,
        hub: Arc<EventBroadcaster>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            consumer,
            hub,
            shutdown,
        }
    }

    pub fn status(&self) -> FeedStatus {
        self.consumer.status()
    }

    /// Pulls events until shutdown or a fatal feed error.
    pub async fn run(mut self, config: WatchConfig) -> Result<(), FeedError> {
        self.consumer.start_watch(config).await?;

        loop {
            let event = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    self.consumer.stop_watch(false);
                    return Ok(());
                }
                event = self.consumer.next_event() => event?,
            };
            Self::forward(&self.hub, event).await;
        }
    }

    /// Runs on a task. Whatever ends the loop also cancels `shutdown`, so
    /// the rest of the process winds down with it.
    pub fn spawn(self, config: WatchConfig) -> CoordinatorHandle {
        let shutdown = self.shutdown.clone();
        let status = self.status();
        let task = tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                let result = self.run(config).await;
                shutdown.cancel();
                result
            }
        });

        CoordinatorHandle {
            task,
            shutdown,
            status,
        }
    }

    async fn forward(hub: &EventBroadcaster, event: MutationEvent<T>) {
        let id = event.snapshot_after.record_id().to_string();
        let token = event.sequence_token;
        let frame = ServerFrame::snapshot(token, event.snapshot_after);

        match hub.publish(&frame, &id).await {
            Ok(Delivery::Delivered) => {
                tracing::debug!("Pushed {} change {} to subscriber", id, token);
            }
            Ok(Delivery::Evicted) => {
                tracing::debug!("Subscriber {} evicted while pushing change {}", id, token);
            }
            Err(BroadcastError::SubscriberNotFound(_)) => {
                tracing::trace!("No subscriber for {}, change {} dropped", id, token);
            }
            Err(e) => {
                tracing::error!("Failed to publish change {} for {}: {}", token, id, e);
            }
        }
    }
}

pub struct CoordinatorHandle {
    task: JoinHandle<Result<(), FeedError>>,
    shutdown: CancellationToken,
    status: FeedStatus,
}

impl CoordinatorHandle {
    pub fn status(&self) -> FeedStatus {
        self.status.clone()
    }

    /// Stops the pipeline and waits for the loop to exit.
    pub async fn shutdown(self) -> Result<(), FeedError> {
        self.shutdown.cancel();
        self.join().await
    }

    /// Waits for the loop to exit on its own.
    pub async fn join(self) -> Result<(), FeedError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(FeedError::Fatal(format!("coordinator task failed: {e}"))),
        }
    }
}
