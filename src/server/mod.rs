//! HTTP and WebSocket surface of the sync server.

pub mod hub;
mod routes;
mod ws;

use std::sync::Arc;

use crate::feed::FeedStatus;
use crate::store::GameStore;

pub use hub::{
    BroadcastError, Delivery, EventBroadcaster, FanoutReport, Sink, SinkError, SubscriptionHandle,
};
pub use routes::router;
pub use ws::WsSink;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: GameStore,
    pub hub: Arc<EventBroadcaster>,
    pub feed: FeedStatus,
}
