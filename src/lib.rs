//! Storyloom sync server.
//!
//! Games live in SQLite. Every write lands in a change log that a single
//! change-feed consumer tails; the [`SyncCoordinator`] pushes each change to
//! the WebSocket subscriber watching that game.

pub mod config;
pub mod coordinator;
pub mod feed;
pub mod server;
pub mod store;

pub use config::{Config, ConfigError};
pub use coordinator::{CoordinatorHandle, Record, SyncCoordinator};
pub use feed::{ChangeFeedConsumer, FeedError, FeedStatus, MutationEvent, SqliteChangeSource};
pub use server::{AppState, EventBroadcaster};
pub use store::{init_db, GameStore, StoreError, StoredGame};
