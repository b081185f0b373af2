//! Change feed over the game store.
//!
//! A [`ChangeFeedConsumer`] keeps one cursor open on a [`ChangeSource`] and
//! turns its raw changes into typed [`MutationEvent`]s, reopening the cursor
//! from the last delivered token when the source hiccups.

mod consumer;
mod error;
mod event;
mod source;
mod sqlite;

pub use consumer::{
    ChangeFeedConsumer, FeedStatus, WatchConfig, DEFAULT_MAX_RESUME_ATTEMPTS,
    DEFAULT_RESUME_BACKOFF,
};
pub use error::FeedError;
pub use event::{MutationEvent, Operation, OperationFilter, RawChange};
pub use source::{ChangeCursor, ChangeSource};
pub use sqlite::{SqliteChangeCursor, SqliteChangeSource, DEFAULT_BATCH_SIZE, DEFAULT_POLL_INTERVAL};
