//! Viewer side of the push channel.
//!
//! ## Protocol
//!
//! 1. Connect to `GET /games/{id}/subscribe` on the sync server
//! 2. Receive the current snapshot, if the game exists
//! 3. Receive one snapshot frame per committed change to the game
//! 4. Frames are JSON text messages (see [`crate::protocol`])

mod error;
mod listener;

pub use error::SyncError;
pub use listener::{check_server, SnapshotListener, SnapshotStream};
