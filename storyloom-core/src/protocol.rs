//! Push-channel protocol between the sync server and viewers.
//!
//! Every frame is one JSON text message. Snapshot frames carry the change-feed
//! sequence number of the mutation that produced them so viewers can discard
//! stale or redelivered snapshots.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::GameSnapshot;

/// Opaque, totally ordered position in the mutation feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceToken(i64);

impl SequenceToken {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for SequenceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Frames sent by the server over a subscription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame<T> {
    /// The full current state of the subscribed record
    Snapshot { sequence: SequenceToken, snapshot: T },
    /// Server-side problem with the subscription
    Error { message: String },
}

impl<T> ServerFrame<T> {
    pub fn snapshot(sequence: SequenceToken, snapshot: T) -> Self {
        ServerFrame::Snapshot { sequence, snapshot }
    }
}

impl<T: Serialize> ServerFrame<T> {
    /// Encode as a JSON text frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl<T: DeserializeOwned> ServerFrame<T> {
    /// Decode a JSON text frame.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Frame carrying a game snapshot, the only record type pushed to viewers.
pub type GameFrame = ServerFrame<GameSnapshot>;

/// Generate a fresh random identifier (game, scene or turn).
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
