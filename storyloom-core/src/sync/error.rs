//! Sync error types.

use thiserror::Error;

/// Errors that can occur on the viewer side of the push channel.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    #[error("HTTP error: {0}")]
    HttpError(String),
}
