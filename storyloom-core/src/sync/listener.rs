//! WebSocket listener for a game's snapshot push channel.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use super::error::SyncError;

/// Timeout for the health check.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);

/// Connects viewers to the sync server.
#[derive(Debug, Clone)]
pub struct SnapshotListener {
    server_url: String,
}

/// An open subscription to one game.
pub struct SnapshotStream {
    game_id: String,
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl SnapshotListener {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Opens the push channel for a game.
    pub async fn subscribe(&self, game_id: &str) -> Result<SnapshotStream, SyncError> {
        let url = self.build_ws_url(game_id);
        tracing::debug!("Subscribing to {}", url);

        let (ws, _) = connect_async(&url)
            .await
            .map_err(|e| SyncError::ConnectionError(e.to_string()))?;

        Ok(SnapshotStream {
            game_id: game_id.to_string(),
            ws,
        })
    }

    /// Builds the WebSocket URL for a game's subscription endpoint.
    fn build_ws_url(&self, game_id: &str) -> String {
        // Convert http(s) to ws(s) if needed
        let base_url = if self.server_url.starts_with("http://") {
            self.server_url.replacen("http://", "ws://", 1)
        } else if self.server_url.starts_with("https://") {
            self.server_url.replacen("https://", "wss://", 1)
        } else if !self.server_url.starts_with("ws://") && !self.server_url.starts_with("wss://") {
            format!("ws://{}", self.server_url)
        } else {
            self.server_url.clone()
        };

        format!(
            "{}/games/{}/subscribe",
            base_url.trim_end_matches('/'),
            game_id
        )
    }

    /// Builds an HTTP URL for a given path.
    fn build_http_url(&self, path: &str) -> String {
        // Convert ws(s) to http(s) if needed
        let base_url = if self.server_url.starts_with("ws://") {
            self.server_url.replacen("ws://", "http://", 1)
        } else if self.server_url.starts_with("wss://") {
            self.server_url.replacen("wss://", "https://", 1)
        } else if !self.server_url.starts_with("http://")
            && !self.server_url.starts_with("https://")
        {
            format!("http://{}", self.server_url)
        } else {
            self.server_url.clone()
        };

        format!("{}{}", base_url.trim_end_matches('/'), path)
    }
}

impl SnapshotStream {
    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    /// Waits for the next text frame.
    ///
    /// Returns `Ok(None)` when the server closed the connection, which is a
    /// distinct signal from a transport error.
    pub async fn next_frame(&mut self) -> Result<Option<String>, SyncError> {
        while let Some(msg_result) = self.ws.next().await {
            match msg_result {
                Ok(Message::Text(text)) => return Ok(Some(text.as_str().to_string())),
                Ok(Message::Ping(data)) => {
                    self.ws
                        .send(Message::Pong(data))
                        .await
                        .map_err(|e| SyncError::WebSocketError(e.to_string()))?;
                }
                Ok(Message::Close(_)) => return Ok(None),
                Ok(_) => {
                    // Binary and pong frames are not part of the protocol
                }
                Err(e) => return Err(SyncError::WebSocketError(e.to_string())),
            }
        }
        Ok(None)
    }

    /// Closes the subscription from the viewer side.
    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// Returns true if the sync server answers its health endpoint.
pub async fn check_server(server_url: &str) -> bool {
    let url = SnapshotListener::new(server_url).build_http_url("/health");
    let client = match reqwest::Client::builder().timeout(HEALTH_TIMEOUT).build() {
        Ok(client) => client,
        Err(_) => return false,
    };

    match client.get(&url).send().await {
        Ok(response) => response.status().is_success(),
        Err(e) => {
            tracing::debug!("Health check against {} failed: {}", url, e);
            false
        }
    }
}
