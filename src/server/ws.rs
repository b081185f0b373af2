//! WebSocket subscriber connections.

use axum::extract::ws::{Message, WebSocket};
use futures::{Sink as WsWrite, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use storyloom_core::{GameFrame, ServerFrame};
use tokio::sync::mpsc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use super::hub::{Sink, SinkError};
use super::AppState;

/// Frames queued per connection before the subscriber counts as stuck.
const OUTBOUND_CAPACITY: usize = 64;
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Queue in front of one connection's writer.
///
/// Closing does not go through the queue, so a subscriber evicted for a
/// full queue still has its connection closed.
#[derive(Debug, Clone)]
pub struct WsSink {
    tx: mpsc::Sender<String>,
    closed: CancellationToken,
}

impl WsSink {
    fn channel() -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let sink = Self {
            tx,
            closed: CancellationToken::new(),
        };
        (sink, rx)
    }

    fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

impl Sink for WsSink {
    fn send(&self, frame: &str) -> Result<(), SinkError> {
        if self.is_closed() {
            return Err(SinkError::Closed);
        }
        self.tx.try_send(frame.to_string()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }

    fn close(&self) {
        self.closed.cancel();
    }
}

/// Runs one subscriber connection until either side closes it.
pub async fn subscriber_session(socket: WebSocket, state: AppState, game_id: String) {
    let (ws_tx, ws_rx) = socket.split();
    let (sink, outbound) = WsSink::channel();
    let sink = Arc::new(sink);

    tracing::info!(game_id = %game_id, "Subscriber connected");

    let handle = state.hub.subscribe(game_id.clone(), sink.clone()).await;

    // The current snapshot goes first. A change committed meanwhile may also
    // arrive; viewers drop it by sequence.
    let initial = match state.store.get(&game_id).await {
        Ok(Some(stored)) => Some(GameFrame::snapshot(stored.sequence, stored.snapshot)),
        Ok(None) => None,
        Err(e) => {
            tracing::error!(game_id = %game_id, "Failed to load initial snapshot: {e}");
            Some(ServerFrame::Error {
                message: format!("failed to load game: {e}"),
            })
        }
    };
    if let Some(frame) = initial {
        match frame.encode() {
            Ok(text) => {
                if let Err(e) = sink.send(&text) {
                    tracing::warn!(game_id = %game_id, "Initial snapshot not queued: {e}");
                }
            }
            Err(e) => tracing::error!(game_id = %game_id, "Failed to encode snapshot: {e}"),
        }
    }

    pump(ws_tx, ws_rx, outbound, sink.closed.clone(), &game_id).await;

    state.hub.release(&handle).await;
    tracing::info!(game_id = %game_id, "Subscriber disconnected");
}

/// Moves queued frames to the socket until either side ends the connection.
async fn pump<W, R, E>(
    mut ws_tx: W,
    mut ws_rx: R,
    mut outbound: mpsc::Receiver<String>,
    closed: CancellationToken,
    game_id: &str,
) where
    W: WsWrite<Message> + Unpin,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    ping_interval.tick().await;

    loop {
        tokio::select! {
            biased;

            _ = closed.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }

            queued = outbound.recv() => {
                match queued {
                    Some(text) => {
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            tracing::debug!(game_id = %game_id, "Write failed, closing subscriber");
                            break;
                        }
                    }
                    None => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                }
            }

            _ = ping_interval.tick() => {
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(game_id = %game_id, "Read failed: {e}");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
}
