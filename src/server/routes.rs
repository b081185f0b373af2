use axum::{
    extract::{ws::WebSocketUpgrade, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use storyloom_core::SequenceToken;
use tower_http::trace::TraceLayer;

use super::{ws, AppState};

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Readiness response, mirrors the change feed
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadyResponse {
    watching: bool,
    sequence_token: Option<SequenceToken>,
    subscribers: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_error: Option<String>,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let body = ReadyResponse {
        watching: state.feed.is_watching(),
        sequence_token: state.feed.sequence_token(),
        subscribers: state.hub.subscriber_count().await,
        last_error: state.feed.last_error(),
    };
    let status = if body.watching {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

/// GET /games/{id}/subscribe
async fn subscribe(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws::subscriber_session(socket, state, game_id))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/games/{id}/subscribe", get(subscribe))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
