//! Storyloom Sync Server
//!
//! Watches the game store's change log and pushes every change to the viewer
//! subscribed to that game.
//!
//! # Configuration
//!
//! Environment variables:
//! - `STORYLOOM_PORT`: Port to listen on (default: 8080)
//! - `STORYLOOM_DATABASE_PATH`: SQLite database (default: <data dir>/storyloom/storyloom.db)
//! - `STORYLOOM_CONFIG`: Path to config file (default: <config dir>/storyloom/config.yaml)
//! - `STORYLOOM_POLL_INTERVAL_MS`: Change-log poll interval (default: 200)
//!
//! # Config File Format
//!
//! ```yaml
//! port: 8080
//! database_path: /var/lib/storyloom/storyloom.db
//! poll_interval_ms: 200
//! batch_size: 64
//! max_resume_attempts: 5
//! resume_backoff_ms: 250
//! ```
//!
//! # Endpoints
//!
//! - `GET /health`: Liveness
//! - `GET /ready`: Change feed state, 503 while not watching
//! - `GET /games/{id}/subscribe`: WebSocket push channel for one game

use std::net::SocketAddr;
use std::sync::Arc;
use storyloom::server::{router, AppState, EventBroadcaster};
use storyloom::{init_db, ChangeFeedConsumer, Config, GameStore, SqliteChangeSource, SyncCoordinator};
use storyloom_core::GameSnapshot;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!("Failed to listen for ctrl-c: {}", e);
            }
            tracing::info!("Shutdown requested");
        }
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("Database: {}", config.database_path.display());
    let pool = init_db(&config.database_path).await?;
    let store = GameStore::new(pool);
    let hub = Arc::new(EventBroadcaster::new());

    let source = SqliteChangeSource::new(&store)
        .with_poll_interval(config.poll_interval())
        .with_batch_size(config.batch_size);
    let consumer = ChangeFeedConsumer::<_, GameSnapshot>::new(source);

    let shutdown = CancellationToken::new();
    let coordinator = SyncCoordinator::new(consumer, hub.clone(), shutdown.clone())
        .spawn(config.watch_config());

    let state = AppState {
        store,
        hub,
        feed: coordinator.status(),
    };
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    coordinator.shutdown().await?;
    tracing::info!("Server stopped");
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storyloom=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match Config::load(None) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        tracing::error!("Server failed: {}", e);
        std::process::exit(1);
    }
}
