//! Live status of a game, driven by the sync server's push channel.

use clap::Args;
use std::sync::Arc;
use storyloom_core::{
    check_server, Applied, ClientStatus, CommandDispatcher, GameSession, GameSnapshot,
    HttpOrchestrator, Phase, ReconcileError, SnapshotListener,
};

use super::{runtime, CommandError};
use crate::config::Config;

pub type Session = GameSession<HttpOrchestrator>;

/// When following a game stops on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopAt {
    /// First settled or terminal status after a command.
    Settled,
    /// Only when the game concludes or the connection closes.
    Concluded,
}

#[derive(Args)]
pub struct WatchCommand {
    /// Game ID
    pub game_id: String,
}

impl WatchCommand {
    pub fn run(&self, config: &Config) -> Result<(), CommandError> {
        let rt = runtime()?;
        rt.block_on(async {
            let mut session = Session::open(&self.game_id, dispatcher(config));
            follow(&mut session, config, StopAt::Concluded).await
        })
    }
}

pub fn dispatcher(config: &Config) -> Arc<CommandDispatcher<HttpOrchestrator>> {
    Arc::new(CommandDispatcher::with_policy(
        HttpOrchestrator::new(config.orchestrator_url.value.clone()),
        config.retry.value.clone(),
    ))
}

pub fn should_stop(status: ClientStatus, stop_at: StopAt) -> bool {
    match stop_at {
        StopAt::Settled => matches!(status.phase(), Phase::Settled | Phase::Terminal),
        StopAt::Concluded => status == ClientStatus::Concluded,
    }
}

/// Subscribes to the session's game and reports every status change until
/// `stop_at` is reached, the server closes the channel or ctrl-c.
pub async fn follow(
    session: &mut Session,
    config: &Config,
    stop_at: StopAt,
) -> Result<(), CommandError> {
    let game_id = session
        .game_id()
        .map(str::to_string)
        .ok_or_else(|| CommandError::InvalidArgument("no game to watch".to_string()))?;

    let server_url = config.server_url.value.clone();
    if !check_server(&server_url).await {
        return Err(CommandError::ServerUnavailable(server_url));
    }

    let listener = SnapshotListener::new(server_url);
    let mut stream = listener.subscribe(&game_id).await?;
    println!("Watching {} ({})", game_id, session.status());

    loop {
        let frame = tokio::select! {
            frame = stream.next_frame() => frame,
            _ = tokio::signal::ctrl_c() => {
                stream.close().await;
                return Ok(());
            }
        };

        let text = match frame {
            Ok(Some(text)) => text,
            Ok(None) => {
                return match session.on_transport_closed() {
                    Some(message) => Err(CommandError::GameFailed(message)),
                    None => {
                        println!("Connection closed ({})", session.status());
                        Ok(())
                    }
                };
            }
            Err(e) => {
                let message = session
                    .on_transport_closed()
                    .unwrap_or_else(|| e.to_string());
                return Err(CommandError::GameFailed(message));
            }
        };

        let outcome = match session.on_frame(&text).await {
            Ok(outcome) => outcome,
            Err(e) => match frame_error(e) {
                Some(err) => {
                    stream.close().await;
                    return Err(err);
                }
                None => continue,
            },
        };

        match outcome.applied {
            Applied::Changed { from, to, rule } => {
                println!("{} -> {} ({:?})", from, to, rule);
                if let Some(snapshot) = session.snapshot() {
                    print_prompt(snapshot, to);
                }
            }
            Applied::Unchanged { .. } | Applied::Stale { .. } => {}
        }

        match outcome.recreate {
            Some(Ok(_)) => println!("Game content incomplete, requested a recreate"),
            Some(Err(e)) => eprintln!("Recreate failed: {}", e),
            None => {}
        }

        if should_stop(session.status(), stop_at) {
            stream.close().await;
            if session.status() == ClientStatus::Failed {
                let message = session.message().unwrap_or("game failed").to_string();
                return Err(CommandError::GameFailed(message));
            }
            return Ok(());
        }
    }
}

/// Server errors end the watch; a malformed frame is skipped.
fn frame_error(e: ReconcileError) -> Option<CommandError> {
    match e {
        ReconcileError::Server(message) => Some(CommandError::GameFailed(message)),
        ReconcileError::MalformedSnapshot(detail) => {
            tracing::warn!("Ignoring malformed frame: {}", detail);
            None
        }
    }
}

/// Prints what the player can act on for the new status.
fn print_prompt(snapshot: &GameSnapshot, status: ClientStatus) {
    match status {
        ClientStatus::ReadyToStart => {
            if let Some(synopsis) = &snapshot.synopsis {
                println!("\n{}\n", synopsis);
            }
            println!("Run 'loom start {}' to begin.", snapshot.id);
        }
        ClientStatus::Idle => {
            let Some(turn) = snapshot.latest_turn() else {
                return;
            };
            if let Some(scene) = snapshot.scenes.last() {
                println!("\n{}\n", scene.description);
            }
            for option in turn.options.iter().flatten() {
                let name = snapshot
                    .characters
                    .iter()
                    .find(|c| c.id == option.character_id)
                    .map(|c| c.name.as_str())
                    .unwrap_or(option.character_id.as_str());
                println!("{} ({}):", name, option.character_id);
                for choice in &option.choices {
                    println!("  - {}", choice);
                }
            }
        }
        ClientStatus::Concluded => {
            if let Some(conclusion) = &snapshot.conclusion {
                println!("\n{}", conclusion);
            }
        }
        _ => {}
    }
}
