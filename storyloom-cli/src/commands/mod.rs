mod config_cmd;
mod game;
mod watch;

pub use config_cmd::ConfigCommand;
pub use game::{CreateCommand, StartCommand, TurnCommand};
pub use watch::WatchCommand;

use storyloom_core::{DispatchError, SyncError};

/// Runtime for commands that talk to the orchestrator or the sync server.
fn runtime() -> Result<tokio::runtime::Runtime, CommandError> {
    tokio::runtime::Runtime::new().map_err(|e| CommandError::RuntimeError(e.to_string()))
}

/// Errors from game commands
#[derive(Debug)]
pub enum CommandError {
    Dispatch(DispatchError),
    Sync(SyncError),
    InvalidArgument(String),
    GameFailed(String),
    ServerUnavailable(String),
    RuntimeError(String),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::Dispatch(e) => write!(f, "{}", e),
            CommandError::Sync(e) => write!(f, "{}", e),
            CommandError::InvalidArgument(e) => write!(f, "Invalid argument: {}", e),
            CommandError::GameFailed(e) => write!(f, "Game failed: {}", e),
            CommandError::ServerUnavailable(url) => {
                write!(f, "Sync server not reachable at {}", url)
            }
            CommandError::RuntimeError(e) => write!(f, "Runtime error: {}", e),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::Dispatch(e) => Some(e),
            CommandError::Sync(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DispatchError> for CommandError {
    fn from(e: DispatchError) -> Self {
        CommandError::Dispatch(e)
    }
}

impl From<SyncError> for CommandError {
    fn from(e: SyncError) -> Self {
        CommandError::Sync(e)
    }
}
