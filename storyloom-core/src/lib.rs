//! Storyloom Core Library
//!
//! Shared types and viewer-side logic: the game snapshot model, the push
//! channel protocol, status reconciliation and command dispatch.

pub mod dispatch;
pub mod models;
pub mod protocol;
pub mod reconcile;
pub mod recreate;
pub mod session;
pub mod status;
pub mod sync;

pub use dispatch::{
    Command, CommandDispatcher, CommandKind, CommandReceipt, DispatchError, HttpOrchestrator,
    Orchestrator, OrchestratorError, RetryPolicy,
};
pub use models::{Action, Character, CharacterOption, GameSnapshot, Scene, Turn};
pub use protocol::{generate_id, GameFrame, SequenceToken, ServerFrame};
pub use reconcile::{next, Applied, ReconcileError, Reconciler, Rule, Transition};
pub use recreate::RecreationTrigger;
pub use session::{FrameOutcome, GameSession};
pub use status::{ClientStatus, Phase};
pub use sync::{check_server, SnapshotListener, SnapshotStream, SyncError};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
