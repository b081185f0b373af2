//! Command dispatch to the external orchestrator.
//!
//! [`CommandDispatcher`] wraps an [`Orchestrator`] with classified retry:
//! transport-level transient failures are retried with exponential backoff
//! and jitter, everything else fails on the spot.

mod command;
mod dispatcher;
mod error;
mod orchestrator;
mod retry;

pub use command::{Command, CommandKind, CommandReceipt};
pub use dispatcher::CommandDispatcher;
pub use error::{DispatchError, OrchestratorError, PermanentKind, TransientKind};
pub use orchestrator::{classify_status, HttpOrchestrator, Orchestrator};
pub use retry::{RetryPolicy, DEFAULT_MAX_RETRIES};
