//! Status reconciliation from successive game snapshots.
//!
//! [`next`] is the pure transition function. [`Reconciler`] wraps it with the
//! state a viewer keeps between frames: the current status, the last applied
//! snapshot and its feed sequence.

use thiserror::Error;

use crate::models::GameSnapshot;
use crate::protocol::{GameFrame, SequenceToken, ServerFrame};
use crate::status::{ClientStatus, Phase};

/// The rule that produced a transition. Every outcome has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Already concluded; nothing moves it again
    Terminal,
    /// The snapshot carries a conclusion
    Concluded,
    /// The latest turn offers options and has no consequences yet
    AwaitingPlayerInput,
    /// Initial content pending, no characters yet
    AwaitingCharacters,
    /// Initial content pending, characters present but no synopsis
    AwaitingSynopsis,
    /// Characters and synopsis both present
    ContentComplete,
    /// A scene or turn is being generated remotely; status held
    GenerationInProgress,
    /// Nothing pending; status held
    Settled,
}

impl Rule {
    /// True for rules that keep the previous status.
    pub fn retains(self) -> bool {
        matches!(
            self,
            Rule::Terminal | Rule::GenerationInProgress | Rule::Settled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub status: ClientStatus,
    pub rule: Rule,
}

/// Derive the next status from the previous status and a new snapshot.
///
/// Rules are evaluated in priority order and the first match wins. Rules
/// currently inspect only the new snapshot.
pub fn next(
    prev_status: ClientStatus,
    _prev_snapshot: Option<&GameSnapshot>,
    new_snapshot: &GameSnapshot,
) -> Transition {
    let to = |status, rule| Transition { status, rule };

    if prev_status == ClientStatus::Concluded {
        return to(ClientStatus::Concluded, Rule::Terminal);
    }
    if new_snapshot.is_concluded() {
        return to(ClientStatus::Concluded, Rule::Concluded);
    }
    if new_snapshot.awaits_player_input() {
        return to(ClientStatus::Idle, Rule::AwaitingPlayerInput);
    }

    match prev_status.phase() {
        Phase::AwaitingInitialContent => {
            if !new_snapshot.has_characters() {
                to(ClientStatus::CreatingAwaitingCharacters, Rule::AwaitingCharacters)
            } else if !new_snapshot.has_synopsis() {
                to(ClientStatus::CreatingAwaitingSynopsis, Rule::AwaitingSynopsis)
            } else {
                to(ClientStatus::ReadyToStart, Rule::ContentComplete)
            }
        }
        Phase::ActiveGeneration => to(prev_status, Rule::GenerationInProgress),
        Phase::Settled => to(prev_status, Rule::Settled),
        Phase::Terminal => to(prev_status, Rule::Terminal),
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReconcileError {
    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("Server reported an error: {0}")]
    Server(String),
}

/// Outcome of applying one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Changed {
        from: ClientStatus,
        to: ClientStatus,
        rule: Rule,
    },
    Unchanged {
        status: ClientStatus,
        rule: Rule,
    },
    /// The frame was older than (or equal to) the last applied one
    Stale { sequence: SequenceToken },
}

/// Viewer-side status holder for one game.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    status: ClientStatus,
    snapshot: Option<GameSnapshot>,
    last_sequence: Option<SequenceToken>,
    message: Option<String>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from a pre-set status, e.g. `loading_awaitingData` when opening
    /// an existing game.
    pub fn with_status(status: ClientStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn status(&self) -> ClientStatus {
        self.status
    }

    pub fn snapshot(&self) -> Option<&GameSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn last_sequence(&self) -> Option<SequenceToken> {
        self.last_sequence
    }

    /// Message surfaced with the last failure, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Pre-sets an in-progress status for a user action.
    pub fn begin(&mut self, status: ClientStatus) {
        tracing::debug!("status {} -> {} (user action)", self.status, status);
        self.status = status;
        self.message = None;
    }

    /// The orchestrator accepted the pending command.
    pub fn acknowledge(&mut self) {
        let status = self.status.acknowledged();
        if status != self.status {
            tracing::debug!("status {} -> {} (acknowledged)", self.status, status);
            self.status = status;
        }
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("status {} -> failed: {}", self.status, message);
        self.status = ClientStatus::Failed;
        self.message = Some(message);
    }

    /// Parses and applies one text frame from the push channel.
    ///
    /// A frame that does not parse leaves the status untouched.
    pub fn apply_frame(&mut self, text: &str) -> Result<Applied, ReconcileError> {
        let frame = GameFrame::decode(text)
            .map_err(|e| ReconcileError::MalformedSnapshot(e.to_string()))?;

        match frame {
            ServerFrame::Snapshot { sequence, snapshot } => Ok(self.apply(sequence, snapshot)),
            ServerFrame::Error { message } => Err(ReconcileError::Server(message)),
        }
    }

    /// Applies a snapshot, ignoring it if it is not newer than the last one.
    pub fn apply(&mut self, sequence: SequenceToken, snapshot: GameSnapshot) -> Applied {
        if self.last_sequence.is_some_and(|last| sequence <= last) {
            tracing::debug!(
                "Ignoring snapshot {} for {}: already at {:?}",
                sequence,
                snapshot.id,
                self.last_sequence
            );
            return Applied::Stale { sequence };
        }

        let from = self.status;
        let transition = next(from, self.snapshot.as_ref(), &snapshot);
        self.status = transition.status;
        self.snapshot = Some(snapshot);
        self.last_sequence = Some(sequence);

        if transition.status == from {
            if transition.rule.retains() {
                tracing::debug!("status {} retained ({:?})", from, transition.rule);
            }
            Applied::Unchanged {
                status: from,
                rule: transition.rule,
            }
        } else {
            tracing::info!(
                "status {} -> {} ({:?})",
                from,
                transition.status,
                transition.rule
            );
            self.message = None;
            Applied::Changed {
                from,
                to: transition.status,
                rule: transition.rule,
            }
        }
    }

    /// The push channel closed. Returns the failure message if the viewer was
    /// still waiting on something.
    pub fn on_transport_closed(&mut self) -> Option<String> {
        if !self.status.is_waiting() {
            return None;
        }
        let message = format!("Connection closed while {}", self.status);
        self.fail(message.clone());
        Some(message)
    }
}
