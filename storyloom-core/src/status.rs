//! Client-side game status.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::dispatch::CommandKind;

/// Discrete status a viewer derives from successive game snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ClientStatus {
    #[default]
    #[serde(rename = "idle")]
    Idle,
    #[serde(rename = "creating_inProgress")]
    CreatingInProgress,
    #[serde(rename = "creating_awaitingCharacters")]
    CreatingAwaitingCharacters,
    #[serde(rename = "creating_awaitingSynopsis")]
    CreatingAwaitingSynopsis,
    #[serde(rename = "loading_awaitingData")]
    LoadingAwaitingData,
    #[serde(rename = "recreating_inProgress")]
    RecreatingInProgress,
    #[serde(rename = "recreating_awaitingData")]
    RecreatingAwaitingData,
    #[serde(rename = "starting_inProgress")]
    StartingInProgress,
    #[serde(rename = "starting_awaitingScene")]
    StartingAwaitingScene,
    #[serde(rename = "starting_awaitingFirstTurn")]
    StartingAwaitingFirstTurn,
    #[serde(rename = "turnSubmitting")]
    TurnSubmitting,
    #[serde(rename = "turnSubmitted_awaitingResolution")]
    TurnSubmittedAwaitingResolution,
    #[serde(rename = "awaitingNextScene")]
    AwaitingNextScene,
    #[serde(rename = "readyToStart")]
    ReadyToStart,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "concluded")]
    Concluded,
}

/// Coarse grouping of statuses used by the transition rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the orchestrator to fill in characters and synopsis
    AwaitingInitialContent,
    /// A scene or turn is being produced remotely
    ActiveGeneration,
    /// Nothing is pending on the remote side
    Settled,
    /// The game is over
    Terminal,
}

impl ClientStatus {
    pub const ALL: [ClientStatus; 16] = [
        ClientStatus::Idle,
        ClientStatus::CreatingInProgress,
        ClientStatus::CreatingAwaitingCharacters,
        ClientStatus::CreatingAwaitingSynopsis,
        ClientStatus::LoadingAwaitingData,
        ClientStatus::RecreatingInProgress,
        ClientStatus::RecreatingAwaitingData,
        ClientStatus::StartingInProgress,
        ClientStatus::StartingAwaitingScene,
        ClientStatus::StartingAwaitingFirstTurn,
        ClientStatus::TurnSubmitting,
        ClientStatus::TurnSubmittedAwaitingResolution,
        ClientStatus::AwaitingNextScene,
        ClientStatus::ReadyToStart,
        ClientStatus::Failed,
        ClientStatus::Concluded,
    ];

    pub fn phase(self) -> Phase {
        match self {
            ClientStatus::CreatingInProgress
            | ClientStatus::CreatingAwaitingCharacters
            | ClientStatus::CreatingAwaitingSynopsis
            | ClientStatus::LoadingAwaitingData
            | ClientStatus::RecreatingInProgress
            | ClientStatus::RecreatingAwaitingData => Phase::AwaitingInitialContent,
            ClientStatus::StartingInProgress
            | ClientStatus::StartingAwaitingScene
            | ClientStatus::StartingAwaitingFirstTurn
            | ClientStatus::TurnSubmitting
            | ClientStatus::TurnSubmittedAwaitingResolution
            | ClientStatus::AwaitingNextScene => Phase::ActiveGeneration,
            ClientStatus::Idle | ClientStatus::ReadyToStart | ClientStatus::Failed => {
                Phase::Settled
            }
            ClientStatus::Concluded => Phase::Terminal,
        }
    }

    /// True while something is expected to arrive from the remote side.
    pub fn is_waiting(self) -> bool {
        matches!(
            self.phase(),
            Phase::AwaitingInitialContent | Phase::ActiveGeneration
        )
    }

    pub fn is_recreating(self) -> bool {
        matches!(
            self,
            ClientStatus::RecreatingInProgress | ClientStatus::RecreatingAwaitingData
        )
    }

    /// Status to show while a user-initiated command is on its way.
    pub fn for_command(kind: CommandKind, recreate: bool) -> Self {
        match kind {
            CommandKind::Create if recreate => ClientStatus::RecreatingInProgress,
            CommandKind::Create => ClientStatus::CreatingInProgress,
            CommandKind::Start => ClientStatus::StartingInProgress,
            CommandKind::SubmitTurn => ClientStatus::TurnSubmitting,
        }
    }

    /// Status once the orchestrator has accepted the command behind `self`.
    ///
    /// Statuses that are not waiting on an acknowledgement are returned as-is.
    pub fn acknowledged(self) -> Self {
        match self {
            ClientStatus::StartingInProgress => ClientStatus::StartingAwaitingScene,
            ClientStatus::TurnSubmitting => ClientStatus::TurnSubmittedAwaitingResolution,
            ClientStatus::RecreatingInProgress => ClientStatus::RecreatingAwaitingData,
            other => other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClientStatus::Idle => "idle",
            ClientStatus::CreatingInProgress => "creating_inProgress",
            ClientStatus::CreatingAwaitingCharacters => "creating_awaitingCharacters",
            ClientStatus::CreatingAwaitingSynopsis => "creating_awaitingSynopsis",
            ClientStatus::LoadingAwaitingData => "loading_awaitingData",
            ClientStatus::RecreatingInProgress => "recreating_inProgress",
            ClientStatus::RecreatingAwaitingData => "recreating_awaitingData",
            ClientStatus::StartingInProgress => "starting_inProgress",
            ClientStatus::StartingAwaitingScene => "starting_awaitingScene",
            ClientStatus::StartingAwaitingFirstTurn => "starting_awaitingFirstTurn",
            ClientStatus::TurnSubmitting => "turnSubmitting",
            ClientStatus::TurnSubmittedAwaitingResolution => "turnSubmitted_awaitingResolution",
            ClientStatus::AwaitingNextScene => "awaitingNextScene",
            ClientStatus::ReadyToStart => "readyToStart",
            ClientStatus::Failed => "failed",
            ClientStatus::Concluded => "concluded",
        }
    }
}

impl fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_names_match_display() {
        for status in ClientStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status));
            let back: ClientStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(back, status);
        }
    }

    #[test]
    fn test_waiting_statuses() {
        assert!(ClientStatus::CreatingInProgress.is_waiting());
        assert!(ClientStatus::TurnSubmitting.is_waiting());
        assert!(!ClientStatus::Idle.is_waiting());
        assert!(!ClientStatus::ReadyToStart.is_waiting());
        assert!(!ClientStatus::Concluded.is_waiting());
        assert!(!ClientStatus::Failed.is_waiting());
    }

    #[test]
    fn test_acknowledged() {
        assert_eq!(
            ClientStatus::StartingInProgress.acknowledged(),
            ClientStatus::StartingAwaitingScene
        );
        assert_eq!(
            ClientStatus::TurnSubmitting.acknowledged(),
            ClientStatus::TurnSubmittedAwaitingResolution
        );
        assert_eq!(
            ClientStatus::RecreatingInProgress.acknowledged(),
            ClientStatus::RecreatingAwaitingData
        );
        assert_eq!(ClientStatus::Idle.acknowledged(), ClientStatus::Idle);
    }

    #[test]
    fn test_for_command() {
        assert_eq!(
            ClientStatus::for_command(CommandKind::Create, true),
            ClientStatus::RecreatingInProgress
        );
        assert_eq!(
            ClientStatus::for_command(CommandKind::Create, false),
            ClientStatus::CreatingInProgress
        );
        assert_eq!(
            ClientStatus::for_command(CommandKind::SubmitTurn, false),
            ClientStatus::TurnSubmitting
        );
    }
}
