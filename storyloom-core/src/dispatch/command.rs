use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{Action, Character, GameSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Create,
    Start,
    SubmitTurn,
}

impl CommandKind {
    /// Operation name used in logs and error messages.
    pub fn operation(&self) -> &'static str {
        match self {
            CommandKind::Create => "create",
            CommandKind::Start => "start",
            CommandKind::SubmitTurn => "submit_turn",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.operation())
    }
}

/// A mutating command for the orchestrator.
///
/// Commands are idempotent per target id on the orchestrator side, so no
/// separate idempotency key is carried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Command {
    /// Create a game. With a `game_id` this recreates an existing game whose
    /// initial content never completed.
    #[serde(rename_all = "camelCase")]
    Create {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        game_id: Option<String>,
        prompt: String,
        characters: Vec<Character>,
    },
    #[serde(rename_all = "camelCase")]
    Start { game_id: String },
    #[serde(rename_all = "camelCase")]
    SubmitTurn {
        game_id: String,
        actions: Vec<Action>,
    },
}

impl Command {
    pub fn create(prompt: impl Into<String>, characters: Vec<Character>) -> Self {
        Command::Create {
            game_id: None,
            prompt: prompt.into(),
            characters,
        }
    }

    /// Recreate command rebuilt from an incomplete snapshot.
    pub fn recreate(snapshot: &GameSnapshot) -> Self {
        Command::Create {
            game_id: Some(snapshot.id.clone()),
            prompt: snapshot.prompt.clone(),
            characters: snapshot.characters.clone(),
        }
    }

    pub fn start(game_id: impl Into<String>) -> Self {
        Command::Start {
            game_id: game_id.into(),
        }
    }

    pub fn submit_turn(game_id: impl Into<String>, actions: Vec<Action>) -> Self {
        Command::SubmitTurn {
            game_id: game_id.into(),
            actions,
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Create { .. } => CommandKind::Create,
            Command::Start { .. } => CommandKind::Start,
            Command::SubmitTurn { .. } => CommandKind::SubmitTurn,
        }
    }

    /// The game this command addresses, if it already exists.
    pub fn target_id(&self) -> Option<&str> {
        match self {
            Command::Create { game_id, .. } => game_id.as_deref(),
            Command::Start { game_id } | Command::SubmitTurn { game_id, .. } => Some(game_id),
        }
    }

    pub fn is_recreate(&self) -> bool {
        matches!(self, Command::Create { game_id: Some(_), .. })
    }
}

/// What the orchestrator returns for an accepted command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandReceipt {
    /// Id of the game the command applied to (new id for a create)
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recreate_targets_existing_game() {
        let snapshot = GameSnapshot::new("g1", "a heist")
            .with_characters(vec![Character::new("c1", "Ada")]);
        let command = Command::recreate(&snapshot);

        assert_eq!(command.kind(), CommandKind::Create);
        assert_eq!(command.target_id(), Some("g1"));
        assert!(command.is_recreate());
        assert!(!Command::create("a heist", vec![]).is_recreate());
    }

    #[test]
    fn test_command_json_shape() {
        let command = Command::submit_turn("g1", vec![Action::new("c1", "run")]);
        let value = serde_json::to_value(&command).unwrap();
        assert_eq!(value["kind"], "submitTurn");
        assert_eq!(value["gameId"], "g1");
        assert_eq!(value["actions"][0]["characterId"], "c1");
    }
}
