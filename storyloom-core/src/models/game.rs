use serde::{Deserialize, Serialize};

/// Full current state of one game record.
///
/// Only the last scene's last turn is ever actionable; everything before it
/// is immutable history written by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub id: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub characters: Vec<Character>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synopsis: Option<String>,
    #[serde(default)]
    pub scenes: Vec<Scene>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consequences: Option<String>,
    #[serde(default)]
    pub turns: Vec<Turn>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<CharacterOption>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consequences: Option<String>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

/// The choices offered to one character for the current turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CharacterOption {
    pub character_id: String,
    #[serde(default)]
    pub choices: Vec<String>,
}

/// An action a character takes during a turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub character_id: String,
    pub description: String,
}

/// Returns true if the optional text is present and not blank.
fn has_text(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| !s.trim().is_empty())
}

impl GameSnapshot {
    pub fn new(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_characters(mut self, characters: Vec<Character>) -> Self {
        self.characters = characters;
        self
    }

    pub fn with_synopsis(mut self, synopsis: impl Into<String>) -> Self {
        self.synopsis = Some(synopsis.into());
        self
    }

    pub fn with_scene(mut self, scene: Scene) -> Self {
        self.scenes.push(scene);
        self
    }

    pub fn with_conclusion(mut self, conclusion: impl Into<String>) -> Self {
        self.conclusion = Some(conclusion.into());
        self
    }

    pub fn has_prompt(&self) -> bool {
        !self.prompt.trim().is_empty()
    }

    pub fn has_characters(&self) -> bool {
        !self.characters.is_empty()
    }

    pub fn has_synopsis(&self) -> bool {
        has_text(&self.synopsis)
    }

    pub fn is_concluded(&self) -> bool {
        has_text(&self.conclusion)
    }

    /// The latest turn of the latest scene, the only one that can be acted on.
    pub fn latest_turn(&self) -> Option<&Turn> {
        self.scenes.last().and_then(|scene| scene.turns.last())
    }

    /// True when the latest turn offers options and has not been resolved yet.
    pub fn awaits_player_input(&self) -> bool {
        self.latest_turn().is_some_and(Turn::is_open)
    }
}

impl Character {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
        }
    }
}

impl Scene {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn with_turn(mut self, turn: Turn) -> Self {
        self.turns.push(turn);
        self
    }
}

impl Turn {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_options(mut self, options: Vec<CharacterOption>) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_consequences(mut self, consequences: impl Into<String>) -> Self {
        self.consequences = Some(consequences.into());
        self
    }

    pub fn has_options(&self) -> bool {
        self.options.as_ref().is_some_and(|options| !options.is_empty())
    }

    pub fn is_resolved(&self) -> bool {
        has_text(&self.consequences)
    }

    /// Options offered and no consequences yet: the player must act.
    pub fn is_open(&self) -> bool {
        self.has_options() && !self.is_resolved()
    }
}

impl CharacterOption {
    pub fn new(character_id: impl Into<String>, choices: Vec<String>) -> Self {
        Self {
            character_id: character_id.into(),
            choices,
        }
    }
}

impl Action {
    pub fn new(character_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            character_id: character_id.into(),
            description: description.into(),
        }
    }
}
