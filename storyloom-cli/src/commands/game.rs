use clap::Args;
use storyloom_core::{generate_id, Action, Character, ClientStatus, Command};

use super::watch::{dispatcher, follow, Session, StopAt};
use super::{runtime, CommandError};
use crate::config::Config;

#[derive(Args)]
pub struct CreateCommand {
    /// What the story is about
    pub prompt: String,

    /// Character as NAME or NAME:DESCRIPTION (repeatable)
    #[arg(long = "character", short = 'c')]
    pub characters: Vec<String>,

    /// Follow the game until its content is ready
    #[arg(long, short)]
    pub watch: bool,
}

#[derive(Args)]
pub struct StartCommand {
    /// Game ID
    pub game_id: String,

    /// Follow the game until the first turn is ready
    #[arg(long, short)]
    pub watch: bool,
}

#[derive(Args)]
pub struct TurnCommand {
    /// Game ID
    pub game_id: String,

    /// Action as CHARACTER_ID=DESCRIPTION (repeatable)
    #[arg(long = "action", short = 'a', required = true)]
    pub actions: Vec<String>,

    /// Follow the game until the turn is resolved
    #[arg(long, short)]
    pub watch: bool,
}

fn parse_character(arg: &str) -> Result<Character, CommandError> {
    let (name, description) = match arg.split_once(':') {
        Some((name, description)) => (name.trim(), Some(description.trim())),
        None => (arg.trim(), None),
    };
    if name.is_empty() {
        return Err(CommandError::InvalidArgument(format!(
            "character '{}' has no name",
            arg
        )));
    }

    let mut character = Character::new(generate_id(), name);
    character.description = description
        .filter(|d| !d.is_empty())
        .map(str::to_string);
    Ok(character)
}

fn parse_action(arg: &str) -> Result<Action, CommandError> {
    match arg.split_once('=') {
        Some((character_id, description))
            if !character_id.trim().is_empty() && !description.trim().is_empty() =>
        {
            Ok(Action::new(character_id.trim(), description.trim()))
        }
        _ => Err(CommandError::InvalidArgument(format!(
            "action '{}' must look like CHARACTER_ID=DESCRIPTION",
            arg
        ))),
    }
}

/// Sends `command` through `session`, then follows the game if asked.
async fn submit(
    mut session: Session,
    command: Command,
    config: &Config,
    watch: bool,
) -> Result<(), CommandError> {
    let operation = command.kind().operation();
    let receipt = session.submit(command).await?;
    println!("✓ {} accepted for game {}", operation, receipt.id);

    if watch {
        follow(&mut session, config, StopAt::Settled).await?;
        if session.status() == ClientStatus::Concluded {
            println!("The story has concluded.");
        }
    }
    Ok(())
}

impl CreateCommand {
    pub fn run(&self, config: &Config) -> Result<(), CommandError> {
        let characters = self
            .characters
            .iter()
            .map(|c| parse_character(c))
            .collect::<Result<Vec<_>, _>>()?;

        let rt = runtime()?;
        rt.block_on(async {
            let session = Session::new(dispatcher(config));
            submit(
                session,
                Command::create(self.prompt.clone(), characters),
                config,
                self.watch,
            )
            .await
        })
    }
}

impl StartCommand {
    pub fn run(&self, config: &Config) -> Result<(), CommandError> {
        let rt = runtime()?;
        rt.block_on(async {
            let session = Session::open(&self.game_id, dispatcher(config));
            submit(session, Command::start(&self.game_id), config, self.watch).await
        })
    }
}

impl TurnCommand {
    pub fn run(&self, config: &Config) -> Result<(), CommandError> {
        let actions = self
            .actions
            .iter()
            .map(|a| parse_action(a))
            .collect::<Result<Vec<_>, _>>()?;

        let rt = runtime()?;
        rt.block_on(async {
            let session = Session::open(&self.game_id, dispatcher(config));
            submit(
                session,
                Command::submit_turn(&self.game_id, actions),
                config,
                self.watch,
            )
            .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_character() {
        let character = parse_character("Ada: a lighthouse keeper").unwrap();
        assert_eq!(character.name, "Ada");
        assert_eq!(character.description.as_deref(), Some("a lighthouse keeper"));
        assert!(!character.id.is_empty());

        let character = parse_character("Bram").unwrap();
        assert_eq!(character.name, "Bram");
        assert!(character.description.is_none());

        assert!(parse_character(":nameless").is_err());
    }

    #[test]
    fn test_parse_action() {
        let action = parse_action("c1=open the door").unwrap();
        assert_eq!(action.character_id, "c1");
        assert_eq!(action.description, "open the door");

        assert!(parse_action("open the door").is_err());
        assert!(parse_action("c1=").is_err());
    }
}
