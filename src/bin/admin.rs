//! Storyloom Admin CLI
//!
//! Inspects and edits the game store directly. Writes go through the change
//! log, so connected viewers see them like any orchestrator write.
//!
//! # Usage
//!
//! ```bash
//! storyloom-admin game list
//! storyloom-admin game show 5f0c...
//! storyloom-admin game put game.json
//! ```
//!
//! # Environment Variables
//!
//! - `STORYLOOM_DATABASE_PATH`: Path to the server database
//! - `STORYLOOM_CONFIG`: Path to the server config file

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use storyloom::{init_db, Config, GameStore};
use storyloom_core::{generate_id, GameSnapshot};

// ============================================================================
// CLI Structure
// ============================================================================

#[derive(Parser)]
#[command(name = "storyloom-admin")]
#[command(version)]
#[command(about = "Storyloom game store administration tool")]
struct Cli {
    /// Path to config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage stored games
    Game(GameCommand),
}

#[derive(Args)]
struct GameCommand {
    #[command(subcommand)]
    command: GameSubcommand,
}

#[derive(Subcommand)]
enum GameSubcommand {
    /// List all games
    List,
    /// Print a game as JSON
    Show {
        /// Game ID
        id: String,
    },
    /// Insert or replace a game from a JSON file
    Put {
        /// Path to the game JSON
        file: PathBuf,
    },
}

// ============================================================================
// Commands
// ============================================================================

fn status_of(game: &GameSnapshot) -> &'static str {
    if game.is_concluded() {
        "concluded"
    } else if !game.scenes.is_empty() {
        "playing"
    } else if game.has_synopsis() {
        "ready"
    } else if game.has_characters() {
        "no synopsis"
    } else {
        "new"
    }
}

async fn list_games(store: &GameStore) -> Result<(), Box<dyn std::error::Error>> {
    let games = store.list().await?;

    if games.is_empty() {
        println!("No games stored.");
        return Ok(());
    }

    println!("{:<38} {:<8} {:<12} {:<40}", "ID", "SEQ", "STATUS", "PROMPT");
    println!("{}", "-".repeat(100));

    for game in &games {
        let prompt: String = game.snapshot.prompt.chars().take(40).collect();
        println!(
            "{:<38} {:<8} {:<12} {:<40}",
            game.snapshot.id,
            game.sequence,
            status_of(&game.snapshot),
            prompt
        );
    }

    println!();
    println!("Total: {} game(s)", games.len());

    Ok(())
}

async fn show_game(store: &GameStore, id: String) -> Result<(), Box<dyn std::error::Error>> {
    match store.get(&id).await? {
        Some(game) => {
            println!("{}", serde_json::to_string_pretty(&game.snapshot)?);
            Ok(())
        }
        None => {
            eprintln!("Error: Game '{}' not found", id);
            std::process::exit(1);
        }
    }
}

/// Gives blank game, scene and turn ids a fresh one.
fn fill_ids(game: &mut GameSnapshot) {
    if game.id.trim().is_empty() {
        game.id = generate_id();
    }
    for scene in &mut game.scenes {
        if scene.id.trim().is_empty() {
            scene.id = generate_id();
        }
        for turn in &mut scene.turns {
            if turn.id.trim().is_empty() {
                turn.id = generate_id();
            }
        }
    }
}

async fn put_game(store: &GameStore, file: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(&file)?;
    let mut game: GameSnapshot = serde_json::from_str(&contents)?;
    fill_ids(&mut game);

    let (action, seq) = if store.get(&game.id).await?.is_some() {
        ("Replaced", store.replace(&game).await?)
    } else {
        ("Inserted", store.insert(&game).await?)
    };

    println!("{} game: {}", action, game.id);
    println!("  Sequence: {}", seq);

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(cli.config)?;
    let pool = init_db(&config.database_path).await?;
    let store = GameStore::new(pool);

    match cli.command {
        Commands::Game(game_cmd) => match game_cmd.command {
            GameSubcommand::List => list_games(&store).await,
            GameSubcommand::Show { id } => show_game(&store, id).await,
            GameSubcommand::Put { file } => put_game(&store, file).await,
        },
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
