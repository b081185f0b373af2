use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{ConfigCommand, CreateCommand, StartCommand, TurnCommand, WatchCommand};
use config::Config;

#[derive(Parser)]
#[command(name = "loom")]
#[command(version)]
#[command(about = "Play Storyloom games from the terminal", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new game
    Create(CreateCommand),

    /// Start a game whose content is ready
    Start(StartCommand),

    /// Submit the actions for the current turn
    Turn(TurnCommand),

    /// Follow a game's status live
    Watch(WatchCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let cli_config_path = cli.config.clone();
    let config = Config::load(cli.config)?;

    match &cli.command {
        Some(Commands::Create(cmd)) => cmd.run(&config)?,
        Some(Commands::Start(cmd)) => cmd.run(&config)?,
        Some(Commands::Turn(cmd)) => cmd.run(&config)?,
        Some(Commands::Watch(cmd)) => cmd.run(&config)?,
        Some(Commands::Config(cmd)) => cmd.run(&config, cli_config_path)?,
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
