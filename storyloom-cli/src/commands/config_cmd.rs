use clap::{Args, Subcommand, ValueEnum};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use crate::config::Config;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Initialize configuration file
    Init,
}

const DEFAULT_CONFIG: &str = r#"# loom configuration

# Sync server pushing game snapshots
server_url: ws://localhost:8080

# Orchestrator receiving create/start/turn commands
orchestrator_url: http://localhost:3000

# Retries for orchestrator commands that fail with a transient error
# retry:
#   max_retries: 3
#   base_delay_ms: 500
#   max_delay_ms: 8000
#   jitter: true
#   attempt_timeout_ms: 30000
"#;

impl ConfigCommand {
    pub fn run(
        &self,
        config: &Config,
        cli_config_path: Option<PathBuf>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!("server_url: {}", config.server_url.value);
                        println!("  source: {}", config.server_url.source);
                        println!();

                        println!("orchestrator_url: {}", config.orchestrator_url.value);
                        println!("  source: {}", config.orchestrator_url.source);
                        println!();

                        let retry = &config.retry.value;
                        println!(
                            "retry: {} retries, {}ms base delay, {}ms max delay",
                            retry.max_retries,
                            retry.base_delay.as_millis(),
                            retry.max_delay.as_millis()
                        );
                        println!("  source: {}", config.retry.source);
                    }
                }
                Ok(())
            }

            ConfigSubcommand::Init => {
                let config_path = cli_config_path.unwrap_or_else(Config::default_config_path);

                if config_path.exists() {
                    println!("Config file already exists: {}", config_path.display());
                    println!("Use 'loom config show' to view current configuration.");
                    return Ok(());
                }

                if let Some(parent) = config_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                let mut file = fs::File::create(&config_path)?;
                file.write_all(DEFAULT_CONFIG.as_bytes())?;

                println!("Created config file: {}", config_path.display());
                println!("\nEdit this file to customize your settings.");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigSource;
    use tempfile::tempdir;

    #[test]
    fn test_init_writes_loadable_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("loom").join("config.yaml");
        let config = Config::load(Some(config_path.clone())).unwrap();

        let cmd = ConfigCommand {
            command: ConfigSubcommand::Init,
        };
        cmd.run(&config, Some(config_path.clone())).unwrap();

        let reloaded = Config::load(Some(config_path)).unwrap();
        assert_eq!(reloaded.server_url.source, ConfigSource::File);
        assert_eq!(reloaded.orchestrator_url.value, "http://localhost:3000");
        assert_eq!(reloaded.retry.source, ConfigSource::Default);
    }
}
