use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, error};

use authgrant::config::load_config;
use authgrant::telemetry::init_logging;

#[derive(Parser, Debug)]
#[command(name = "authgrant", version, about = "Federated authorization core")]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true, env = "AUTHGRANT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Inspect the effective configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the merged configuration as JSON
    Show,
    /// Load and validate the configuration
    Check,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    init_logging(&config.logging)?;
    debug!(path = ?cli.config, "configuration loaded");

    match cli.command {
        Command::Config { action } => match action {
            ConfigAction::Show => {
                let rendered = serde_json::to_string_pretty(config.as_ref())
                    .context("Failed to render configuration")?;
                println!("{rendered}");
            }
            ConfigAction::Check => {
                println!("configuration ok ({})", config.core.auth_server_url);
            }
        },
    }
    Ok(())
}
