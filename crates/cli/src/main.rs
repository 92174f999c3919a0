//! Turnwise CLI, the main entry point.
//!
//! Commands:
//! - `demo`    Replay a scripted support conversation offline
//! - `budget`  Run context selection over a JSON input file
//! - `config`  Show, locate or validate the configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod offline;

#[derive(Parser)]
#[command(
    name = "turnwise",
    about = "Turnwise: token-budgeted context for multi-turn conversations",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Read configuration from this file instead of ~/.turnwise/config.toml
    #[arg(short, long, global = true, env = "TURNWISE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scripted conversation with an offline generator
    Demo {
        /// Session id to use
        #[arg(short, long, default_value = "demo")]
        session: String,

        /// Persist the transcript as JSON lines under this directory
        #[arg(long)]
        log_dir: Option<PathBuf>,

        /// Override the context budget
        #[arg(long)]
        max_tokens: Option<usize>,
    },

    /// Select context from a JSON file and print the result as JSON
    Budget {
        /// Input file with `messages`, `documents`, and optional `systemPrompt` / `maxTokens`
        input: PathBuf,

        /// Count with the chars/4 estimate instead of cl100k_base
        #[arg(long)]
        heuristic: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the default configuration as TOML
    Default,
    /// Print the config file path
    Path,
    /// Check the configuration for errors
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Demo {
            session,
            log_dir,
            max_tokens,
        } => commands::demo::run(config_path, &session, log_dir, max_tokens).await?,
        Commands::Budget { input, heuristic } => {
            commands::budget::run(config_path, &input, heuristic).await?
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(config_path)?,
            ConfigAction::Default => commands::config_cmd::default(),
            ConfigAction::Path => commands::config_cmd::path(config_path),
            ConfigAction::Validate => commands::config_cmd::validate(config_path)?,
        },
    }

    Ok(())
}
