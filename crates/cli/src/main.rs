//! Wayfarer CLI: inspect and maintain per-agent trip memory.
//!
//! Commands:
//! - `build`: Render an agent's memory (optionally fitted to a budget)
//! - `persist`: Rebuild and store an agent's memory document
//! - `append`: Append agent notes read from a file or stdin
//! - `notes`: Show the stored notes of one document
//! - `shared`: Show `[shared]` insights visible to an agent
//! - `stats`: Size and token estimates for a trip
//! - `cleanup`: Delete every document of a trip
//! - `sweep`: Delete trips idle past the staleness window
//! - `config`: Validate, show or locate the configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use wayfarer_core::AgentKind;

mod commands;

#[derive(Parser)]
#[command(
    name = "wayfarer",
    about = "Wayfarer — per-agent trip memory store",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Read configuration from this file instead of ~/.wayfarer/config.toml
    #[arg(short, long, global = true, env = "WAYFARER_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render an agent's memory document without storing it
    Build {
        trip_id: String,
        agent: AgentKind,

        /// JSON state snapshot (empty snapshot when omitted)
        #[arg(short, long)]
        snapshot: Option<PathBuf>,

        /// Fit the rendered document into this many tokens
        #[arg(short, long)]
        budget: Option<usize>,

        /// Frame the memory into this base prompt file, using the configured budgets
        #[arg(short, long, conflicts_with = "budget")]
        prompt: Option<PathBuf>,
    },

    /// Rebuild and store an agent's memory document
    Persist {
        trip_id: String,

        /// Agents to persist (all memory agents when omitted)
        agents: Vec<AgentKind>,

        /// JSON state snapshot
        #[arg(short, long)]
        snapshot: Option<PathBuf>,
    },

    /// Append notes (one `- ` bullet per line) from a file or stdin
    Append {
        trip_id: String,
        agent: AgentKind,

        /// Read notes from this file instead of stdin
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Show the stored notes of one document
    Notes { trip_id: String, agent: AgentKind },

    /// Show `[shared]` insights from sibling agents
    Shared { trip_id: String, agent: AgentKind },

    /// Show size and token estimates for a trip's documents
    Stats {
        trip_id: String,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Delete every document of a trip
    Cleanup {
        trip_id: String,

        /// Confirm the deletion
        #[arg(long)]
        confirm: bool,
    },

    /// Delete trips whose newest document is older than the staleness window
    Sweep {
        /// Override `memory.stale_after_days`
        #[arg(long)]
        max_age_days: Option<u32>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Check the configuration and the builder registry
    Validate,
    /// Print the effective configuration as TOML
    Show,
    /// Print the default configuration file path
    Path,
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

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Build {
            trip_id,
            agent,
            snapshot,
            budget,
            prompt,
        } => {
            commands::memory::build(config, &trip_id, agent, snapshot.as_deref(), budget, prompt.as_deref())
                .await?
        }
        Commands::Persist {
            trip_id,
            agents,
            snapshot,
        } => commands::memory::persist(config, &trip_id, &agents, snapshot.as_deref()).await?,
        Commands::Append {
            trip_id,
            agent,
            file,
        } => commands::memory::append(config, &trip_id, agent, file.as_deref()).await?,
        Commands::Notes { trip_id, agent } => commands::memory::notes(config, &trip_id, agent).await?,
        Commands::Shared { trip_id, agent } => commands::memory::shared(config, &trip_id, agent).await?,
        Commands::Stats { trip_id, json } => commands::memory::stats(config, &trip_id, json).await?,
        Commands::Cleanup { trip_id, confirm } => {
            commands::memory::cleanup(config, &trip_id, confirm).await?
        }
        Commands::Sweep { max_age_days } => commands::memory::sweep(config, max_age_days).await?,
        Commands::Config { action } => match action {
            ConfigAction::Validate => commands::config_cmd::validate(config).await?,
            ConfigAction::Show => commands::config_cmd::show(config).await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
        },
    }

    Ok(())
}
