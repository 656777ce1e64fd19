//! Ghpulse CLI - Command line interface for ghpulse
//!
//! Fetches repository and issue metadata of GitHub organizations into a local
//! document store.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ghpulse_core::Config;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{CheckpointArgs, FetchArgs};

/// Ghpulse: resumable GitHub organization metadata fetcher
#[derive(Parser, Debug)]
#[command(name = "ghpulse")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path of the SQLite document store (overrides config and env)
    #[arg(long, global = true, env = "GHPULSE_DATABASE")]
    database: Option<PathBuf>,

    /// Path of the checkpoint file (overrides config and env)
    #[arg(long, global = true, env = "GHPULSE_CHECKPOINT")]
    checkpoint: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show version information
    Version,

    /// Fetch all repositories and issues of an organization
    #[command(visible_alias = "f")]
    Fetch(FetchArgs),

    /// Inspect or remove the saved checkpoint
    #[command(visible_alias = "cp")]
    Checkpoint(CheckpointArgs),

    /// Show the remaining GitHub API quota
    Limits,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let config = Config::load_with_overrides(cli.database.clone(), cli.checkpoint.clone())?;

    if cli.verbose {
        tracing::debug!(
            database = %config.storage.database_path.display(),
            checkpoint = %config.storage.checkpoint_path.display(),
            "Configuration loaded"
        );
    }

    match cli.command {
        Some(Commands::Version) => {
            println!("ghpulse {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Fetch(args)) => {
            args.execute(&config).await?;
        }
        Some(Commands::Checkpoint(args)) => {
            args.execute(&config)?;
        }
        Some(Commands::Limits) => {
            commands::limits::execute(&config).await?;
        }
        Some(Commands::Config) => {
            commands::config::print(&config);
        }
        None => {
            println!("ghpulse - resumable GitHub organization metadata fetcher");
            println!();
            println!("Use --help for usage information");
        }
    }

    Ok(())
}
