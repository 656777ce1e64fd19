//! Checkpoint command - inspect or remove saved fetch progress

use chrono::Utc;
use clap::{Args, Subcommand};
use ghpulse_core::{CheckpointStore, Config};

/// Inspect or remove the saved checkpoint
#[derive(Args, Debug)]
pub struct CheckpointArgs {
    #[command(subcommand)]
    command: CheckpointCommand,
}

#[derive(Subcommand, Debug)]
enum CheckpointCommand {
    /// Print the saved checkpoint
    Show {
        /// Print the raw JSON document
        #[arg(long)]
        json: bool,
    },
    /// Delete the saved checkpoint
    Clear,
}

impl CheckpointArgs {
    /// Execute the checkpoint command
    pub fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let store = CheckpointStore::new(&config.storage.checkpoint_path);

        match self.command {
            CheckpointCommand::Show { json } => {
                let Some(checkpoint) = store.load() else {
                    println!("No checkpoint at {}", store.path().display());
                    return Ok(());
                };

                if json {
                    println!("{}", serde_json::to_string_pretty(&checkpoint)?);
                    return Ok(());
                }

                let age = checkpoint.age(Utc::now());
                let fresh = age <= config.fetch.checkpoint_freshness;
                let complete = checkpoint.issues.values().filter(|p| p.complete).count();

                println!("Checkpoint: {}", store.path().display());
                println!("  organization: {}", checkpoint.org);
                println!(
                    "  last updated: {} ({} min ago, {})",
                    checkpoint.last_updated.to_rfc3339(),
                    age.as_secs() / 60,
                    if fresh { "resumable" } else { "stale" }
                );
                println!(
                    "  repositories: {} in {} pages{}",
                    checkpoint.repos.count,
                    checkpoint.last_page,
                    if checkpoint.repos.complete { ", complete" } else { "" }
                );
                println!(
                    "  issues: {} across {} repositories ({} complete)",
                    checkpoint.issue_count(),
                    checkpoint.issues.len(),
                    complete
                );
                println!(
                    "  batches: {}/{}",
                    checkpoint.progress.batches_completed, checkpoint.progress.total_batches
                );
            }
            CheckpointCommand::Clear => {
                store.clear();
                println!("Checkpoint cleared: {}", store.path().display());
            }
        }

        Ok(())
    }
}
