//! Limits command - show the remaining GitHub API quota

use chrono::{DateTime, Local};
use ghpulse_core::{Config, RateLimitInfo};
use ghpulse_github::GitHubClient;

/// Execute the limits command
pub async fn execute(config: &Config) -> anyhow::Result<()> {
    let client = GitHubClient::from_config(config)?;
    let status = client.rate_limit().await?;

    println!("GitHub API quota");
    println!("================");
    print_resource("REST", &status.core);
    print_resource("GraphQL", &status.graphql);

    Ok(())
}

fn print_resource(name: &str, info: &RateLimitInfo) {
    let count = |v: Option<u64>| v.map_or_else(|| "?".to_string(), |v| v.to_string());
    let reset = info
        .reset_at
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|at| at.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "unknown".to_string());

    println!(
        "  {:<8} {}/{} remaining, resets at {}",
        name,
        count(info.remaining),
        count(info.limit),
        reset
    );
}
