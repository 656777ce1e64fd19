//! Config command - print the effective configuration

use ghpulse_core::{Config, Secrets};

/// Print the configuration after file, env and flag overrides
pub fn print(config: &Config) {
    println!("Ghpulse Configuration");
    println!("=====================");
    println!();
    println!("GitHub:");
    println!("  api_url: {}", config.github.api_url);
    println!("  graphql_url: {}", config.github.graphql_url);
    println!("  user_agent: {}", config.github.user_agent);
    println!("  timeout: {:?}", config.github.timeout);
    println!();

    let fetch = &config.fetch;
    println!("Fetch:");
    println!("  repo_page_size: {}", fetch.repo_page_size);
    println!("  issue_page_size: {}", fetch.issue_page_size);
    println!("  issue_page_cap: {}", fetch.issue_page_cap);
    println!("  issue_checkpoint_every: {}", fetch.issue_checkpoint_every);
    println!("  max_concurrency: {}", fetch.max_concurrency);
    println!("  batch_size: {}", fetch.batch_size);
    println!("  item_delay: {:?}", fetch.item_delay);
    println!("  batch_delay: {:?}", fetch.batch_delay);
    println!("  checkpoint_freshness: {:?}", fetch.checkpoint_freshness);
    println!();

    let retry = &config.retry;
    println!("Retry:");
    println!("  max_retries: {}", retry.max_retries);
    println!("  backoff: {:?} x {}^n", retry.backoff_unit, retry.backoff_base);
    println!("  rate_limit_buffer: {:?}", retry.rate_limit_buffer);
    println!("  rate_limit_fallback: {:?}", retry.rate_limit_fallback);
    println!();

    println!("Storage:");
    println!("  database: {}", config.storage.database_path.display());
    println!("  checkpoint: {}", config.storage.checkpoint_path.display());
    println!();

    if let Some(path) = Config::default_config_path() {
        println!("Config file: {}", path.display());
        if path.exists() {
            println!("  (exists)");
        } else {
            println!("  (not found - using defaults)");
        }
    }

    let token = Secrets::load()
        .ok()
        .and_then(|secrets| secrets.github_token())
        .is_some();
    println!(
        "GitHub token: {}",
        if token { "configured" } else { "not found" }
    );
}
