//! Configuration management for ghpulse
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (GHPULSE_*)
//! 3. Config file (~/.config/ghpulse/config.toml)
//! 4. Default values

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// GitHub endpoint configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// Base URL of the REST API
    pub api_url: String,

    /// GraphQL endpoint
    pub graphql_url: String,

    /// User-Agent header sent with every request
    pub user_agent: String,

    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            graphql_url: "https://api.github.com/graphql".to_string(),
            user_agent: concat!("ghpulse/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Pagination and scheduling knobs for a fetch run
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Repositories requested per page
    pub repo_page_size: u32,

    /// Issues requested per page
    pub issue_page_size: u32,

    /// Maximum issue pages fetched per repository
    pub issue_page_cap: u32,

    /// Write the checkpoint every N issue pages
    pub issue_checkpoint_every: u32,

    /// Repositories whose issues are fetched at the same time
    pub max_concurrency: usize,

    /// Repositories per scheduling batch
    pub batch_size: usize,

    /// Start delay added per position inside a batch
    #[serde(with = "humantime_serde")]
    pub item_delay: Duration,

    /// Pause between batches
    #[serde(with = "humantime_serde")]
    pub batch_delay: Duration,

    /// Maximum checkpoint age that can still be resumed
    #[serde(with = "humantime_serde")]
    pub checkpoint_freshness: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            repo_page_size: 100,
            issue_page_size: 100,
            issue_page_cap: 5,
            issue_checkpoint_every: 2,
            max_concurrency: 3,
            batch_size: 5,
            item_delay: Duration::from_millis(250),
            batch_delay: Duration::from_millis(2500),
            checkpoint_freshness: Duration::from_secs(3600),
        }
    }
}

/// Retry policy for API requests
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Backoff rounds allowed for transient failures
    pub max_retries: u32,

    /// Growth factor between backoff rounds
    pub backoff_base: u32,

    /// Delay of the first backoff round
    #[serde(with = "humantime_serde")]
    pub backoff_unit: Duration,

    /// Extra wait added after the advertised rate-limit reset
    #[serde(with = "humantime_serde")]
    pub rate_limit_buffer: Duration,

    /// Wait used when a rate-limited response has no reset header
    #[serde(with = "humantime_serde")]
    pub rate_limit_fallback: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: 3,
            backoff_unit: Duration::from_secs(1),
            rate_limit_buffer: Duration::from_secs(1),
            rate_limit_fallback: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// Delay before backoff round `attempt` (0-based): `unit * base^attempt`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = self.backoff_base.saturating_pow(attempt);
        self.backoff_unit.saturating_mul(factor)
    }
}

/// Local file locations
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite document store
    pub database_path: PathBuf,

    /// Fetch checkpoint file
    pub checkpoint_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ghpulse");

        Self {
            database_path: cache_dir.join("ghpulse.db"),
            checkpoint_path: cache_dir.join("checkpoint.json"),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// GitHub endpoints
    pub github: GitHubConfig,

    /// Fetch pipeline settings
    pub fetch: FetchConfig,

    /// Request retry policy
    pub retry: RetryConfig,

    /// File locations
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from the default config file location
    ///
    /// Returns default config if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::default_config_path() {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Get the default config file path
    ///
    /// Returns `~/.config/ghpulse/config.toml` on Unix
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("ghpulse").join("config.toml"))
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables:
    /// - GHPULSE_API_URL: REST base URL
    /// - GHPULSE_GRAPHQL_URL: GraphQL endpoint
    /// - GHPULSE_DATABASE: document store path
    /// - GHPULSE_CHECKPOINT: checkpoint file path
    /// - GHPULSE_MAX_CONCURRENCY: parallel repository fetches
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("GHPULSE_API_URL") {
            self.github.api_url = url;
        }

        if let Ok(url) = std::env::var("GHPULSE_GRAPHQL_URL") {
            self.github.graphql_url = url;
        }

        if let Ok(path) = std::env::var("GHPULSE_DATABASE") {
            self.storage.database_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("GHPULSE_CHECKPOINT") {
            self.storage.checkpoint_path = PathBuf::from(path);
        }

        if let Some(n) = std::env::var("GHPULSE_MAX_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.fetch.max_concurrency = n;
        }

        self
    }

    /// Apply CLI flag overrides
    pub fn with_cli_overrides(
        mut self,
        database_path: Option<PathBuf>,
        checkpoint_path: Option<PathBuf>,
    ) -> Self {
        if let Some(path) = database_path {
            self.storage.database_path = path;
        }

        if let Some(path) = checkpoint_path {
            self.storage.checkpoint_path = path;
        }

        self
    }

    /// Load configuration with all overrides applied
    ///
    /// Priority: CLI > env > config file > defaults
    pub fn load_with_overrides(
        database_path: Option<PathBuf>,
        checkpoint_path: Option<PathBuf>,
    ) -> Result<Self> {
        let config = Self::load()?
            .with_env_overrides()
            .with_cli_overrides(database_path, checkpoint_path);
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let fetch = &self.fetch;

        if fetch.max_concurrency == 0 {
            return Err(Error::Config("fetch.max_concurrency must be at least 1".into()));
        }
        if fetch.batch_size == 0 {
            return Err(Error::Config("fetch.batch_size must be at least 1".into()));
        }
        if fetch.issue_checkpoint_every == 0 {
            return Err(Error::Config(
                "fetch.issue_checkpoint_every must be at least 1".into(),
            ));
        }
        for (name, size) in [
            ("repo_page_size", fetch.repo_page_size),
            ("issue_page_size", fetch.issue_page_size),
        ] {
            if !(1..=100).contains(&size) {
                return Err(Error::Config(format!(
                    "fetch.{} must be between 1 and 100, got {}",
                    name, size
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.fetch.max_concurrency, 3);
        assert_eq!(config.fetch.batch_size, 5);
        assert_eq!(config.fetch.issue_page_cap, 5);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.fetch.checkpoint_freshness, Duration::from_secs(3600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backoff_delay_grows_by_base() {
        let retry = RetryConfig::default();
        assert_eq!(retry.backoff_delay(0), Duration::from_millis(1000));
        assert_eq!(retry.backoff_delay(1), Duration::from_millis(3000));
        assert_eq!(retry.backoff_delay(2), Duration::from_millis(9000));
    }

    #[test]
    fn test_cli_overrides() {
        let config = Config::default().with_cli_overrides(
            Some(PathBuf::from("/tmp/ghpulse.db")),
            Some(PathBuf::from("/tmp/cp.json")),
        );

        assert_eq!(config.storage.database_path, PathBuf::from("/tmp/ghpulse.db"));
        assert_eq!(config.storage.checkpoint_path, PathBuf::from("/tmp/cp.json"));
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[fetch]
max_concurrency = 5
batch_delay = "3s"
item_delay = "200ms"

[retry]
rate_limit_fallback = "2m"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.fetch.max_concurrency, 5);
        assert_eq!(config.fetch.batch_delay, Duration::from_secs(3));
        assert_eq!(config.fetch.item_delay, Duration::from_millis(200));
        assert_eq!(config.retry.rate_limit_fallback, Duration::from_secs(120));
        // untouched values keep their defaults
        assert_eq!(config.fetch.batch_size, 5);
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.fetch.max_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_page() {
        let mut config = Config::default();
        config.fetch.issue_page_size = 101;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("issue_page_size"));
    }
}
