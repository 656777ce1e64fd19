//! Document store for ghpulse
//!
//! Persists fetched repositories and issues as JSON documents in SQLite,
//! keyed by their natural identity so that every write is an idempotent upsert.

pub mod error;
pub mod models;
pub mod repos;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

pub use error::{Error, Result};
pub use models::{IssueDocument, RepositoryDocument, RepositorySummaryRow, UpsertStats};
pub use repos::{IssuesRepo, RepositoriesRepo};

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: Database::default_path().unwrap_or_else(|_| PathBuf::from("ghpulse.db")),
            max_connections: 5,
        }
    }
}

impl DatabaseConfig {
    /// Create a new database config with the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_connections: 5,
        }
    }

    /// Set the maximum number of connections
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }
}

/// Shared database handle
///
/// Cloning is cheap; every clone shares the same pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to the database and make sure the schema exists
    pub async fn connect(config: DatabaseConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| Error::Directory {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let options =
            SqliteConnectOptions::from_str(&format!("sqlite://{}", config.path.display()))?
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(Duration::from_secs(30))
                .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.apply_schema().await?;

        debug!(path = %config.path.display(), "Opened document store");
        Ok(db)
    }

    /// Get the default database path (~/.cache/ghpulse/ghpulse.db)
    pub fn default_path() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir().ok_or(Error::NoCacheDir)?;
        Ok(cache_dir.join("ghpulse").join("ghpulse.db"))
    }

    /// Create the document tables if they are missing
    pub async fn apply_schema(&self) -> Result<()> {
        let schema = include_str!("../migrations/001_documents.sql");

        sqlx::raw_sql(schema)
            .execute(&self.pool)
            .await
            .map_err(Error::Schema)?;

        Ok(())
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get the repositories collection
    pub fn repositories(&self) -> RepositoriesRepo {
        RepositoriesRepo::new(self.pool.clone())
    }

    /// Get the issues collection
    pub fn issues(&self) -> IssuesRepo {
        IssuesRepo::new(self.pool.clone())
    }

    /// Close the database connection
    pub async fn close(self) {
        self.pool.close().await;
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}
