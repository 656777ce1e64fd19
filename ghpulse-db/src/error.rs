//! Error types for the document store

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// The document tables could not be created
    #[error("Failed to apply schema: {0}")]
    Schema(#[source] sqlx::Error),

    #[error("Cannot create database directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not determine a cache directory for the database")]
    NoCacheDir,

    /// A stored or incoming document is not valid JSON for its type
    #[error("Invalid document: {0}")]
    Document(#[from] serde_json::Error),

    #[error("No repository {org}/{name} in the store")]
    RepositoryNotFound { org: String, name: String },
}

/// Result type alias for document store operations
pub type Result<T> = std::result::Result<T, Error>;
