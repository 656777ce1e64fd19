//! Error types for ghpulse

use thiserror::Error;

/// Result type alias for ghpulse operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for ghpulse operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The organization does not exist or the token cannot see it
    #[error("Organization {0} not found or not accessible")]
    OrganizationNotFound(String),

    /// The repository does not exist or its issues cannot be read
    #[error("Repository {0} not found or not accessible")]
    RepositoryNotAccessible(String),

    /// Upstream API failure that survived the retry policy
    #[error("API error: {0}")]
    Api(String),

    /// Document store write or read failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the error means the fetch target itself is missing
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::OrganizationNotFound(_) | Error::RepositoryNotAccessible(_)
        )
    }
}

impl From<crate::limiter::LimiterError> for Error {
    fn from(err: crate::limiter::LimiterError) -> Self {
        Error::Other(err.to_string())
    }
}

#[cfg(feature = "database")]
impl From<ghpulse_db::Error> for Error {
    fn from(err: ghpulse_db::Error) -> Self {
        Error::Persistence(err.to_string())
    }
}
