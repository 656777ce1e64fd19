//! Error types for GitHub operations

use thiserror::Error;

/// Result type for GitHub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during GitHub operations
#[derive(Error, Debug)]
pub enum Error {
    /// Transport failure (connect, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response that was not retried, or ran out of retries
    #[error("GitHub API returned {status}: {message}")]
    Status { status: u16, message: String },

    /// GraphQL response carried errors
    #[error("GraphQL errors: {0}")]
    GraphQl(String),

    /// GraphQL reported that an object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Authentication error
    #[error("GitHub authentication error: {0}")]
    Auth(String),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// HTTP status of the failed response, if there was one
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Status { status, .. } => Some(*status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::Parse(format!("invalid URL: {}", err))
    }
}

impl From<Error> for ghpulse_core::Error {
    fn from(err: Error) -> Self {
        ghpulse_core::Error::Api(err.to_string())
    }
}
