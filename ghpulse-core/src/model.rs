//! Entities fetched from GitHub

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Something with a point in time that the `since` filter compares against
pub trait Activity {
    /// Time of the activity relevant for filtering
    fn activity_time(&self) -> DateTime<Utc>;
}

/// A repository belonging to an organization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    /// Owning organization login
    pub owner: String,
    /// Repository name
    pub name: String,
    /// Short description
    pub description: Option<String>,
    /// Web URL
    pub url: String,
    /// Stargazer count
    pub stars: u64,
    /// Fork count
    pub forks: u64,
    /// Primary language, if GitHub detected one
    pub primary_language: Option<String>,
    /// Whether the repository is archived
    pub is_archived: bool,
    /// Whether the repository is a fork
    pub is_fork: bool,
    /// Whether the repository is private
    pub is_private: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last metadata update
    pub updated_at: DateTime<Utc>,
    /// Last push, absent for empty repositories
    pub pushed_at: Option<DateTime<Utc>>,
}

impl Activity for Repository {
    fn activity_time(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// Issue state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

impl IssueState {
    pub fn as_str(&self) -> &str {
        match self {
            IssueState::Open => "open",
            IssueState::Closed => "closed",
        }
    }
}

/// An issue of a repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Repository name (without owner)
    pub repository: String,
    /// Issue number
    pub number: u64,
    /// Issue title
    pub title: String,
    /// Current state
    pub state: IssueState,
    /// Login of the author, absent for deleted accounts
    pub author: Option<String>,
    /// Label names
    pub labels: Vec<String>,
    /// Number of comments
    pub comments: u64,
    /// Web URL
    pub url: String,
    /// When the issue was opened
    pub created_at: DateTime<Utc>,
    /// When the issue was last updated
    pub updated_at: DateTime<Utc>,
    /// When the issue was closed
    pub closed_at: Option<DateTime<Utc>>,
}

impl Activity for Issue {
    fn activity_time(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Minimal projection of a stored repository used to drive issue fetching
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositorySummary {
    /// Owning organization login
    pub org: String,
    /// Repository name
    pub name: String,
    /// Stargazer count
    pub stars: u64,
}

impl RepositorySummary {
    /// Identity key, `org/name`
    pub fn key(&self) -> String {
        format!("{}/{}", self.org, self.name)
    }
}

/// Quota information taken from rate-limit response headers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    /// Requests allowed per window
    pub limit: Option<u64>,
    /// Requests left in the current window
    pub remaining: Option<u64>,
    /// Window reset as epoch seconds
    pub reset_at: Option<i64>,
}

impl RateLimitInfo {
    /// Whether the window is used up
    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }

    /// Whether less than a tenth of the window is left
    pub fn is_low(&self) -> bool {
        match (self.remaining, self.limit) {
            (Some(remaining), Some(limit)) if limit > 0 => remaining * 10 < limit,
            _ => false,
        }
    }
}
