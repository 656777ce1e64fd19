//! Document types stored in the database

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A repository document keyed by `(org, name)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryDocument {
    /// Owning organization login
    pub org: String,
    /// Repository name
    pub name: String,
    /// Stargazer count, duplicated out of `data` for ordering
    pub stars: i64,
    /// Last update time reported by GitHub
    pub updated_at: Option<DateTime<Utc>>,
    /// Full document as fetched
    pub data: serde_json::Value,
}

/// An issue document keyed by `(org, repository, number)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueDocument {
    /// Owning organization login
    pub org: String,
    /// Repository name
    pub repository: String,
    /// Issue number within the repository
    pub number: i64,
    /// open / closed
    pub state: String,
    /// When the issue was opened
    pub created_at: DateTime<Utc>,
    /// Full document as fetched
    pub data: serde_json::Value,
}

/// Minimal repository projection used to drive issue fetching
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct RepositorySummaryRow {
    pub org: String,
    pub name: String,
    pub stars: i64,
}

/// Outcome of an `upsert_many` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertStats {
    /// Documents that did not exist before
    pub upserted: u64,
    /// Existing documents whose content changed
    pub modified: u64,
}

impl UpsertStats {
    /// Combine two results
    pub fn merge(self, other: UpsertStats) -> UpsertStats {
        UpsertStats {
            upserted: self.upserted + other.upserted,
            modified: self.modified + other.modified,
        }
    }

    /// Number of documents written
    pub fn written(&self) -> u64 {
        self.upserted + self.modified
    }
}

/// Outcome of writing one document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteOutcome {
    Inserted,
    Modified,
    Unchanged,
}

impl UpsertStats {
    pub(crate) fn record(&mut self, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Inserted => self.upserted += 1,
            WriteOutcome::Modified => self.modified += 1,
            WriteOutcome::Unchanged => {}
        }
    }
}
