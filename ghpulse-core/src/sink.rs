//! Persistence sink seam
//!
//! The fetch pipeline writes every page through a [`DocumentSink`]. Writes
//! are upserts keyed by natural identity, so replaying a page is harmless.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::{Issue, Repository, RepositorySummary};
use crate::Result;

/// Counts reported by an upsert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertStats {
    /// New documents
    pub upserted: u64,
    /// Existing documents that changed
    pub modified: u64,
}

/// Document store the pipeline persists into
#[async_trait]
pub trait DocumentSink: Send + Sync {
    /// Upsert repositories keyed by `(org, name)`
    async fn upsert_repositories(&self, org: &str, repos: &[Repository]) -> Result<UpsertStats>;

    /// Upsert issues keyed by `(org, repository, number)`
    async fn upsert_issues(&self, org: &str, issues: &[Issue]) -> Result<UpsertStats>;

    /// Stored repositories of an organization, most starred first
    async fn repository_summaries(&self, org: &str) -> Result<Vec<RepositorySummary>>;
}

#[cfg(feature = "database")]
mod database {
    use super::*;
    use ghpulse_db::{Database, IssueDocument, RepositoryDocument};

    impl From<ghpulse_db::UpsertStats> for UpsertStats {
        fn from(stats: ghpulse_db::UpsertStats) -> Self {
            Self {
                upserted: stats.upserted,
                modified: stats.modified,
            }
        }
    }

    fn repository_document(org: &str, repo: &Repository) -> Result<RepositoryDocument> {
        Ok(RepositoryDocument {
            org: org.to_string(),
            name: repo.name.clone(),
            stars: i64::try_from(repo.stars).unwrap_or(i64::MAX),
            updated_at: Some(repo.updated_at),
            data: serde_json::to_value(repo)?,
        })
    }

    fn issue_document(org: &str, issue: &Issue) -> Result<IssueDocument> {
        Ok(IssueDocument {
            org: org.to_string(),
            repository: issue.repository.clone(),
            number: i64::try_from(issue.number).unwrap_or(i64::MAX),
            state: issue.state.as_str().to_string(),
            created_at: issue.created_at,
            data: serde_json::to_value(issue)?,
        })
    }

    #[async_trait]
    impl DocumentSink for Database {
        async fn upsert_repositories(
            &self,
            org: &str,
            repos: &[Repository],
        ) -> Result<UpsertStats> {
            let docs = repos
                .iter()
                .map(|repo| repository_document(org, repo))
                .collect::<Result<Vec<_>>>()?;
            Ok(self.repositories().upsert_many(&docs).await?.into())
        }

        async fn upsert_issues(&self, org: &str, issues: &[Issue]) -> Result<UpsertStats> {
            let docs = issues
                .iter()
                .map(|issue| issue_document(org, issue))
                .collect::<Result<Vec<_>>>()?;
            Ok(self.issues().upsert_many(&docs).await?.into())
        }

        async fn repository_summaries(&self, org: &str) -> Result<Vec<RepositorySummary>> {
            let rows = self.repositories().summaries(org).await?;
            Ok(rows
                .into_iter()
                .map(|row| RepositorySummary {
                    org: row.org,
                    name: row.name,
                    stars: u64::try_from(row.stars).unwrap_or(0),
                })
                .collect())
        }
    }

}
