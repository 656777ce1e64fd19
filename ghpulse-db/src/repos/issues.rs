//! Issue documents collection

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::models::{IssueDocument, UpsertStats, WriteOutcome};
use crate::Result;

/// Collection of issue documents keyed by `(org, repository, number)`
#[derive(Clone)]
pub struct IssuesRepo {
    pool: SqlitePool,
}

impl IssuesRepo {
    /// Create a new collection handle
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert new issues and update changed ones in a single transaction
    pub async fn upsert_many(&self, docs: &[IssueDocument]) -> Result<UpsertStats> {
        let mut stats = UpsertStats::default();
        if docs.is_empty() {
            return Ok(stats);
        }

        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for doc in docs {
            let data = serde_json::to_string(&doc.data)?;
            let created_at = doc.created_at.to_rfc3339();

            let inserted = sqlx::query(
                "INSERT INTO issues (org, repository, number, state, created_at, data, fetched_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(org, repository, number) DO NOTHING",
            )
            .bind(&doc.org)
            .bind(&doc.repository)
            .bind(doc.number)
            .bind(&doc.state)
            .bind(&created_at)
            .bind(&data)
            .bind(&now)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            let outcome = if inserted > 0 {
                WriteOutcome::Inserted
            } else {
                let modified = sqlx::query(
                    "UPDATE issues
                     SET state = ?, created_at = ?, data = ?, fetched_at = ?
                     WHERE org = ? AND repository = ? AND number = ? AND data <> ?",
                )
                .bind(&doc.state)
                .bind(&created_at)
                .bind(&data)
                .bind(&now)
                .bind(&doc.org)
                .bind(&doc.repository)
                .bind(doc.number)
                .bind(&data)
                .execute(&mut *tx)
                .await?
                .rows_affected();

                if modified > 0 {
                    WriteOutcome::Modified
                } else {
                    WriteOutcome::Unchanged
                }
            };

            stats.record(outcome);
        }

        tx.commit().await?;

        debug!(
            count = docs.len(),
            upserted = stats.upserted,
            modified = stats.modified,
            "Upserted issues"
        );

        Ok(stats)
    }

    /// Count stored issues for one repository
    pub async fn count_for_repository(&self, org: &str, repository: &str) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM issues WHERE org = ? AND repository = ?")
                .bind(org)
                .bind(repository)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Count stored issues for an organization
    pub async fn count(&self, org: &str) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM issues WHERE org = ?")
            .bind(org)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Count issues by state for an organization
    pub async fn count_by_state(&self, org: &str) -> Result<Vec<(String, i64)>> {
        sqlx::query_as::<_, (String, i64)>(
            "SELECT state, COUNT(*) FROM issues WHERE org = ? GROUP BY state ORDER BY state",
        )
        .bind(org)
        .fetch_all(&self.pool)
        .await
        .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DatabaseConfig};
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup_test_db() -> (Database, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::connect(DatabaseConfig::new(temp_dir.path().join("test.db")))
            .await
            .unwrap();
        (db, temp_dir)
    }

    fn issue(repository: &str, number: i64, state: &str) -> IssueDocument {
        IssueDocument {
            org: "acme".to_string(),
            repository: repository.to_string(),
            number,
            state: state.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            data: json!({ "number": number, "state": state }),
        }
    }

    #[tokio::test]
    async fn test_upsert_issue_page_twice_is_idempotent() {
        let (db, _temp) = setup_test_db().await;
        let issues = db.issues();
        let page: Vec<_> = (1..=4).map(|n| issue("api", n, "open")).collect();

        let first = issues.upsert_many(&page).await.unwrap();
        assert_eq!(first.upserted, 4);

        let second = issues.upsert_many(&page).await.unwrap();
        assert_eq!(second.upserted, 0);
        assert_eq!(second.modified, 0);
        assert_eq!(issues.count_for_repository("acme", "api").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_same_number_in_different_repositories() {
        let (db, _temp) = setup_test_db().await;
        let issues = db.issues();

        issues
            .upsert_many(&[issue("api", 1, "open"), issue("web", 1, "open")])
            .await
            .unwrap();

        assert_eq!(issues.count("acme").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_state_change_counts_as_modified() {
        let (db, _temp) = setup_test_db().await;
        let issues = db.issues();

        issues.upsert_many(&[issue("api", 7, "open")]).await.unwrap();
        let stats = issues
            .upsert_many(&[issue("api", 7, "closed")])
            .await
            .unwrap();
        assert_eq!(stats.modified, 1);

        let counts = issues.count_by_state("acme").await.unwrap();
        assert_eq!(counts, vec![("closed".to_string(), 1)]);
    }
}
