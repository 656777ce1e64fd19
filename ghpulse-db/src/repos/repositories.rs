//! Repository documents collection

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::models::{RepositoryDocument, RepositorySummaryRow, UpsertStats, WriteOutcome};
use crate::{Error, Result};

/// Collection of repository documents keyed by `(org, name)`
#[derive(Clone)]
pub struct RepositoriesRepo {
    pool: SqlitePool,
}

impl RepositoriesRepo {
    /// Create a new collection handle
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert new documents and update changed ones in a single transaction
    pub async fn upsert_many(&self, docs: &[RepositoryDocument]) -> Result<UpsertStats> {
        let mut stats = UpsertStats::default();
        if docs.is_empty() {
            return Ok(stats);
        }

        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for doc in docs {
            let data = serde_json::to_string(&doc.data)?;
            let updated_at = doc.updated_at.map(|dt| dt.to_rfc3339());

            // The insert comes first so the transaction takes the write lock
            // before reading anything.
            let inserted = sqlx::query(
                "INSERT INTO repositories (org, name, stars, updated_at, data, fetched_at)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT(org, name) DO NOTHING",
            )
            .bind(&doc.org)
            .bind(&doc.name)
            .bind(doc.stars)
            .bind(&updated_at)
            .bind(&data)
            .bind(&now)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            let outcome = if inserted > 0 {
                WriteOutcome::Inserted
            } else {
                let modified = sqlx::query(
                    "UPDATE repositories
                     SET stars = ?, updated_at = ?, data = ?, fetched_at = ?
                     WHERE org = ? AND name = ? AND data <> ?",
                )
                .bind(doc.stars)
                .bind(&updated_at)
                .bind(&data)
                .bind(&now)
                .bind(&doc.org)
                .bind(&doc.name)
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
            "Upserted repositories"
        );

        Ok(stats)
    }

    /// Get one repository document
    pub async fn get(&self, org: &str, name: &str) -> Result<RepositoryDocument> {
        let row = sqlx::query_as::<_, (String, String, i64, Option<String>, String)>(
            "SELECT org, name, stars, updated_at, data FROM repositories
             WHERE org = ? AND name = ?",
        )
        .bind(org)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::RepositoryNotFound {
            org: org.to_string(),
            name: name.to_string(),
        })?;

        let (org, name, stars, updated_at, data) = row;
        Ok(RepositoryDocument {
            org,
            name,
            stars,
            updated_at: updated_at
                .as_deref()
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            data: serde_json::from_str(&data)?,
        })
    }

    /// Repositories of an organization, most starred first
    pub async fn summaries(&self, org: &str) -> Result<Vec<RepositorySummaryRow>> {
        sqlx::query_as::<_, RepositorySummaryRow>(
            "SELECT org, name, stars FROM repositories
             WHERE org = ?
             ORDER BY stars DESC, name ASC",
        )
        .bind(org)
        .fetch_all(&self.pool)
        .await
        .map_err(Into::into)
    }

    /// Count stored repositories of an organization
    pub async fn count(&self, org: &str) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM repositories WHERE org = ?")
            .bind(org)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DatabaseConfig};
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup_test_db() -> (Database, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::connect(DatabaseConfig::new(temp_dir.path().join("test.db")))
            .await
            .unwrap();
        (db, temp_dir)
    }

    fn doc(name: &str, stars: i64) -> RepositoryDocument {
        RepositoryDocument {
            org: "acme".to_string(),
            name: name.to_string(),
            stars,
            updated_at: None,
            data: json!({ "name": name, "stars": stars }),
        }
    }

    #[tokio::test]
    async fn test_upsert_same_page_twice_is_idempotent() {
        let (db, _temp) = setup_test_db().await;
        let repo = db.repositories();
        let page = vec![doc("api", 10), doc("web", 3), doc("cli", 7)];

        let first = repo.upsert_many(&page).await.unwrap();
        assert_eq!(first.upserted, 3);
        assert_eq!(first.modified, 0);
        let before = repo.get("acme", "api").await.unwrap();

        let second = repo.upsert_many(&page).await.unwrap();
        assert_eq!(second, UpsertStats::default());
        assert_eq!(repo.count("acme").await.unwrap(), 3);
        assert_eq!(repo.get("acme", "api").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_upsert_changed_document_is_modified() {
        let (db, _temp) = setup_test_db().await;
        let repo = db.repositories();

        repo.upsert_many(&[doc("api", 10)]).await.unwrap();
        let stats = repo.upsert_many(&[doc("api", 11)]).await.unwrap();

        assert_eq!(stats.upserted, 0);
        assert_eq!(stats.modified, 1);
        assert_eq!(repo.get("acme", "api").await.unwrap().stars, 11);
    }

    #[tokio::test]
    async fn test_summaries_sorted_by_stars() {
        let (db, _temp) = setup_test_db().await;
        let repo = db.repositories();
        repo.upsert_many(&[doc("low", 1), doc("high", 50), doc("mid", 20)])
            .await
            .unwrap();

        let names: Vec<String> = repo
            .summaries("acme")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["high", "mid", "low"]);

        assert!(repo.summaries("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_missing_repository() {
        let (db, _temp) = setup_test_db().await;
        let err = db.repositories().get("acme", "nope").await.unwrap_err();
        assert!(matches!(err, Error::RepositoryNotFound { .. }));
    }
}
