//! Fetch command - page an organization's repositories and issues into the store

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use clap::Args;
use ghpulse_core::{
    CheckpointStore, Config, FetchCheckpoint, FetchEvent, FetchPipeline, FetchReport,
    FetchRequest,
};
use ghpulse_db::{Database, DatabaseConfig};
use ghpulse_github::GitHubClient;

/// Fetch all repositories and issues of an organization
#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Organization login
    org: String,

    /// Only keep issues created on or after this date (YYYY-MM-DD or RFC 3339)
    #[arg(long, value_parser = parse_since)]
    since: Option<DateTime<Utc>>,

    /// Ignore any saved checkpoint and start over
    #[arg(long)]
    fresh: bool,
}

impl FetchArgs {
    /// Execute the fetch command
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let client = GitHubClient::from_config(config)?;

        let db = Database::connect(DatabaseConfig::new(&config.storage.database_path))
            .await
            .with_context(|| {
                format!(
                    "Failed to open database {}",
                    config.storage.database_path.display()
                )
            })?;

        let store = CheckpointStore::new(&config.storage.checkpoint_path);
        let pipeline = FetchPipeline::new(
            Arc::new(client),
            Arc::new(db.clone()),
            store.clone(),
            config.fetch.clone(),
        )
        .with_progress(Arc::new(print_event));

        let request = FetchRequest {
            org: self.org.clone(),
            since: self.since,
            fresh: self.fresh,
        };

        println!("Fetching {}...", self.org);
        let result = pipeline.run(request).await;

        // Close on every path so WAL contents are checkpointed
        drop(pipeline);
        db.close().await;

        match result {
            Ok(report) => {
                print_report(&report);
                if report.is_complete() {
                    Ok(())
                } else {
                    anyhow::bail!(
                        "{} repositories failed; re-run the same command to resume",
                        report.failures.len()
                    )
                }
            }
            Err(e) => {
                eprintln!();
                eprintln!("Fetch aborted: {}", e);
                if let Some(saved) = store.load().filter(|saved| saved.org == self.org) {
                    eprintln!("{}", completed_work(&saved));
                }
                if !e.is_not_found() {
                    eprintln!(
                        "Progress is saved in {}; re-run the same command to resume",
                        config.storage.checkpoint_path.display()
                    );
                }
                Err(e.into())
            }
        }
    }
}

fn print_event(event: FetchEvent) {
    match event {
        FetchEvent::Resumed {
            repositories,
            issues,
            batches_completed,
        } => println!(
            "Resuming: {} repositories, {} issues, {} batches already done",
            repositories, issues, batches_completed
        ),
        FetchEvent::RepositoryPage { page, fetched, total } => {
            println!("  repositories page {}: +{} ({} total)", page, fetched, total)
        }
        FetchEvent::RepositoriesDone { total } => println!("Repositories: {}", total),
        FetchEvent::IssuesStarting {
            repositories,
            batches,
        } => println!(
            "Fetching issues of {} repositories in {} batches",
            repositories, batches
        ),
        FetchEvent::IssuesDone {
            repository,
            count,
            capped,
        } => {
            let note = if capped { " (page cap reached)" } else { "" };
            println!("  {}: {} issues{}", repository, count, note)
        }
        FetchEvent::IssuesUnavailable { repository } => {
            println!("  {}: issues not accessible, counted as 0", repository)
        }
        FetchEvent::BatchDone {
            completed,
            total,
            succeeded,
            failed,
        } => println!(
            "Batch {}/{}: {} succeeded, {} failed",
            completed, total, succeeded, failed
        ),
        FetchEvent::QuotaLow { remaining, limit } => {
            println!("  API quota low: {}/{} requests left", remaining, limit)
        }
    }
}

fn print_report(report: &FetchReport) {
    println!();
    println!("Organization: {}", report.org);
    println!("  repositories: {}", report.repositories);
    println!("  issues: {}", report.issues);
    println!(
        "  repositories processed this run: {}",
        report.repositories_processed
    );
    if report.resumed {
        println!("  resumed from checkpoint");
    }
    if !report.failures.is_empty() {
        println!("  failed repositories:");
        for failure in &report.failures {
            println!("    {}: {}", failure.repository, failure.error);
        }
    }
}

/// Work a failed run managed to store, as recorded in its checkpoint
fn completed_work(saved: &FetchCheckpoint) -> String {
    let finished = saved.issues.values().filter(|p| p.complete).count();
    format!(
        "Completed so far: {} repositories{}, {} issues from {} repositories, {}/{} batches",
        saved.repos.count,
        if saved.repos.complete { "" } else { " (listing incomplete)" },
        saved.issue_count(),
        finished,
        saved.progress.batches_completed,
        saved.progress.total_batches
    )
}

/// Accept a calendar date (midnight UTC) or a full RFC 3339 timestamp
fn parse_since(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Ok(at.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|at| at.and_utc())
        .ok_or_else(|| format!("invalid date {:?}, expected YYYY-MM-DD or RFC 3339", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ghpulse_core::StreamProgress;

    #[test]
    fn test_parse_since_date() {
        assert_eq!(
            parse_since("2024-03-01").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_since_rfc3339() {
        assert_eq!(
            parse_since("2024-03-01T12:30:00+02:00").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_completed_work_after_listing_failure() {
        let mut saved = FetchCheckpoint::new("acme");
        saved.repos = StreamProgress {
            end_cursor: Some("cursor".to_string()),
            count: 200,
            pages: 2,
            complete: false,
        };

        assert_eq!(
            completed_work(&saved),
            "Completed so far: 200 repositories (listing incomplete), \
             0 issues from 0 repositories, 0/0 batches"
        );
    }

    #[test]
    fn test_completed_work_during_issue_phase() {
        let mut saved = FetchCheckpoint::new("acme");
        saved.repos = StreamProgress {
            end_cursor: None,
            count: 12,
            pages: 1,
            complete: true,
        };
        saved.issues.insert(
            "api".to_string(),
            StreamProgress {
                end_cursor: None,
                count: 130,
                pages: 2,
                complete: true,
            },
        );
        saved.issues.insert(
            "web".to_string(),
            StreamProgress {
                end_cursor: Some("3".to_string()),
                count: 200,
                pages: 2,
                complete: false,
            },
        );
        saved.progress.batches_completed = 1;
        saved.progress.total_batches = 3;

        assert_eq!(
            completed_work(&saved),
            "Completed so far: 12 repositories, 330 issues from 1 repositories, 1/3 batches"
        );
    }

    #[test]
    fn test_parse_since_invalid() {
        assert!(parse_since("yesterday").is_err());
        assert!(parse_since("2024-13-01").is_err());
    }
}
