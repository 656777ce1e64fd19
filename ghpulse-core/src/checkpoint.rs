//! Durable fetch progress
//!
//! A checkpoint records how far a fetch run got: the repository cursor, a
//! cursor per repository for issues, and how many batches finished. It is
//! rewritten as pages are persisted and deleted once a run finishes cleanly,
//! so an interrupted run can pick up where it stopped.
//!
//! Reads and writes never fail the caller. A missing or corrupt file is an
//! empty checkpoint, and a failed write only costs resumability.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Cursor position of one paged stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamProgress {
    /// Continuation token of the last persisted page
    pub end_cursor: Option<String>,
    /// Items persisted so far
    pub count: u64,
    /// Pages persisted so far
    #[serde(default)]
    pub pages: u32,
    /// Whether the stream reached its end (or its page cap)
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub complete: bool,
}

impl StreamProgress {
    /// Progress that finished without fetching anything
    pub fn completed_empty() -> Self {
        Self {
            complete: true,
            ..Self::default()
        }
    }
}

/// Batch position of the issue phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCheckpoint {
    pub batches_completed: usize,
    pub total_batches: usize,
}

/// Progress record of a fetch run for one organization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchCheckpoint {
    /// Organization the run belongs to
    pub org: String,
    /// Repository pagination
    #[serde(default)]
    pub repos: StreamProgress,
    /// Issue pagination, keyed by repository name
    #[serde(default)]
    pub issues: BTreeMap<String, StreamProgress>,
    /// Number of repository pages persisted
    #[serde(default)]
    pub last_page: u32,
    /// Issue batch progress
    #[serde(default)]
    pub progress: BatchCheckpoint,
    /// Wall-clock time of the last write
    pub last_updated: DateTime<Utc>,
    /// `last_updated` as epoch milliseconds
    pub timestamp: i64,
}

impl FetchCheckpoint {
    /// Start an empty checkpoint for an organization
    pub fn new(org: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            org: org.into(),
            repos: StreamProgress::default(),
            issues: BTreeMap::new(),
            last_page: 0,
            progress: BatchCheckpoint::default(),
            last_updated: now,
            timestamp: now.timestamp_millis(),
        }
    }

    /// Stamp the checkpoint with the current time
    pub fn touch(&mut self) {
        let now = Utc::now();
        self.last_updated = now;
        self.timestamp = now.timestamp_millis();
    }

    /// Age of the checkpoint relative to `now`
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        let millis = now.timestamp_millis().saturating_sub(self.timestamp);
        Duration::from_millis(u64::try_from(millis).unwrap_or(0))
    }

    /// Whether a run for `org` at `now` may resume from this checkpoint
    pub fn is_resumable(&self, org: &str, freshness: Duration, now: DateTime<Utc>) -> bool {
        self.org == org && self.age(now) <= freshness
    }

    /// Issue progress for a repository, or a fresh start
    pub fn issue_progress(&self, repository: &str) -> StreamProgress {
        self.issues.get(repository).cloned().unwrap_or_default()
    }

    /// Total issues recorded across all repositories
    pub fn issue_count(&self) -> u64 {
        self.issues.values().map(|p| p.count).sum()
    }
}

/// File-backed checkpoint storage
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// Create a store for the given file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the checkpoint file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the checkpoint, if there is a readable one
    pub fn load(&self) -> Option<FetchCheckpoint> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read checkpoint");
                return None;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(checkpoint) => Some(checkpoint),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring unparsable checkpoint");
                None
            }
        }
    }

    /// Read the checkpoint only if it can resume a run for `org`
    ///
    /// A checkpoint for another organization, or one older than `freshness`,
    /// is treated as absent.
    pub fn load_for(&self, org: &str, freshness: Duration) -> Option<FetchCheckpoint> {
        let checkpoint = self.load()?;
        let now = Utc::now();

        if checkpoint.org != org {
            info!(
                checkpoint_org = %checkpoint.org,
                org,
                "Discarding checkpoint for a different organization"
            );
            return None;
        }

        if !checkpoint.is_resumable(org, freshness, now) {
            info!(
                org,
                age_secs = checkpoint.age(now).as_secs(),
                "Discarding stale checkpoint"
            );
            return None;
        }

        Some(checkpoint)
    }

    /// Write the checkpoint, logging instead of failing
    pub fn save(&self, checkpoint: &FetchCheckpoint) {
        if let Err(e) = self.try_save(checkpoint) {
            warn!(path = %self.path.display(), error = %e, "Failed to write checkpoint");
        }
    }

    fn try_save(&self, checkpoint: &FetchCheckpoint) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(checkpoint)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;

        debug!(
            org = %checkpoint.org,
            repos = checkpoint.repos.count,
            issues = checkpoint.issue_count(),
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Remove the checkpoint after a clean run
    pub fn clear(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Checkpoint cleared"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to remove checkpoint")
            }
        }
    }
}
