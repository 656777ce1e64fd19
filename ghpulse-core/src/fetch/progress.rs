//! Progress events emitted during a fetch run

use std::sync::Arc;

use crate::model::RateLimitInfo;

/// Something observable happened during a fetch run
#[derive(Debug, Clone, PartialEq)]
pub enum FetchEvent {
    /// A checkpoint was picked up
    Resumed {
        repositories: u64,
        issues: u64,
        batches_completed: usize,
    },
    /// A page of repositories was persisted
    RepositoryPage { page: u32, fetched: usize, total: u64 },
    /// Repository pagination finished
    RepositoriesDone { total: u64 },
    /// Issue fetching is about to start
    IssuesStarting { repositories: usize, batches: usize },
    /// All issues of a repository were handled
    IssuesDone {
        repository: String,
        count: u64,
        capped: bool,
    },
    /// A repository's issues could not be read and were counted as zero
    IssuesUnavailable { repository: String },
    /// A batch of repositories finished
    BatchDone {
        completed: usize,
        total: usize,
        succeeded: usize,
        failed: usize,
    },
    /// The API reported a low remaining quota
    QuotaLow { remaining: u64, limit: u64 },
}

/// Receives progress events; shared with concurrently running tasks
pub type ProgressCallback = Arc<dyn Fn(FetchEvent) + Send + Sync>;

/// Send an event if anyone is listening
pub(crate) fn emit(callback: Option<&ProgressCallback>, event: FetchEvent) {
    if let Some(callback) = callback {
        callback(event);
    }
}

/// Emit [`FetchEvent::QuotaLow`] when the quota is running out
pub(crate) fn emit_quota(callback: Option<&ProgressCallback>, rate_limit: Option<&RateLimitInfo>) {
    if let Some(info) = rate_limit.filter(|info| info.is_low()) {
        if let (Some(remaining), Some(limit)) = (info.remaining, info.limit) {
            emit(callback, FetchEvent::QuotaLow { remaining, limit });
        }
    }
}
