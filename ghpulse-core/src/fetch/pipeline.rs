//! Two-phase organization fetch
//!
//! Phase one pages through every repository of the organization. Phase two
//! reads the stored repositories back, most starred first, and fetches each
//! one's issues in paced batches. A shared checkpoint records both phases so a
//! failed or interrupted run resumes instead of starting over.
//!
//! A failing repository does not stop its siblings. A failing store does: the
//! first persistence error ends the issue phase after the current batch.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use super::paginator::{PageStream, Paginator, PaginatorConfig};
use super::progress::{emit, emit_quota, FetchEvent, ProgressCallback};
use super::{Page, PagedApi};
use crate::batch::{BatchConfig, BatchScheduler};
use crate::checkpoint::{BatchCheckpoint, CheckpointStore, FetchCheckpoint, StreamProgress};
use crate::config::FetchConfig;
use crate::limiter::ConcurrencyLimiter;
use crate::model::{Issue, RateLimitInfo, Repository, RepositorySummary};
use crate::sink::DocumentSink;
use crate::{Error, Result};

/// What to fetch
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Organization login
    pub org: String,
    /// Only keep issues created at or after this time
    pub since: Option<DateTime<Utc>>,
    /// Ignore any existing checkpoint
    pub fresh: bool,
}

impl FetchRequest {
    pub fn new(org: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            since: None,
            fresh: false,
        }
    }
}

/// A repository whose issues could not be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryFailure {
    pub repository: String,
    pub error: String,
}

/// Result of a fetch run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchReport {
    pub org: String,
    /// Repositories stored, including earlier runs of a resumed fetch
    pub repositories: u64,
    /// Issues stored, including earlier runs of a resumed fetch
    pub issues: u64,
    /// Repositories whose issues were handled by this run
    pub repositories_processed: usize,
    /// Repositories that failed in this run
    pub failures: Vec<RepositoryFailure>,
    /// Whether the run continued from a checkpoint
    pub resumed: bool,
    /// Whether the checkpoint was removed at the end
    pub checkpoint_cleared: bool,
}

impl FetchReport {
    /// No repository failed
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Checkpoint shared between the pipeline and concurrently running streams
///
/// Every mutation is written through to the store while the lock is held, so
/// writes land in the order they were made.
#[derive(Clone)]
struct SharedCheckpoint {
    inner: Arc<Mutex<FetchCheckpoint>>,
    store: CheckpointStore,
}

impl SharedCheckpoint {
    fn new(checkpoint: FetchCheckpoint, store: CheckpointStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(checkpoint)),
            store,
        }
    }

    fn lock(&self) -> MutexGuard<'_, FetchCheckpoint> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update(&self, apply: impl FnOnce(&mut FetchCheckpoint)) {
        let mut checkpoint = self.lock();
        apply(&mut checkpoint);
        checkpoint.touch();
        self.store.save(&checkpoint);
    }

    fn snapshot(&self) -> FetchCheckpoint {
        self.lock().clone()
    }
}

struct RepositoryStream<'a> {
    org: &'a str,
    page_size: u32,
    api: &'a dyn PagedApi,
    sink: &'a dyn DocumentSink,
    checkpoint: &'a SharedCheckpoint,
    on_progress: Option<&'a ProgressCallback>,
}

#[async_trait]
impl<'a> PageStream for RepositoryStream<'a> {
    type Item = Repository;

    fn target(&self) -> &str {
        self.org
    }

    async fn fetch(&self, cursor: Option<&str>) -> Result<Page<Repository>> {
        self.api
            .organization_repositories(self.org, cursor, self.page_size)
            .await
    }

    async fn persist(&self, items: &[Repository]) -> Result<()> {
        self.sink.upsert_repositories(self.org, items).await?;
        Ok(())
    }

    fn record(&self, progress: &StreamProgress) {
        self.checkpoint.update(|checkpoint| {
            checkpoint.repos = progress.clone();
            checkpoint.last_page = progress.pages;
        });
    }

    fn page_done(
        &self,
        progress: &StreamProgress,
        kept: usize,
        rate_limit: Option<&RateLimitInfo>,
    ) {
        info!(
            org = self.org,
            page = progress.pages,
            fetched = kept,
            total = progress.count,
            "Repository page stored"
        );
        emit(
            self.on_progress,
            FetchEvent::RepositoryPage {
                page: progress.pages,
                fetched: kept,
                total: progress.count,
            },
        );
        emit_quota(self.on_progress, rate_limit);
    }
}

/// State shared by every issue task
struct IssueContext {
    org: String,
    page_size: u32,
    api: Arc<dyn PagedApi>,
    sink: Arc<dyn DocumentSink>,
    checkpoint: SharedCheckpoint,
    paginator: Paginator,
    on_progress: Option<ProgressCallback>,
    store_failed: AtomicBool,
}

struct IssueStream<'a> {
    ctx: &'a IssueContext,
    repository: &'a str,
}

#[async_trait]
impl<'a> PageStream for IssueStream<'a> {
    type Item = Issue;

    fn target(&self) -> &str {
        self.repository
    }

    async fn fetch(&self, cursor: Option<&str>) -> Result<Page<Issue>> {
        self.ctx
            .api
            .repository_issues(&self.ctx.org, self.repository, cursor, self.ctx.page_size)
            .await
    }

    async fn persist(&self, items: &[Issue]) -> Result<()> {
        self.ctx.sink.upsert_issues(&self.ctx.org, items).await?;
        Ok(())
    }

    fn record(&self, progress: &StreamProgress) {
        self.ctx.checkpoint.update(|checkpoint| {
            checkpoint
                .issues
                .insert(self.repository.to_string(), progress.clone());
        });
    }

    fn page_done(
        &self,
        _progress: &StreamProgress,
        _kept: usize,
        rate_limit: Option<&RateLimitInfo>,
    ) {
        emit_quota(self.ctx.on_progress.as_ref(), rate_limit);
    }
}

/// Fetch every issue of one repository, treating an unreadable repository as
/// having none
async fn fetch_repository_issues(ctx: Arc<IssueContext>, repo: RepositorySummary) -> Result<u64> {
    let stream = IssueStream {
        ctx: &ctx,
        repository: &repo.name,
    };
    let start = ctx.checkpoint.lock().issue_progress(&repo.name);

    match ctx.paginator.run(&stream, start).await {
        Ok(outcome) => {
            info!(
                repository = %repo.key(),
                issues = outcome.progress.count,
                pages = outcome.progress.pages,
                capped = outcome.capped,
                "Issues fetched"
            );
            emit(
                ctx.on_progress.as_ref(),
                FetchEvent::IssuesDone {
                    repository: repo.name.clone(),
                    count: outcome.progress.count,
                    capped: outcome.capped,
                },
            );
            Ok(outcome.progress.count)
        }
        Err(Error::RepositoryNotAccessible(reason)) => {
            warn!(repository = %repo.key(), %reason, "Issues not accessible, counting zero");
            ctx.checkpoint.update(|checkpoint| {
                checkpoint
                    .issues
                    .insert(repo.name.clone(), StreamProgress::completed_empty());
            });
            emit(
                ctx.on_progress.as_ref(),
                FetchEvent::IssuesUnavailable {
                    repository: repo.name.clone(),
                },
            );
            Ok(0)
        }
        Err(e @ Error::Persistence(_)) => {
            error!(repository = %repo.key(), error = %e, "Storing issues failed");
            ctx.store_failed.store(true, Ordering::SeqCst);
            Err(e)
        }
        Err(e) => {
            warn!(repository = %repo.key(), error = %e, "Issue fetch failed");
            Err(e)
        }
    }
}

/// Fetches an organization's repositories and issues into a sink
pub struct FetchPipeline {
    api: Arc<dyn PagedApi>,
    sink: Arc<dyn DocumentSink>,
    store: CheckpointStore,
    config: FetchConfig,
    on_progress: Option<ProgressCallback>,
}

impl FetchPipeline {
    pub fn new(
        api: Arc<dyn PagedApi>,
        sink: Arc<dyn DocumentSink>,
        store: CheckpointStore,
        config: FetchConfig,
    ) -> Self {
        Self {
            api,
            sink,
            store,
            config,
            on_progress: None,
        }
    }

    /// Report progress events to `callback`
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// Run both phases for `request.org`
    ///
    /// A failure while listing repositories, or any persistence failure, aborts
    /// the run and returns the error with the checkpoint left in place.
    /// Other failures of individual repositories during the issue phase are
    /// collected in the report instead.
    pub async fn run(&self, request: FetchRequest) -> Result<FetchReport> {
        let org = request.org.as_str();

        let resumed_from = if request.fresh {
            info!(org, "Starting fresh, ignoring any checkpoint");
            None
        } else {
            self.store.load_for(org, self.config.checkpoint_freshness)
        };
        let resumed = resumed_from.is_some();

        if let Some(checkpoint) = &resumed_from {
            info!(
                org,
                repositories = checkpoint.repos.count,
                issues = checkpoint.issue_count(),
                batches_completed = checkpoint.progress.batches_completed,
                "Resuming from checkpoint"
            );
            emit(
                self.on_progress.as_ref(),
                FetchEvent::Resumed {
                    repositories: checkpoint.repos.count,
                    issues: checkpoint.issue_count(),
                    batches_completed: checkpoint.progress.batches_completed,
                },
            );
        }

        let checkpoint = SharedCheckpoint::new(
            resumed_from.unwrap_or_else(|| FetchCheckpoint::new(org)),
            self.store.clone(),
        );

        let repositories = self.fetch_repositories(org, &checkpoint).await?;

        let pending: Vec<RepositorySummary> = {
            let summaries = self.sink.repository_summaries(org).await?;
            let snapshot = checkpoint.snapshot();
            summaries
                .into_iter()
                .filter(|summary| !snapshot.issue_progress(&summary.name).complete)
                .collect()
        };

        let failures = self
            .fetch_issues(org, request.since, pending.clone(), &checkpoint)
            .await?;

        let issues = checkpoint.lock().issue_count();
        let checkpoint_cleared = failures.is_empty();
        if checkpoint_cleared {
            self.store.clear();
            info!(org, repositories, issues, "Fetch complete");
        } else {
            warn!(
                org,
                failed = failures.len(),
                path = %self.store.path().display(),
                "Fetch incomplete, checkpoint kept"
            );
        }

        Ok(FetchReport {
            org: org.to_string(),
            repositories,
            issues,
            repositories_processed: pending.len(),
            failures,
            resumed,
            checkpoint_cleared,
        })
    }

    async fn fetch_repositories(&self, org: &str, checkpoint: &SharedCheckpoint) -> Result<u64> {
        let stream = RepositoryStream {
            org,
            page_size: self.config.repo_page_size,
            api: self.api.as_ref(),
            sink: self.sink.as_ref(),
            checkpoint,
            on_progress: self.on_progress.as_ref(),
        };
        let paginator = Paginator::new(PaginatorConfig {
            page_cap: None,
            checkpoint_every: 1,
            since: None,
            stop_when_filtered_out: false,
        });

        let start = checkpoint.lock().repos.clone();
        let outcome = paginator.run(&stream, start).await?;

        info!(
            org,
            repositories = outcome.progress.count,
            pages = outcome.progress.pages,
            "Repositories fetched"
        );
        emit(
            self.on_progress.as_ref(),
            FetchEvent::RepositoriesDone {
                total: outcome.progress.count,
            },
        );
        Ok(outcome.progress.count)
    }

    async fn fetch_issues(
        &self,
        org: &str,
        since: Option<DateTime<Utc>>,
        pending: Vec<RepositorySummary>,
        checkpoint: &SharedCheckpoint,
    ) -> Result<Vec<RepositoryFailure>> {
        let scheduler = BatchScheduler::new(
            BatchConfig::from(&self.config),
            ConcurrencyLimiter::new(self.config.max_concurrency),
        );
        let total_batches = scheduler.batch_count(pending.len());

        info!(org, repositories = pending.len(), batches = total_batches, "Fetching issues");
        emit(
            self.on_progress.as_ref(),
            FetchEvent::IssuesStarting {
                repositories: pending.len(),
                batches: total_batches,
            },
        );
        checkpoint.update(|cp| {
            cp.progress = BatchCheckpoint {
                batches_completed: 0,
                total_batches,
            };
        });

        let ctx = Arc::new(IssueContext {
            org: org.to_string(),
            page_size: self.config.issue_page_size,
            api: Arc::clone(&self.api),
            sink: Arc::clone(&self.sink),
            checkpoint: checkpoint.clone(),
            paginator: Paginator::new(PaginatorConfig {
                page_cap: Some(self.config.issue_page_cap),
                checkpoint_every: self.config.issue_checkpoint_every,
                since,
                stop_when_filtered_out: true,
            }),
            on_progress: self.on_progress.clone(),
            store_failed: AtomicBool::new(false),
        });

        let summary = scheduler
            .run(
                pending,
                |repo| fetch_repository_issues(Arc::clone(&ctx), repo),
                |progress| {
                    checkpoint.update(|cp| {
                        cp.progress.batches_completed = progress.completed();
                    });
                    emit(
                        self.on_progress.as_ref(),
                        FetchEvent::BatchDone {
                            completed: progress.completed(),
                            total: progress.total,
                            succeeded: progress.succeeded,
                            failed: progress.failed,
                        },
                    );
                    if ctx.store_failed.load(Ordering::SeqCst) {
                        ControlFlow::Break(())
                    } else {
                        ControlFlow::Continue(())
                    }
                },
            )
            .await;

        let store_error = summary.failures().find_map(|(_, error)| match error {
            Error::Persistence(message) => Some(message.clone()),
            _ => None,
        });
        if let Some(message) = store_error {
            error!(
                org,
                batches_completed = summary.batches,
                total_batches,
                path = %self.store.path().display(),
                "Issue phase aborted, checkpoint kept"
            );
            return Err(Error::Persistence(message));
        }

        Ok(summary
            .failures()
            .map(|(repo, error)| RepositoryFailure {
                repository: repo.name.clone(),
                error: error.to_string(),
            })
            .collect())
    }
}
