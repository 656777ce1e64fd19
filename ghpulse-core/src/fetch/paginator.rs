//! Cursor pagination as a small state machine
//!
//! A [`Paginator`] drives one [`PageStream`] from its saved position until the
//! server runs out of pages, the page cap is hit, or a `since` filter shows
//! that everything further back is too old. Each page is persisted before the
//! cursor moves, so a recorded cursor never points past unsaved data.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::Page;
use crate::checkpoint::StreamProgress;
use crate::model::{Activity, RateLimitInfo};
use crate::Result;

/// One paged collection: where pages come from, where they go, and where the
/// position is recorded
#[async_trait]
pub trait PageStream: Send + Sync {
    /// Entity type of the stream
    type Item: Activity + Send + Sync;

    /// Name of the stream for logs
    fn target(&self) -> &str;

    /// Fetch the page starting at `cursor`
    async fn fetch(&self, cursor: Option<&str>) -> Result<Page<Self::Item>>;

    /// Persist items of a page
    async fn persist(&self, items: &[Self::Item]) -> Result<()>;

    /// Record the stream position durably
    fn record(&self, progress: &StreamProgress);

    /// Called after each persisted page
    fn page_done(
        &self,
        _progress: &StreamProgress,
        _kept: usize,
        _rate_limit: Option<&RateLimitInfo>,
    ) {
    }
}

/// How a stream is paginated
#[derive(Debug, Clone, Default)]
pub struct PaginatorConfig {
    /// Stop after this many pages, counting resumed ones
    pub page_cap: Option<u32>,
    /// Record the position every this many pages
    pub checkpoint_every: u32,
    /// Keep only items active at or after this time
    pub since: Option<DateTime<Utc>>,
    /// The stream is newest first, so a page filtered to nothing ends it
    pub stop_when_filtered_out: bool,
}

/// What a pagination run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationOutcome {
    /// Final position, including progress from earlier runs
    pub progress: StreamProgress,
    /// Items persisted by this run
    pub fetched: u64,
    /// Pages fetched by this run
    pub pages: u32,
    /// The page cap ended the stream
    pub capped: bool,
    /// The `since` filter ended the stream
    pub stopped_early: bool,
}

enum State {
    Fetching { cursor: Option<String> },
    Done,
}

/// Drives a [`PageStream`] to completion
#[derive(Debug, Clone)]
pub struct Paginator {
    config: PaginatorConfig,
}

impl Paginator {
    pub fn new(config: PaginatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PaginatorConfig {
        &self.config
    }

    /// Paginate `stream` starting from `start`
    ///
    /// Errors from fetching or persisting propagate unchanged; the position
    /// recorded before the failing page stays valid.
    pub async fn run<S: PageStream>(
        &self,
        stream: &S,
        start: StreamProgress,
    ) -> Result<PaginationOutcome> {
        let mut outcome = PaginationOutcome {
            progress: start,
            ..PaginationOutcome::default()
        };

        if outcome.progress.complete {
            debug!(target_name = stream.target(), "Stream already complete");
            return Ok(outcome);
        }

        let checkpoint_every = self.config.checkpoint_every.max(1);
        let mut state = State::Fetching {
            cursor: outcome.progress.end_cursor.clone(),
        };

        loop {
            let cursor = match state {
                State::Fetching { cursor } => cursor,
                State::Done => break,
            };

            let Page {
                items,
                next_cursor,
                has_more,
                rate_limit,
            } = stream.fetch(cursor.as_deref()).await?;

            let received = items.len();
            let kept = self.filter(items);
            let filtered_out = received > 0 && kept.is_empty();

            if !kept.is_empty() {
                stream.persist(&kept).await?;
            }

            let progress = &mut outcome.progress;
            progress.count += kept.len() as u64;
            progress.pages += 1;
            if next_cursor.is_some() {
                progress.end_cursor = next_cursor.clone();
            }
            outcome.fetched += kept.len() as u64;
            outcome.pages += 1;

            debug!(
                target_name = stream.target(),
                page = progress.pages,
                received,
                kept = kept.len(),
                has_more,
                "Page persisted"
            );

            state = match next_cursor {
                _ if !has_more => State::Done,
                None => {
                    warn!(
                        target_name = stream.target(),
                        "Server reported more pages without a cursor"
                    );
                    State::Done
                }
                Some(_) if self.config.page_cap.is_some_and(|cap| progress.pages >= cap) => {
                    info!(
                        target_name = stream.target(),
                        pages = progress.pages,
                        "Page cap reached"
                    );
                    outcome.capped = true;
                    State::Done
                }
                Some(_)
                    if self.config.stop_when_filtered_out
                        && self.config.since.is_some()
                        && filtered_out =>
                {
                    debug!(
                        target_name = stream.target(),
                        "Remaining pages are older than the since filter"
                    );
                    outcome.stopped_early = true;
                    State::Done
                }
                Some(next) => State::Fetching { cursor: Some(next) },
            };

            let done = matches!(state, State::Done);
            if done {
                progress.complete = true;
            }
            if done || progress.pages % checkpoint_every == 0 {
                stream.record(progress);
            }
            stream.page_done(progress, kept.len(), rate_limit.as_ref());
        }

        Ok(outcome)
    }

    fn filter<T: Activity>(&self, items: Vec<T>) -> Vec<T> {
        match self.config.since {
            Some(since) => items
                .into_iter()
                .filter(|item| item.activity_time() >= since)
                .collect(),
            None => items,
        }
    }
}
