//! Batched fan-out over the concurrency limiter
//!
//! Items are processed in fixed-size batches. Every item of a batch is
//! submitted at once, with its start staggered by its position, and the batch
//! is joined with settle-all semantics: each item ends in success or failure
//! on its own and never cancels its siblings. The progress callback may halt
//! the run between batches.

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::FetchConfig;
use crate::limiter::{ConcurrencyLimiter, LimiterError};

/// Batch sizing and pacing
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Items per batch
    pub batch_size: usize,
    /// Start delay added per position inside a batch
    pub item_delay: Duration,
    /// Pause between batches
    pub batch_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::from(&FetchConfig::default())
    }
}

impl From<&FetchConfig> for BatchConfig {
    fn from(config: &FetchConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            item_delay: config.item_delay,
            batch_delay: config.batch_delay,
        }
    }
}

/// Reported after every finished batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    /// 0-based index of the batch that just finished
    pub index: usize,
    /// Number of batches in the run
    pub total: usize,
    /// Successes in this batch
    pub succeeded: usize,
    /// Failures in this batch
    pub failed: usize,
    /// Items finished so far across all batches
    pub processed: usize,
}

impl BatchProgress {
    /// Batches finished including this one
    pub fn completed(&self) -> usize {
        self.index + 1
    }
}

/// Outcome of one item
#[derive(Debug)]
pub struct BatchResult<I, T, E> {
    /// The input item
    pub item: I,
    /// What the work produced for it
    pub outcome: Result<T, E>,
}

/// Outcome of a whole scheduling run
#[derive(Debug)]
pub struct BatchSummary<I, T, E> {
    /// Every item's result, batch by batch
    pub results: Vec<BatchResult<I, T, E>>,
    /// Items that succeeded
    pub succeeded: usize,
    /// Items that failed
    pub failed: usize,
    /// Number of batches processed
    pub batches: usize,
}

impl<I, T, E> BatchSummary<I, T, E> {
    fn new() -> Self {
        Self {
            results: Vec::new(),
            succeeded: 0,
            failed: 0,
            batches: 0,
        }
    }

    /// Items that failed, with their errors
    pub fn failures(&self) -> impl Iterator<Item = (&I, &E)> {
        self.results
            .iter()
            .filter_map(|r| r.outcome.as_ref().err().map(|e| (&r.item, e)))
    }

    /// Items that succeeded, with their values
    pub fn successes(&self) -> impl Iterator<Item = (&I, &T)> {
        self.results
            .iter()
            .filter_map(|r| r.outcome.as_ref().ok().map(|v| (&r.item, v)))
    }
}

/// Runs work over a list of items in limiter-bounded batches
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    config: BatchConfig,
    limiter: ConcurrencyLimiter,
}

impl BatchScheduler {
    /// Create a scheduler over an existing limiter
    pub fn new(config: BatchConfig, limiter: ConcurrencyLimiter) -> Self {
        Self { config, limiter }
    }

    /// Number of batches `len` items split into
    pub fn batch_count(&self, len: usize) -> usize {
        len.div_ceil(self.config.batch_size.max(1))
    }

    /// Process `items` batch by batch, calling `on_batch` after each one
    ///
    /// Returning `ControlFlow::Break` from `on_batch` stops before the next
    /// batch; items already submitted still settle.
    pub async fn run<I, T, E, W, Fut, P>(
        &self,
        items: Vec<I>,
        work: W,
        mut on_batch: P,
    ) -> BatchSummary<I, T, E>
    where
        I: Clone + Send + 'static,
        T: Send + 'static,
        E: From<LimiterError> + Send + 'static,
        W: Fn(I) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        P: FnMut(&BatchProgress) -> ControlFlow<()>,
    {
        let mut summary = BatchSummary::new();
        let total = self.batch_count(items.len());
        let batch_size = self.config.batch_size.max(1);

        for (index, chunk) in items.chunks(batch_size).enumerate() {
            debug!(batch = index + 1, total, size = chunk.len(), "Starting batch");

            let handles: Vec<_> = chunk
                .iter()
                .cloned()
                .enumerate()
                .map(|(position, item)| {
                    let stagger = self.config.item_delay.saturating_mul(position as u32);
                    let task = work(item.clone());
                    let handle = self.limiter.submit(async move {
                        if !stagger.is_zero() {
                            tokio::time::sleep(stagger).await;
                        }
                        task.await
                    });
                    (item, handle)
                })
                .collect();

            let (mut succeeded, mut failed) = (0, 0);
            for (item, handle) in handles {
                let outcome = match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => Err(E::from(e)),
                };
                if outcome.is_ok() {
                    succeeded += 1;
                } else {
                    failed += 1;
                }
                summary.results.push(BatchResult { item, outcome });
            }

            summary.succeeded += succeeded;
            summary.failed += failed;
            summary.batches += 1;

            let progress = BatchProgress {
                index,
                total,
                succeeded,
                failed,
                processed: summary.results.len(),
            };
            info!(
                batch = progress.completed(),
                total, succeeded, failed, "Batch finished"
            );
            if on_batch(&progress).is_break() {
                info!(
                    batch = progress.completed(),
                    total, "Stopping after batch"
                );
                break;
            }

            if index + 1 < total && !self.config.batch_delay.is_zero() {
                tokio::time::sleep(self.config.batch_delay).await;
            }
        }

        self.limiter.wait_idle().await;
        summary
    }
}
