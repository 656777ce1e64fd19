//! Ghpulse Core - fetch engine for GitHub organization metadata
//!
//! This crate pages through an organization's repositories and their issues,
//! persists every page into a document sink, and records progress in a
//! checkpoint so an interrupted run can resume. Network access and storage sit
//! behind the [`PagedApi`] and [`DocumentSink`] traits.

pub mod batch;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod fetch;
pub mod limiter;
pub mod model;
pub mod secrets;
pub mod sink;

pub use batch::{BatchConfig, BatchProgress, BatchResult, BatchScheduler, BatchSummary};
pub use checkpoint::{BatchCheckpoint, CheckpointStore, FetchCheckpoint, StreamProgress};
pub use config::{Config, FetchConfig, GitHubConfig, RetryConfig, StorageConfig};
pub use error::{Error, Result};
pub use fetch::{
    FetchEvent, FetchPipeline, FetchReport, FetchRequest, Page, PagedApi, ProgressCallback,
    RepositoryFailure,
};
pub use limiter::{ConcurrencyLimiter, LimiterError, TaskHandle};
pub use model::{Activity, Issue, IssueState, RateLimitInfo, Repository, RepositorySummary};
pub use secrets::Secrets;
pub use sink::{DocumentSink, UpsertStats};
