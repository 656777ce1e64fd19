//! Paginated, checkpointed fetching of organization metadata

mod paginator;
mod pipeline;
mod progress;

#[cfg(test)]
mod testing;

use async_trait::async_trait;

use crate::model::{Issue, RateLimitInfo, Repository};
use crate::Result;

pub use paginator::{PageStream, PaginationOutcome, Paginator, PaginatorConfig};
pub use pipeline::{FetchPipeline, FetchReport, FetchRequest, RepositoryFailure};
pub use progress::{FetchEvent, ProgressCallback};

/// One page of a paged result set
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Entities in server order
    pub items: Vec<T>,
    /// Token for the following page, if the server sent one
    pub next_cursor: Option<String>,
    /// Whether another page exists
    pub has_more: bool,
    /// Quota reported with the response
    pub rate_limit: Option<RateLimitInfo>,
}

impl<T> Page<T> {
    /// The final page of a result set
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
            has_more: false,
            rate_limit: None,
        }
    }

    /// A page followed by more
    pub fn with_next(items: Vec<T>, cursor: impl Into<String>) -> Self {
        Self {
            items,
            next_cursor: Some(cursor.into()),
            has_more: true,
            rate_limit: None,
        }
    }
}

/// Source of paged GitHub data
///
/// Implementations retry rate limits and transient failures themselves; an
/// error returned here is final for that request.
#[async_trait]
pub trait PagedApi: Send + Sync {
    /// One page of an organization's repositories
    ///
    /// Fails with [`crate::Error::OrganizationNotFound`] when the organization
    /// does not exist or is not visible.
    async fn organization_repositories(
        &self,
        org: &str,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<Page<Repository>>;

    /// One page of a repository's issues, newest first
    ///
    /// Fails with [`crate::Error::RepositoryNotAccessible`] when the
    /// repository or its issues cannot be read.
    async fn repository_issues(
        &self,
        org: &str,
        repo: &str,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<Page<Issue>>;
}
