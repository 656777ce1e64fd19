//! Ghpulse GitHub - GitHub API access for ghpulse
//!
//! This crate lists organization repositories over GraphQL and repository
//! issues over REST, retrying rate limits and transient failures, and plugs
//! into the core fetch pipeline through [`ghpulse_core::PagedApi`].

mod client;
mod error;
mod graphql;
mod issues;
mod paged;
mod repos;
mod retry;

pub use client::{GitHubClient, RateLimitStatus};
pub use error::{Error, Result};
pub use retry::{rate_limit_wait, ErrorClass, RetryContext};
