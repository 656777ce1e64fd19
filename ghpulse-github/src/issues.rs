//! Repository issue listing via REST

use chrono::{DateTime, Utc};
use ghpulse_core::{Issue, IssueState, Page};
use reqwest::header::{HeaderMap, LINK};
use serde::Deserialize;
use tracing::debug;

use crate::client::ApiRequest;
use crate::{Error, GitHubClient, Result};

#[derive(Debug, Deserialize)]
struct IssueResponse {
    number: u64,
    title: String,
    state: IssueState,
    user: Option<UserResponse>,
    #[serde(default)]
    labels: Vec<LabelResponse>,
    #[serde(default)]
    comments: u64,
    html_url: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    /// Present when the item is a pull request
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: String,
}

#[derive(Debug, Deserialize)]
struct LabelResponse {
    name: String,
}

impl IssueResponse {
    fn into_issue(self, repository: &str) -> Issue {
        Issue {
            repository: repository.to_string(),
            number: self.number,
            title: self.title,
            state: self.state,
            author: self.user.map(|u| u.login),
            labels: self.labels.into_iter().map(|l| l.name).collect(),
            comments: self.comments,
            url: self.html_url,
            created_at: self.created_at,
            updated_at: self.updated_at,
            closed_at: self.closed_at,
        }
    }
}

/// Whether a `Link` header advertises a next page
fn has_next_link(headers: &HeaderMap) -> bool {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|link| {
            link.split(';')
                .skip(1)
                .any(|param| param.trim().replace(' ', "") == "rel=\"next\"")
        })
}

impl GitHubClient {
    /// One page of a repository's issues, newest first
    ///
    /// The cursor is the 1-based page number. Pull requests, which the issues
    /// endpoint also returns, are dropped.
    pub async fn repository_issues_page(
        &self,
        org: &str,
        repo: &str,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<Page<Issue>> {
        let page = match cursor {
            Some(cursor) => cursor
                .parse::<u32>()
                .map_err(|_| Error::Parse(format!("invalid issue page cursor {:?}", cursor)))?,
            None => 1,
        };
        debug!(org, repo, page, page_size, "Fetching issue page");

        let request = ApiRequest::rest(
            ["repos", org, repo, "issues"],
            vec![
                ("state", "all".to_string()),
                ("sort", "created".to_string()),
                ("direction", "desc".to_string()),
                ("per_page", page_size.min(100).to_string()),
                ("page", page.to_string()),
            ],
        );
        let response = self.execute(&request).await?;
        let items: Vec<IssueResponse> = response.json()?;

        let received = items.len();
        let issues: Vec<Issue> = items
            .into_iter()
            .filter(|item| item.pull_request.is_none())
            .map(|item| item.into_issue(repo))
            .collect();
        debug!(
            org,
            repo,
            page,
            received,
            pull_requests = received - issues.len(),
            "Issue page received"
        );

        let has_more = has_next_link(&response.headers);
        Ok(Page {
            items: issues,
            next_cursor: has_more.then(|| (page + 1).to_string()),
            has_more,
            rate_limit: Some(response.rate_limit),
        })
    }
}
