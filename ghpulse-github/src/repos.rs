//! Organization repository listing via GraphQL

use chrono::{DateTime, Utc};
use ghpulse_core::{Page, Repository};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::{Error, GitHubClient, Result};

const REPOSITORIES_QUERY: &str = r#"
    query($org: String!, $first: Int!, $after: String) {
        organization(login: $org) {
            repositories(first: $first, after: $after, orderBy: {field: NAME, direction: ASC}) {
                pageInfo {
                    hasNextPage
                    endCursor
                }
                nodes {
                    name
                    description
                    url
                    stargazerCount
                    forkCount
                    primaryLanguage {
                        name
                    }
                    isArchived
                    isFork
                    isPrivate
                    createdAt
                    updatedAt
                    pushedAt
                }
            }
        }
    }
"#;

#[derive(Debug, Deserialize)]
struct OrganizationData {
    organization: Option<OrganizationNode>,
}

#[derive(Debug, Deserialize)]
struct OrganizationNode {
    repositories: RepositoryConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryConnection {
    page_info: PageInfo,
    nodes: Vec<RepositoryNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryNode {
    name: String,
    description: Option<String>,
    url: String,
    stargazer_count: u64,
    fork_count: u64,
    primary_language: Option<LanguageNode>,
    is_archived: bool,
    is_fork: bool,
    is_private: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    pushed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct LanguageNode {
    name: String,
}

impl RepositoryNode {
    fn into_repository(self, owner: &str) -> Repository {
        Repository {
            owner: owner.to_string(),
            name: self.name,
            description: self.description,
            url: self.url,
            stars: self.stargazer_count,
            forks: self.fork_count,
            primary_language: self.primary_language.map(|l| l.name),
            is_archived: self.is_archived,
            is_fork: self.is_fork,
            is_private: self.is_private,
            created_at: self.created_at,
            updated_at: self.updated_at,
            pushed_at: self.pushed_at,
        }
    }
}

impl GitHubClient {
    /// One page of an organization's repositories, ordered by name
    ///
    /// Returns [`Error::NotFound`] when the organization does not resolve.
    pub async fn organization_repositories_page(
        &self,
        org: &str,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<Page<Repository>> {
        debug!(org, cursor, page_size, "Fetching repository page");

        let variables = json!({
            "org": org,
            "first": page_size.min(100),
            "after": cursor,
        });

        let (data, rate_limit) = self
            .execute_graphql::<OrganizationData>(REPOSITORIES_QUERY, variables)
            .await?;

        let connection = data
            .organization
            .ok_or_else(|| Error::NotFound(format!("organization {}", org)))?
            .repositories;

        Ok(Page {
            items: connection
                .nodes
                .into_iter()
                .map(|node| node.into_repository(org))
                .collect(),
            has_more: connection.page_info.has_next_page,
            next_cursor: connection.page_info.end_cursor,
            rate_limit: Some(rate_limit),
        })
    }
}
