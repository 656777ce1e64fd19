//! [`PagedApi`] implementation for the fetch pipeline

use async_trait::async_trait;
use ghpulse_core::{Issue, Page, PagedApi, Repository};

use crate::{Error, GitHubClient};

#[async_trait]
impl PagedApi for GitHubClient {
    async fn organization_repositories(
        &self,
        org: &str,
        cursor: Option<&str>,
        page_size: u32,
    ) -> ghpulse_core::Result<Page<Repository>> {
        self.organization_repositories_page(org, cursor, page_size)
            .await
            .map_err(|e| match e {
                Error::NotFound(_) => ghpulse_core::Error::OrganizationNotFound(org.to_string()),
                other => other.into(),
            })
    }

    async fn repository_issues(
        &self,
        org: &str,
        repo: &str,
        cursor: Option<&str>,
        page_size: u32,
    ) -> ghpulse_core::Result<Page<Issue>> {
        self.repository_issues_page(org, repo, cursor, page_size)
            .await
            .map_err(|e| match e.status() {
                // Rate-limited 403s never get here; they are retried
                Some(403 | 404 | 410 | 451) => {
                    ghpulse_core::Error::RepositoryNotAccessible(format!("{}/{}: {}", org, repo, e))
                }
                _ => e.into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::client_for;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_missing_issues_map_to_not_accessible() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/gone/issues"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({ "message": "Not Found" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/disabled/issues"))
            .respond_with(
                ResponseTemplate::new(410)
                    .set_body_json(json!({ "message": "Issues are disabled for this repo" })),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        for repo in ["gone", "disabled"] {
            let err = client.repository_issues("acme", repo, None, 100).await.unwrap_err();
            assert!(
                matches!(err, ghpulse_core::Error::RepositoryNotAccessible(_)),
                "{repo}: {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_exhausted_server_errors_map_to_api() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/api/issues"))
            .respond_with(ResponseTemplate::new(500))
            .expect(4)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .repository_issues("acme", "api", None, 100)
            .await
            .unwrap_err();

        assert!(matches!(err, ghpulse_core::Error::Api(_)));
        server.verify().await;
    }

    #[tokio::test]
    async fn test_unknown_organization() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "organization": null }
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .organization_repositories("nope", None, 100)
            .await
            .unwrap_err();

        match err {
            ghpulse_core::Error::OrganizationNotFound(org) => assert_eq!(org, "nope"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
