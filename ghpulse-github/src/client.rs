//! GitHub API client using reqwest
//!
//! Every request goes through [`GitHubClient::execute`], which applies the
//! retry policy: rate-limited responses wait for the quota reset and are
//! repeated indefinitely, transient failures back off a bounded number of
//! times, and anything else is returned right away.

use chrono::Utc;
use ghpulse_core::{Config, GitHubConfig, RateLimitInfo, RetryConfig, Secrets};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::graphql::{self, GraphQlResponse};
use crate::retry::{ErrorClass, RetryContext};
use crate::{Error, Result};

/// A request to one of the two GitHub APIs
#[derive(Debug, Clone)]
pub(crate) enum ApiRequest {
    /// `GET` against the REST API
    Rest {
        path: Vec<String>,
        query: Vec<(&'static str, String)>,
    },
    /// `POST` of a GraphQL document
    Graphql {
        query: &'static str,
        variables: serde_json::Value,
    },
}

impl ApiRequest {
    pub(crate) fn rest<S: Into<String>>(
        path: impl IntoIterator<Item = S>,
        query: Vec<(&'static str, String)>,
    ) -> Self {
        ApiRequest::Rest {
            path: path.into_iter().map(Into::into).collect(),
            query,
        }
    }

    fn describe(&self) -> String {
        match self {
            ApiRequest::Rest { path, .. } => format!("GET /{}", path.join("/")),
            ApiRequest::Graphql { .. } => "POST graphql".to_string(),
        }
    }
}

/// A successful response
#[derive(Debug, Clone)]
pub(crate) struct ApiResponse {
    pub headers: HeaderMap,
    pub body: String,
    pub rate_limit: RateLimitInfo,
}

impl ApiResponse {
    pub(crate) fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Current quota of both APIs, as reported by `GET /rate_limit`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub core: RateLimitInfo,
    pub graphql: RateLimitInfo,
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    resources: RateLimitResources,
}

#[derive(Debug, Deserialize)]
struct RateLimitResources {
    core: RateLimitResource,
    graphql: Option<RateLimitResource>,
}

#[derive(Debug, Deserialize)]
struct RateLimitResource {
    limit: u64,
    remaining: u64,
    reset: i64,
}

impl From<RateLimitResource> for RateLimitInfo {
    fn from(resource: RateLimitResource) -> Self {
        RateLimitInfo {
            limit: Some(resource.limit),
            remaining: Some(resource.remaining),
            reset_at: Some(resource.reset),
        }
    }
}

/// GitHub API client with rate-limit aware retries
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: Url,
    graphql_url: Url,
    retry: RetryConfig,
}

impl GitHubClient {
    /// Create a client authenticated with `token`
    pub fn new(token: &str, config: &GitHubConfig, retry: RetryConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| Error::Auth("GitHub token contains invalid characters".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        let api_url = Url::parse(&config.api_url)?;
        if api_url.cannot_be_a_base() {
            return Err(Error::Parse(format!("API URL {} cannot be a base", api_url)));
        }
        let graphql_url = Url::parse(&config.graphql_url)?;

        info!(api_url = %api_url, graphql_url = %graphql_url, "Created GitHub client");

        Ok(Self {
            http,
            api_url,
            graphql_url,
            retry,
        })
    }

    /// Create a client from configuration, loading the token from secrets
    ///
    /// Token is loaded from (in priority order):
    /// 1. GITHUB_TOKEN or GH_TOKEN environment variable
    /// 2. ~/.config/ghpulse/secrets.toml
    pub fn from_config(config: &Config) -> Result<Self> {
        let secrets = Secrets::load().map_err(|e| Error::Auth(e.to_string()))?;

        let token = secrets.github_token().ok_or_else(|| {
            Error::Auth(
                "GitHub token not found. Set GITHUB_TOKEN environment variable \
                 or add token to ~/.config/ghpulse/secrets.toml"
                    .to_string(),
            )
        })?;

        Self::new(&token, &config.github, config.retry.clone())
    }

    /// Retry policy in use
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Current quota of the REST and GraphQL APIs
    ///
    /// Querying `/rate_limit` does not count against the quota.
    pub async fn rate_limit(&self) -> Result<RateLimitStatus> {
        let response = self
            .execute(&ApiRequest::rest(["rate_limit"], Vec::new()))
            .await?;
        let body: RateLimitBody = response.json()?;

        Ok(RateLimitStatus {
            core: body.resources.core.into(),
            graphql: body
                .resources
                .graphql
                .map(Into::into)
                .unwrap_or_default(),
        })
    }

    /// Run a GraphQL query and return its `data`
    pub(crate) async fn execute_graphql<T: DeserializeOwned>(
        &self,
        query: &'static str,
        variables: serde_json::Value,
    ) -> Result<(T, RateLimitInfo)> {
        let response = self
            .execute(&ApiRequest::Graphql { query, variables })
            .await?;
        let body: GraphQlResponse<T> = response.json()?;
        Ok((body.into_data()?, response.rate_limit))
    }

    /// Send a request, applying the retry policy
    pub(crate) async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let mut ctx = RetryContext::default();

        loop {
            let (class, rate_limit, error) = match self.send(request).await {
                Ok((status, response)) if status.is_success() => {
                    let rate_limited = matches!(request, ApiRequest::Graphql { .. })
                        && graphql::is_rate_limited(&response.body);
                    if !rate_limited {
                        log_quota(request, &response.rate_limit);
                        return Ok(response);
                    }
                    (
                        ErrorClass::RateLimited,
                        response.rate_limit,
                        Error::GraphQl("rate limited".to_string()),
                    )
                }
                Ok((status, response)) => (
                    ErrorClass::classify(Some(status), &response.rate_limit, false),
                    response.rate_limit,
                    Error::Status {
                        status: status.as_u16(),
                        message: error_message(&response.body),
                    },
                ),
                Err(e) => (
                    ErrorClass::classify(e.status(), &RateLimitInfo::default(), false),
                    RateLimitInfo::default(),
                    Error::Http(e),
                ),
            };

            let now_ms = Utc::now().timestamp_millis();
            let Some(delay) = ctx.next_delay(class, &rate_limit, now_ms, &self.retry) else {
                if class == ErrorClass::Transient {
                    warn!(
                        request = %request.describe(),
                        error = %error,
                        attempts = ctx.attempt + 1,
                        "Retries exhausted"
                    );
                }
                return Err(error);
            };

            match class {
                ErrorClass::RateLimited => warn!(
                    request = %request.describe(),
                    wait_secs = delay.as_secs(),
                    waits = ctx.rate_limit_waits,
                    "Rate limited, waiting for reset"
                ),
                _ => warn!(
                    request = %request.describe(),
                    error = %error,
                    attempt = ctx.attempt,
                    max_retries = self.retry.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure, backing off"
                ),
            }
            tokio::time::sleep(delay).await;
        }
    }

    /// One attempt, without retries
    async fn send(
        &self,
        request: &ApiRequest,
    ) -> std::result::Result<(StatusCode, ApiResponse), reqwest::Error> {
        let builder = match request {
            ApiRequest::Rest { path, query } => {
                let url = self.endpoint(path);
                self.http.request(Method::GET, url).query(query)
            }
            ApiRequest::Graphql { query, variables } => self
                .http
                .post(self.graphql_url.clone())
                .json(&serde_json::json!({ "query": query, "variables": variables })),
        };

        debug!(request = %request.describe(), "Sending request");
        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;
        let rate_limit = rate_limit_from_headers(&headers);

        debug!(
            request = %request.describe(),
            status = status.as_u16(),
            remaining = ?rate_limit.remaining,
            "Received response"
        );

        Ok((
            status,
            ApiResponse {
                headers,
                body,
                rate_limit,
            },
        ))
    }

    fn endpoint(&self, segments: &[String]) -> Url {
        let mut url = self.api_url.clone();
        // Checked in `new`
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("api_url", &self.api_url.as_str())
            .field("graphql_url", &self.graphql_url.as_str())
            .finish_non_exhaustive()
    }
}

fn log_quota(request: &ApiRequest, rate_limit: &RateLimitInfo) {
    if rate_limit.is_low() {
        warn!(
            request = %request.describe(),
            remaining = ?rate_limit.remaining,
            limit = ?rate_limit.limit,
            "API quota running low"
        );
    } else {
        debug!(remaining = ?rate_limit.remaining, "API quota");
    }
}

/// Read the `x-ratelimit-*` headers
pub(crate) fn rate_limit_from_headers(headers: &HeaderMap) -> RateLimitInfo {
    fn parse<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }

    RateLimitInfo {
        limit: parse(headers, "x-ratelimit-limit"),
        remaining: parse(headers, "x-ratelimit-remaining"),
        reset_at: parse(headers, "x-ratelimit-reset"),
    }
}

/// Best human-readable message of an error body
fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct Message {
        message: String,
    }

    match serde_json::from_str::<Message>(body) {
        Ok(m) => m.message,
        Err(_) => body.chars().take(200).collect(),
    }
}
