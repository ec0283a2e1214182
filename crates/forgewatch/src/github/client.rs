//! GitHub REST client built on the [`HttpTransport`] seam.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use url::Url;

use super::convert::{to_latest_commit, to_latest_issue, to_latest_release, to_repo_summary};
use super::error::{error_from_response, from_http_error};
use super::pagination::parse_link_header;
use super::types::{
    GitHubRateLimitResponse, RateLimitResource, SearchResponse, WireCommit, WireIssue,
    WireRelease,
};
use crate::http::reqwest_transport::ReqwestTransport;
use crate::http::{DEFAULT_REQUEST_TIMEOUT, HttpRequest, HttpResponse, HttpTransport};
use crate::model::RepoId;
use crate::platform::{
    self, ApiRateLimiter, ForgeClient, LatestCommit, LatestIssue, LatestRelease, PlatformError,
    QuotaSnapshot, RateLimitInfo, SearchPage, SearchRequest, rate_limits,
};

/// Public API root.
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// REST API version header value.
const API_VERSION: &str = "2022-11-28";

/// GitHub API client implementing [`ForgeClient`].
///
/// A token is optional: anonymous clients work but get a much smaller
/// search and core budget.
#[derive(Clone)]
pub struct GitHubClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    token: Option<Arc<String>>,
    /// Optional limiter applied to search requests only.
    search_limiter: Option<ApiRateLimiter>,
}

impl GitHubClient {
    /// Create a client backed by reqwest, with a search limiter sized for
    /// the token's presence.
    pub fn new(token: Option<&str>) -> platform::Result<Self> {
        let transport = ReqwestTransport::with_timeout(DEFAULT_REQUEST_TIMEOUT)
            .map_err(|e| PlatformError::internal(e.to_string()))?;
        let per_minute = if token.is_some() {
            rate_limits::SEARCH_AUTHENTICATED_PER_MINUTE
        } else {
            rate_limits::SEARCH_ANONYMOUS_PER_MINUTE
        };
        Ok(Self::with_transport(Arc::new(transport), token)
            .with_search_limiter(Some(ApiRateLimiter::per_minute(per_minute))))
    }

    /// Create a client over an arbitrary transport, without a limiter.
    pub fn with_transport(transport: Arc<dyn HttpTransport>, token: Option<&str>) -> Self {
        Self {
            transport,
            base_url: GITHUB_API_URL.to_string(),
            token: token
                .filter(|t| !t.trim().is_empty())
                .map(|t| Arc::new(t.to_string())),
            search_limiter: None,
        }
    }

    /// Point the client at a different API root (GitHub Enterprise, tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_search_limiter(mut self, limiter: Option<ApiRateLimiter>) -> Self {
        self.search_limiter = limiter;
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Full URL for one search page.
    pub fn search_url(&self, request: &SearchRequest) -> String {
        let mut params: Vec<(&str, String)> = vec![("q", request.query.clone())];
        if let Some(sort) = request.sort.as_param() {
            params.push(("sort", sort.to_string()));
            let order = if request.ascending { "asc" } else { "desc" };
            params.push(("order", order.to_string()));
        }
        params.push(("per_page", request.per_page.to_string()));
        params.push(("page", request.page.to_string()));
        self.url_with_params("/search/repositories", &params)
    }

    fn releases_url(&self, repo: &RepoId) -> String {
        self.url_with_params(
            &format!("/repos/{}/releases", repo),
            &[("per_page", "1".to_string())],
        )
    }

    fn commits_url(&self, repo: &RepoId) -> String {
        self.url_with_params(
            &format!("/repos/{}/commits", repo),
            &[("per_page", "1".to_string())],
        )
    }

    fn issues_url(&self, repo: &RepoId) -> String {
        self.url_with_params(
            &format!("/repos/{}/issues", repo),
            &[
                ("state", "open".to_string()),
                ("sort", "created".to_string()),
                ("direction", "desc".to_string()),
                ("per_page", "1".to_string()),
            ],
        )
    }

    fn rate_limit_url(&self) -> String {
        format!("{}/rate_limit", self.base_url)
    }

    fn url_with_params(&self, path: &str, params: &[(&str, String)]) -> String {
        let base = format!("{}{}", self.base_url, path);
        match Url::parse_with_params(&base, params) {
            Ok(url) => url.to_string(),
            Err(_) => base,
        }
    }

    fn request(&self, url: String) -> HttpRequest {
        let mut request = HttpRequest::get(url)
            .with_header("Accept", "application/vnd.github+json")
            .with_header("X-GitHub-Api-Version", API_VERSION)
            .with_header("User-Agent", "forgewatch");
        if let Some(token) = &self.token {
            request = request.with_header("Authorization", format!("Bearer {}", token.as_str()));
        }
        request
    }

    /// Send a GET and turn any non-2xx into a [`PlatformError`].
    async fn get(&self, url: String, resource: &str) -> platform::Result<HttpResponse> {
        let response = self
            .transport
            .send(self.request(url))
            .await
            .map_err(from_http_error)?;
        if !response.is_success() {
            return Err(error_from_response(&response, resource));
        }
        Ok(response)
    }

    fn decode<T: DeserializeOwned>(response: &HttpResponse) -> platform::Result<T> {
        serde_json::from_slice(&response.body)
            .map_err(|e| PlatformError::decode(format!("JSON parse error: {}", e)))
    }

    /// Fetch the newest element of a newest-first list endpoint.
    ///
    /// Statuses in `empty_statuses` mean "nothing there" rather than failure
    /// (409 for an empty git repository, 410 for disabled issues).
    async fn newest<T: DeserializeOwned>(
        &self,
        url: String,
        resource: &str,
        empty_statuses: &[u16],
    ) -> platform::Result<Option<T>> {
        match self.get(url, resource).await {
            Ok(response) => {
                let mut items: Vec<T> = Self::decode(&response)?;
                Ok(if items.is_empty() {
                    None
                } else {
                    Some(items.swap_remove(0))
                })
            }
            Err(PlatformError::Api { status, .. }) if empty_statuses.contains(&status) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Full rate limit document, including resources the gate ignores.
    pub async fn get_rate_limit_response(&self) -> platform::Result<GitHubRateLimitResponse> {
        let response = self.get(self.rate_limit_url(), "rate_limit").await?;
        Self::decode(&response)
    }
}

fn to_rate_limit_info(resource: &RateLimitResource) -> RateLimitInfo {
    RateLimitInfo {
        limit: resource.limit,
        remaining: resource.remaining,
        reset_at: resource.reset_at(),
    }
}

#[async_trait]
impl ForgeClient for GitHubClient {
    async fn search_repositories(&self, request: &SearchRequest) -> platform::Result<SearchPage> {
        if let Some(limiter) = &self.search_limiter {
            limiter.wait().await;
        }

        let response = self.get(self.search_url(request), "search").await?;
        let pagination = response
            .header("link")
            .map(parse_link_header)
            .unwrap_or_default();
        let body: SearchResponse = Self::decode(&response)?;

        let mut items = Vec::with_capacity(body.items.len());
        for wire in body.items {
            let full_name = wire.full_name.clone();
            match to_repo_summary(wire) {
                Some(summary) => items.push(summary),
                None => tracing::warn!(full_name = %full_name, "Skipping malformed search hit"),
            }
        }

        Ok(SearchPage {
            total_count: body.total_count,
            incomplete_results: body.incomplete_results,
            items,
            pagination,
        })
    }

    async fn get_rate_limits(&self) -> platform::Result<QuotaSnapshot> {
        let response = self.get_rate_limit_response().await?;
        Ok(QuotaSnapshot {
            core: to_rate_limit_info(&response.resources.core),
            search: to_rate_limit_info(&response.resources.search),
        })
    }

    async fn latest_release(&self, repo: &RepoId) -> platform::Result<Option<LatestRelease>> {
        let release: Option<WireRelease> = self
            .newest(self.releases_url(repo), &format!("{} releases", repo), &[])
            .await?;
        Ok(release.map(to_latest_release))
    }

    async fn latest_commit(&self, repo: &RepoId) -> platform::Result<Option<LatestCommit>> {
        let commit: Option<WireCommit> = self
            .newest(self.commits_url(repo), &format!("{} commits", repo), &[409])
            .await?;
        Ok(commit.map(to_latest_commit))
    }

    async fn latest_issue(&self, repo: &RepoId) -> platform::Result<Option<LatestIssue>> {
        let issue: Option<WireIssue> = self
            .newest(self.issues_url(repo), &format!("{} issues", repo), &[410])
            .await?;
        Ok(issue.map(to_latest_issue))
    }
}
