use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{RepoId, RepoSummary};

use super::errors::Result;

/// Rate limit information for one API resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    /// Maximum requests allowed per period.
    pub limit: usize,
    /// Remaining requests in current period.
    pub remaining: usize,
    /// When the rate limit resets.
    pub reset_at: DateTime<Utc>,
}

/// Which quota bucket a batch of calls draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaResource {
    /// Repository detail endpoints (releases, commits, issues).
    Core,
    /// The search endpoint, which has its own much smaller budget.
    Search,
}

impl std::fmt::Display for QuotaResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Core => f.write_str("core"),
            Self::Search => f.write_str("search"),
        }
    }
}

/// Remaining budget for both resources, as reported by the quota endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    pub core: RateLimitInfo,
    pub search: RateLimitInfo,
}

impl QuotaSnapshot {
    pub fn get(&self, resource: QuotaResource) -> &RateLimitInfo {
        match resource {
            QuotaResource::Core => &self.core,
            QuotaResource::Search => &self.search,
        }
    }
}

/// Pagination information extracted from a response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaginationInfo {
    /// Total number of pages (from rel="last").
    pub total_pages: Option<u32>,
    /// Next page number (from rel="next").
    pub next_page: Option<u32>,
}

/// Sort field for repository search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchSort {
    Stars,
    Forks,
    Updated,
    /// Best match; the API default.
    BestMatch,
}

impl SearchSort {
    /// Query parameter value, `None` for the default ordering.
    pub fn as_param(self) -> Option<&'static str> {
        match self {
            Self::Stars => Some("stars"),
            Self::Forks => Some("forks"),
            Self::Updated => Some("updated"),
            Self::BestMatch => None,
        }
    }
}

/// One page request against the repository search endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    /// 1-indexed page number.
    pub page: u32,
    pub per_page: u32,
    pub sort: SearchSort,
    pub ascending: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, page: u32, per_page: u32) -> Self {
        Self {
            query: query.into(),
            page,
            per_page,
            sort: SearchSort::BestMatch,
            ascending: false,
        }
    }
}

/// One page of repository search results.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    /// Total matches for the query, including ones beyond the window.
    pub total_count: u64,
    /// The backend timed out and the result set may be partial.
    pub incomplete_results: bool,
    pub items: Vec<RepoSummary>,
    pub pagination: PaginationInfo,
}

/// Newest release of a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestRelease {
    pub tag: String,
    pub name: Option<String>,
    pub url: String,
    pub prerelease: bool,
    pub published_at: Option<DateTime<Utc>>,
}

/// Newest commit on the default branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestCommit {
    pub sha: String,
    pub message: String,
    pub url: String,
    pub author: Option<String>,
}

/// Most recently opened issue or pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestIssue {
    pub number: u64,
    pub title: String,
    pub url: String,
    pub is_pull_request: bool,
    pub author: Option<String>,
}

/// Operations the engine needs from a code host.
///
/// `GitHubClient` is the production implementation; tests supply
/// synthetic backends.
#[async_trait]
pub trait ForgeClient: Send + Sync {
    /// Fetch one page of repository search results.
    async fn search_repositories(&self, request: &SearchRequest) -> Result<SearchPage>;

    /// Current quota for the core and search resources.
    async fn get_rate_limits(&self) -> Result<QuotaSnapshot>;

    /// Newest release, `None` if the repository has none.
    async fn latest_release(&self, repo: &RepoId) -> Result<Option<LatestRelease>>;

    /// Newest commit, `None` for an empty repository.
    async fn latest_commit(&self, repo: &RepoId) -> Result<Option<LatestCommit>>;

    /// Most recently opened open issue or PR, `None` if there is none.
    async fn latest_issue(&self, repo: &RepoId) -> Result<Option<LatestIssue>>;
}
