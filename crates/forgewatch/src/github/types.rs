//! GitHub API wire types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Envelope returned by `GET /search/repositories`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    pub total_count: u64,
    #[serde(default)]
    pub incomplete_results: bool,
    #[serde(default)]
    pub items: Vec<WireRepository>,
}

/// The subset of a repository object the engine keeps.
#[derive(Debug, Clone, Deserialize)]
pub struct WireRepository {
    pub full_name: String,
    pub description: Option<String>,
    pub html_url: String,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub forks_count: u64,
    pub language: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    /// Size in KB.
    #[serde(default)]
    pub size: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub pushed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireRelease {
    pub tag_name: String,
    pub name: Option<String>,
    pub html_url: String,
    #[serde(default)]
    pub prerelease: bool,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireUser {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireCommitAuthor {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireCommitDetail {
    pub message: String,
    pub author: Option<WireCommitAuthor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireCommit {
    pub sha: String,
    pub html_url: String,
    pub commit: WireCommitDetail,
    pub author: Option<WireUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireIssue {
    pub number: u64,
    pub title: String,
    pub html_url: String,
    /// Present only when the issue is a pull request.
    pub pull_request: Option<serde_json::Value>,
    pub user: Option<WireUser>,
}

/// A single rate limit resource entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitResource {
    /// Maximum requests allowed per period.
    pub limit: usize,
    /// Requests used in current period.
    #[serde(default)]
    pub used: usize,
    /// Remaining requests in current period.
    pub remaining: usize,
    /// Unix timestamp when the rate limit resets.
    pub reset: u64,
}

impl RateLimitResource {
    /// Get the reset time as a DateTime.
    pub fn reset_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.reset as i64, 0).unwrap_or_else(Utc::now)
    }
}

/// Rate limit resources from GitHub's API that matter to the poller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubRateLimits {
    /// Core API rate limit (non-search REST endpoints).
    pub core: RateLimitResource,
    /// Search API rate limit.
    pub search: RateLimitResource,
    /// GraphQL API rate limit.
    #[serde(default)]
    pub graphql: Option<RateLimitResource>,
}

/// Full rate limit response from GitHub's API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubRateLimitResponse {
    /// All rate limit resources.
    pub resources: GitHubRateLimits,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_resource_reset_at() {
        let resource = RateLimitResource {
            limit: 30,
            used: 2,
            remaining: 28,
            reset: 2000000000,
        };
        assert_eq!(resource.reset_at().timestamp(), 2000000000);
    }

    #[test]
    fn test_rate_limit_response_parses_with_extra_resources() {
        let json = r#"{
            "resources": {
                "core": {"limit": 5000, "used": 10, "remaining": 4990, "reset": 1700000000},
                "search": {"limit": 30, "used": 1, "remaining": 29, "reset": 1700000060},
                "graphql": {"limit": 5000, "used": 0, "remaining": 5000, "reset": 1700000000},
                "scim": {"limit": 15000, "used": 0, "remaining": 15000, "reset": 1700000000}
            },
            "rate": {"limit": 5000, "used": 10, "remaining": 4990, "reset": 1700000000}
        }"#;
        let parsed: GitHubRateLimitResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.resources.core.remaining, 4990);
        assert_eq!(parsed.resources.search.limit, 30);
        assert!(parsed.resources.graphql.is_some());
    }

    #[test]
    fn test_search_response_tolerates_missing_optional_fields() {
        let json = r#"{
            "total_count": 1,
            "items": [{"full_name": "a/b", "description": null, "html_url": "https://github.com/a/b", "language": null}]
        }"#;
        let parsed: SearchResponse = serde_json::from_str(json).unwrap();
        assert!(!parsed.incomplete_results);
        assert_eq!(parsed.items[0].stargazers_count, 0);
        assert!(parsed.items[0].topics.is_empty());
    }

    #[test]
    fn test_issue_pull_request_marker() {
        let json = r#"[{"number": 7, "title": "Add NFC", "html_url": "https://github.com/a/b/pull/7",
            "pull_request": {"url": "https://api.github.com/repos/a/b/pulls/7"}, "user": {"login": "dev"}}]"#;
        let parsed: Vec<WireIssue> = serde_json::from_str(json).unwrap();
        assert!(parsed[0].pull_request.is_some());
        assert_eq!(parsed[0].user.as_ref().unwrap().login, "dev");
    }
}
