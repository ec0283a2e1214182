//! GitHub REST API client.
//!
//! # Module Structure
//!
//! - [`client`] - `GitHubClient`, the [`ForgeClient`](crate::platform::ForgeClient) implementation
//! - [`error`] - mapping of HTTP failures onto `PlatformError`
//! - [`types`] - wire types for search, activity and rate limit responses
//! - [`pagination`] - `Link` header parsing
//! - [`convert`] - wire type to engine type conversion
//!
//! ```ignore
//! use forgewatch::github::GitHubClient;
//! use forgewatch::platform::{ForgeClient, SearchRequest};
//!
//! let client = GitHubClient::new(Some(&token))?;
//! let page = client.search_repositories(&SearchRequest::new("topic:flipperzero", 1, 100)).await?;
//! ```

mod client;
mod convert;
mod error;
mod pagination;
mod types;

pub use client::{GITHUB_API_URL, GitHubClient};
pub use pagination::parse_link_header;
pub use types::{GitHubRateLimitResponse, GitHubRateLimits, RateLimitResource};
