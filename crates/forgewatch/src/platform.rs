//! Platform-facing types: the `ForgeClient` trait, errors and quota handling.
//!
//! # Example
//!
//! ```ignore
//! use forgewatch::platform::{ForgeClient, QuotaResource, RateLimitGate};
//!
//! async fn guarded<C: ForgeClient>(client: &C) {
//!     let gate = RateLimitGate::default();
//!     if gate.check(client, QuotaResource::Search).await.allows_progress() {
//!         // start a batch of search calls
//!     }
//! }
//! ```

mod errors;
mod rate_limit;
mod types;

pub use errors::{PlatformError, Result, short_error_message};
pub use rate_limit::{ApiRateLimiter, GateDecision, Pacer, RateLimitGate, rate_limits};
pub use types::{
    ForgeClient, LatestCommit, LatestIssue, LatestRelease, PaginationInfo, QuotaResource,
    QuotaSnapshot, RateLimitInfo, SearchPage, SearchRequest, SearchSort,
};
