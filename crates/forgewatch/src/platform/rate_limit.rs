use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio::time::Instant;

use super::types::{ForgeClient, QuotaResource, RateLimitInfo};

/// Type alias for the governor rate limiter.
type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Published quotas for the GitHub search endpoint.
pub mod rate_limits {
    /// Search requests per minute with a token.
    pub const SEARCH_AUTHENTICATED_PER_MINUTE: u32 = 30;
    /// Search requests per minute without a token.
    pub const SEARCH_ANONYMOUS_PER_MINUTE: u32 = 10;
}

/// A standalone API rate limiter using the governor crate.
///
/// The GitHub client holds one of these for the search endpoint so a run
/// never outpaces the per-minute search quota, independent of the fixed
/// delays the paginator inserts.
///
/// # Example
///
/// ```ignore
/// use forgewatch::platform::{ApiRateLimiter, rate_limits};
///
/// let limiter = ApiRateLimiter::per_minute(rate_limits::SEARCH_AUTHENTICATED_PER_MINUTE);
/// limiter.wait().await;
/// ```
#[derive(Clone)]
pub struct ApiRateLimiter {
    inner: Arc<GovernorRateLimiter>,
}

impl ApiRateLimiter {
    /// Create a new rate limiter with the specified requests per second.
    ///
    /// Zero is treated as one.
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self::from_quota(Quota::per_second(rps))
    }

    /// Create a rate limiter allowing `requests_per_minute` (zero is treated as one).
    pub fn per_minute(requests_per_minute: u32) -> Self {
        let rpm = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Self::from_quota(Quota::per_minute(rpm))
    }

    fn from_quota(quota: Quota) -> Self {
        Self {
            inner: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Wait until a request is allowed by the rate limiter.
    pub async fn wait(&self) {
        self.inner.until_ready().await;
    }
}

/// Enforces a fixed minimum spacing between consecutive calls.
///
/// Used between search pages and between outgoing messages to stay clear
/// of secondary abuse-detection throttling.
#[derive(Debug)]
pub struct Pacer {
    interval: StdDuration,
    last: Option<Instant>,
}

impl Pacer {
    pub fn new(interval: StdDuration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn interval(&self) -> StdDuration {
        self.interval
    }

    /// Sleep until `interval` has elapsed since the previous call.
    ///
    /// The first call never sleeps.
    pub async fn pace(&mut self) {
        if let Some(last) = self.last {
            let next = last + self.interval;
            if Instant::now() < next {
                tokio::time::sleep_until(next).await;
            }
        }
        self.last = Some(Instant::now());
    }
}

/// Extra time added after a reset before calls resume.
const RESET_SLACK: StdDuration = StdDuration::from_secs(1);

/// What the gate decided before a batch of calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Enough budget left; go ahead.
    Proceed,
    /// Budget was low but the reset was close; waited this long, then go ahead.
    Waited(StdDuration),
    /// Budget is low and the reset is too far away; stop this kind of work.
    Stop {
        remaining: usize,
        reset_at: DateTime<Utc>,
    },
}

impl GateDecision {
    pub fn allows_progress(&self) -> bool {
        !matches!(self, Self::Stop { .. })
    }
}

/// Cooperative quota check run before each batch of API calls.
///
/// It never blocks individual calls; it looks at the remaining budget and
/// either lets the batch start, sleeps until the window resets, or tells
/// the caller to wind down.
#[derive(Debug, Clone)]
pub struct RateLimitGate {
    /// Minimum remaining calls required to start a batch.
    pub threshold: usize,
    /// Longest sleep the gate will take waiting for a reset.
    pub max_wait: StdDuration,
}

impl Default for RateLimitGate {
    fn default() -> Self {
        Self {
            threshold: 10,
            max_wait: StdDuration::from_secs(90),
        }
    }
}

impl RateLimitGate {
    pub fn new(threshold: usize, max_wait: StdDuration) -> Self {
        Self {
            threshold,
            max_wait,
        }
    }

    /// Decide what to do given a quota reading, without sleeping.
    pub fn assess(&self, info: &RateLimitInfo, now: DateTime<Utc>) -> GateDecision {
        if info.remaining >= self.threshold {
            return GateDecision::Proceed;
        }

        let until_reset = (info.reset_at - now).to_std().unwrap_or_default() + RESET_SLACK;
        if until_reset <= self.max_wait {
            GateDecision::Waited(until_reset)
        } else {
            GateDecision::Stop {
                remaining: info.remaining,
                reset_at: info.reset_at,
            }
        }
    }

    /// Query the quota endpoint and apply [`assess`](Self::assess).
    ///
    /// A failed quota lookup is logged and treated as permission to proceed;
    /// real exhaustion will surface as rate-limit errors on the calls.
    pub async fn check<C>(&self, client: &C, resource: QuotaResource) -> GateDecision
    where
        C: ForgeClient + ?Sized,
    {
        let snapshot = match client.get_rate_limits().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(%resource, error = %e, "Could not read rate limit, proceeding");
                return GateDecision::Proceed;
            }
        };

        let info = snapshot.get(resource);
        let decision = self.assess(info, Utc::now());
        match &decision {
            GateDecision::Proceed => {
                tracing::debug!(%resource, remaining = info.remaining, "Rate limit ok");
            }
            GateDecision::Waited(wait) => {
                tracing::info!(
                    %resource,
                    remaining = info.remaining,
                    threshold = self.threshold,
                    wait_secs = wait.as_secs(),
                    "Rate limit low, waiting for reset"
                );
                tokio::time::sleep(*wait).await;
            }
            GateDecision::Stop {
                remaining,
                reset_at,
            } => {
                tracing::warn!(
                    %resource,
                    remaining,
                    threshold = self.threshold,
                    reset_at = %reset_at,
                    "Rate limit exhausted, stopping early"
                );
            }
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn info(remaining: usize, reset_in_secs: i64, now: DateTime<Utc>) -> RateLimitInfo {
        RateLimitInfo {
            limit: 30,
            remaining,
            reset_at: now + Duration::seconds(reset_in_secs),
        }
    }

    #[test]
    fn assess_proceeds_when_budget_is_above_threshold() {
        let gate = RateLimitGate::new(10, StdDuration::from_secs(60));
        let now = Utc::now();
        assert_eq!(gate.assess(&info(10, 3600, now), now), GateDecision::Proceed);
        assert_eq!(gate.assess(&info(500, 3600, now), now), GateDecision::Proceed);
    }

    #[test]
    fn assess_waits_for_a_near_reset() {
        let gate = RateLimitGate::new(10, StdDuration::from_secs(60));
        let now = Utc::now();
        let decision = gate.assess(&info(5, 30, now), now);
        assert_eq!(decision, GateDecision::Waited(StdDuration::from_secs(31)));
        assert!(decision.allows_progress());
    }

    #[test]
    fn assess_stops_when_reset_is_too_far() {
        let gate = RateLimitGate::new(10, StdDuration::from_secs(60));
        let now = Utc::now();
        let decision = gate.assess(&info(5, 3600, now), now);
        assert!(matches!(decision, GateDecision::Stop { remaining: 5, .. }));
        assert!(!decision.allows_progress());
    }

    #[test]
    fn assess_treats_past_reset_as_immediate() {
        let gate = RateLimitGate::new(10, StdDuration::from_secs(5));
        let now = Utc::now();
        assert_eq!(
            gate.assess(&info(0, -120, now), now),
            GateDecision::Waited(RESET_SLACK)
        );
    }

    #[test]
    fn api_rate_limiter_treats_zero_as_one() {
        let limiter = ApiRateLimiter::new(0);
        let _cloned = limiter.clone();
        let _per_minute = ApiRateLimiter::per_minute(0);
    }

    #[tokio::test]
    async fn api_rate_limiter_allows_first_request() {
        let limiter = ApiRateLimiter::per_minute(rate_limits::SEARCH_AUTHENTICATED_PER_MINUTE);
        let start = std::time::Instant::now();
        limiter.wait().await;
        assert!(start.elapsed() < StdDuration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn pacer_spaces_consecutive_calls() {
        let mut pacer = Pacer::new(StdDuration::from_millis(300));
        let start = Instant::now();
        pacer.pace().await;
        assert_eq!(start.elapsed(), StdDuration::ZERO);
        pacer.pace().await;
        pacer.pace().await;
        assert!(start.elapsed() >= StdDuration::from_millis(600));
    }
}
