//! Draining one sub-query page by page.

use std::time::Duration as StdDuration;

use serde::{Deserialize, Serialize};

use crate::model::RepoSummary;
use crate::platform::{ForgeClient, Pacer, PlatformError, SearchRequest};

/// Why a drain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A page came back with no items.
    Empty,
    /// A page held fewer items than requested.
    ShortPage,
    /// The response carried no `rel="next"` link.
    NoContinuation,
    /// The configured page limit was reached.
    MaxPages,
    /// The next page would start past the result window.
    WindowCap,
    /// The probe rejected the query's total; it must be split.
    Split,
    /// A request failed; see [`Drain::error`].
    Failed,
}

/// Result of draining one query.
#[derive(Debug)]
pub struct Drain {
    /// Every item fetched, in page order. May contain duplicates if results
    /// shifted between pages.
    pub items: Vec<RepoSummary>,
    /// `total_count` reported on page 1, if page 1 succeeded.
    pub total_count: Option<u64>,
    /// Pages successfully fetched.
    pub pages: u32,
    pub stop: StopReason,
    pub error: Option<PlatformError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginatorConfig {
    pub page_size: u32,
    pub max_pages: u32,
    /// Highest result index the backend serves for one query.
    pub window_cap: u64,
    /// Minimum spacing between consecutive page requests.
    #[serde(with = "millis")]
    pub page_delay: StdDuration,
}

impl Default for PaginatorConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_pages: 10,
            window_cap: 1000,
            page_delay: StdDuration::from_millis(300),
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Pages through search results with a fixed delay between requests.
///
/// The delay is kept across drains, so consecutive sub-queries are spaced
/// as well.
#[derive(Debug)]
pub struct Paginator {
    config: PaginatorConfig,
    pacer: Pacer,
}

impl Paginator {
    pub fn new(config: PaginatorConfig) -> Self {
        let pacer = Pacer::new(config.page_delay);
        Self { config, pacer }
    }

    pub fn config(&self) -> &PaginatorConfig {
        &self.config
    }

    /// Fetch every reachable page of `query`.
    ///
    /// `probe` sees page 1's `total_count`; returning `false` stops the drain
    /// after page 1 with [`StopReason::Split`]. Page 1's items are kept
    /// either way.
    pub async fn drain<C, P>(&mut self, client: &C, query: &str, mut probe: P) -> Drain
    where
        C: ForgeClient + ?Sized,
        P: FnMut(u64) -> bool,
    {
        let page_size = self.config.page_size.max(1);
        let mut drain = Drain {
            items: Vec::new(),
            total_count: None,
            pages: 0,
            stop: StopReason::NoContinuation,
            error: None,
        };
        let mut page = 1u32;

        loop {
            self.pacer.pace().await;
            let request = SearchRequest::new(query, page, page_size);
            let result = match client.search_repositories(&request).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(query, page, error = %e, "Search page failed");
                    drain.stop = StopReason::Failed;
                    drain.error = Some(e);
                    return drain;
                }
            };

            if result.incomplete_results {
                tracing::debug!(query, page, "Backend reported incomplete results");
            }

            let count = result.items.len();
            drain.pages += 1;
            drain.items.extend(result.items);

            if page == 1 {
                drain.total_count = Some(result.total_count);
                if !probe(result.total_count) {
                    drain.stop = StopReason::Split;
                    return drain;
                }
            }

            tracing::trace!(query, page, count, "Fetched search page");

            if count == 0 {
                drain.stop = StopReason::Empty;
                return drain;
            }
            if count < page_size as usize {
                drain.stop = StopReason::ShortPage;
                return drain;
            }
            if drain.pages >= self.config.max_pages {
                drain.stop = StopReason::MaxPages;
                return drain;
            }
            let Some(next) = result.pagination.next_page.filter(|n| *n > page) else {
                drain.stop = StopReason::NoContinuation;
                return drain;
            };
            if u64::from(next - 1) * u64::from(page_size) >= self.config.window_cap {
                drain.stop = StopReason::WindowCap;
                return drain;
            }
            page = next;
        }
    }
}
