//! Exhaustive repository search over a partitioned query space.
//!
//! [`Searcher::collect`] runs one base query to completion: it walks the
//! [`PartitionQueue`], drains every partition with the [`Paginator`] and
//! feeds all hits into a shared [`Frontier`].

pub mod paginator;
pub mod partition;

use chrono::NaiveDate;

use crate::ledger::Frontier;
use crate::platform::{
    ForgeClient, GateDecision, QuotaResource, RateLimitGate, short_error_message,
};

pub use paginator::{Drain, Paginator, PaginatorConfig, StopReason};
pub use partition::{
    Granularity, PartitionConfig, PartitionQueue, SearchPartition, Slice, SliceVerdict,
};

/// Counters for one base query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOutcome {
    /// Partitions drained (including ones that were then split).
    pub partitions: usize,
    /// Hits returned across all partitions, duplicates included.
    pub hits: usize,
    /// Repositories this query added to the frontier.
    pub new_in_frontier: usize,
    /// Partitions that ended in an error other than a query rejection.
    pub failed: usize,
    /// Partitions the backend refused as invalid or too complex.
    pub rejected: usize,
    /// Finest-grain partitions still over the window.
    pub overflowed: usize,
    /// The rate-limit gate ended the query early.
    pub halted: bool,
}

/// Runs base queries through partitioning and pagination.
#[derive(Debug)]
pub struct Searcher {
    partition: PartitionConfig,
    paginator: Paginator,
    gate: RateLimitGate,
}

impl Searcher {
    pub fn new(partition: PartitionConfig, paginator: PaginatorConfig, gate: RateLimitGate) -> Self {
        Self {
            partition,
            paginator: Paginator::new(paginator),
            gate,
        }
    }

    pub fn gate(&self) -> &RateLimitGate {
        &self.gate
    }

    /// Drain every partition of `base` into `frontier`.
    ///
    /// Errors stay local to the partition that hit them. A rate-limit error
    /// re-runs the gate before the next partition; if the gate says stop,
    /// the rest of this query is abandoned.
    pub async fn collect<C>(
        &mut self,
        client: &C,
        base: &str,
        today: NaiveDate,
        frontier: &mut Frontier,
    ) -> QueryOutcome
    where
        C: ForgeClient + ?Sized,
    {
        let mut queue = PartitionQueue::new(base, self.partition.clone(), today);
        let mut outcome = QueryOutcome::default();

        while let Some(partition) = queue.next() {
            let query = partition.query();
            let drain = self
                .paginator
                .drain(client, &query, |total| {
                    queue.assess(&partition, total) != SliceVerdict::Split
                })
                .await;

            outcome.partitions += 1;
            outcome.hits += drain.items.len();
            outcome.new_in_frontier += frontier.extend(drain.items);

            match drain.stop {
                StopReason::Split => {
                    let children = queue.split(&partition);
                    tracing::debug!(
                        query = %query,
                        total = drain.total_count.unwrap_or_default(),
                        children,
                        "Partition over threshold, splitting"
                    );
                }
                StopReason::Failed => {
                    let Some(error) = drain.error else { continue };
                    if error.is_query_rejected() {
                        outcome.rejected += 1;
                        tracing::warn!(
                            query = %query,
                            error = %short_error_message(&error),
                            "Query rejected, skipping"
                        );
                    } else {
                        outcome.failed += 1;
                        if error.is_rate_limited()
                            && let GateDecision::Stop { .. } =
                                self.gate.check(client, QuotaResource::Search).await
                        {
                            outcome.halted = true;
                            break;
                        }
                    }
                }
                _ => {
                    if let Some(total) = drain.total_count
                        && queue.assess(&partition, total) == SliceVerdict::Overflow
                    {
                        outcome.overflowed += 1;
                        tracing::warn!(
                            query = %query,
                            total,
                            "Partition cannot be split further, results beyond the window are lost"
                        );
                    }
                }
            }
        }

        if outcome.halted {
            tracing::warn!(
                base,
                skipped = queue.remaining(),
                "Search quota exhausted, remaining partitions skipped"
            );
        }
        tracing::debug!(
            base,
            partitions = outcome.partitions,
            hits = outcome.hits,
            new = outcome.new_in_frontier,
            "Base query complete"
        );
        outcome
    }
}
