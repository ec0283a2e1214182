//! Progress reporting for poller runs.
//!
//! The pipeline emits [`RunProgress`] events through an optional callback;
//! the CLI turns them into log lines.

use crate::notify::DeliveryReport;
use crate::platform::QuotaResource;
use crate::search::QueryOutcome;

use super::RunSummary;

/// Progress events emitted during a run.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum RunProgress {
    /// Discovery is about to start.
    Started {
        /// Base queries planned (follow-ups not included).
        queries: usize,
        dry_run: bool,
    },

    /// Starting one base query.
    QueryStarted {
        /// 1-indexed position among all queries run so far.
        index: usize,
        total: usize,
        query: String,
    },

    /// Finished one base query.
    QueryFinished {
        query: String,
        outcome: QueryOutcome,
        /// Frontier size after this query.
        frontier: usize,
    },

    /// Topic co-occurrence produced extra queries.
    FollowUpsPlanned { count: usize },

    /// Search results merged into the ledger.
    DiscoveryComplete {
        /// Distinct repositories found this run.
        found: usize,
        /// Repositories not in the ledger before.
        new: usize,
    },

    /// One activity scan batch finished.
    ScanBatch {
        scanned: usize,
        total: usize,
        events: usize,
    },

    /// Notifications handed to the messenger.
    NotifyComplete { report: DeliveryReport },

    /// The rate-limit gate stopped a phase.
    RateLimitStop { resource: QuotaResource },

    /// Ctrl+C was seen between batches.
    Interrupted,

    /// Ledger written to disk.
    Checkpoint { known: usize, delivered: usize },

    /// The run is over.
    Finished { summary: RunSummary },
}

/// Callback type for progress reporting.
pub type ProgressCallback = Box<dyn Fn(RunProgress) + Send + Sync>;

/// Emit a progress event if a callback is provided.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: RunProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}
