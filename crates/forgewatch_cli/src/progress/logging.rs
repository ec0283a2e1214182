use forgewatch::pipeline::RunProgress;

/// Logging reporter using tracing for structured output.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, event: RunProgress) {
        match event {
            RunProgress::Started { queries, dry_run } => {
                tracing::info!(queries, dry_run, "Starting discovery");
            }

            RunProgress::QueryStarted {
                index,
                total,
                query,
            } => {
                tracing::info!(index, total, query = %query, "Running query");
            }

            RunProgress::QueryFinished {
                query,
                outcome,
                frontier,
            } => {
                tracing::debug!(
                    query = %query,
                    partitions = outcome.partitions,
                    hits = outcome.hits,
                    new = outcome.new_in_frontier,
                    frontier,
                    "Query finished"
                );
                if outcome.failed > 0 || outcome.rejected > 0 || outcome.overflowed > 0 {
                    tracing::warn!(
                        query = %query,
                        failed = outcome.failed,
                        rejected = outcome.rejected,
                        overflowed = outcome.overflowed,
                        "Query finished with gaps"
                    );
                }
            }

            RunProgress::FollowUpsPlanned { count } => {
                tracing::info!(count, "Follow-up queries planned");
            }

            RunProgress::DiscoveryComplete { found, new } => {
                tracing::info!(found, new, "Discovery complete");
            }

            RunProgress::ScanBatch {
                scanned,
                total,
                events,
            } => {
                tracing::info!(scanned, total, events, "Scanned batch");
            }

            RunProgress::NotifyComplete { report } => {
                tracing::info!(
                    sent = report.sent,
                    failed = report.failed,
                    duplicates = report.duplicates,
                    deferred = report.deferred,
                    "Notifications delivered"
                );
            }

            RunProgress::RateLimitStop { resource } => {
                tracing::warn!(resource = %resource, "Rate limit reached, stopping early");
            }

            RunProgress::Interrupted => {
                tracing::warn!("Interrupted, saving state");
            }

            RunProgress::Checkpoint { known, delivered } => {
                tracing::debug!(known, delivered, "State saved");
            }

            RunProgress::Finished { summary } => {
                if summary.cut_short() {
                    tracing::warn!(
                        rate_limited = summary.rate_limited,
                        interrupted = summary.interrupted,
                        "Run ended early, the next run continues from saved state"
                    );
                }
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
