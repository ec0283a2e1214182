//! One poller run: discovery, ledger merge, activity scan, notification.
//!
//! The ledger goes in by value and comes back in the [`RunReport`]. With a
//! [`StateStore`] attached it is also written after discovery, after each
//! scan batch, after notification and on every early exit.

mod progress;

use std::collections::HashSet;
use std::ops::ControlFlow;

use chrono::{NaiveDate, Utc};
use thiserror::Error;

use crate::activity::{ScanOptions, Scanner};
use crate::ledger::{EventId, Frontier, Ledger};
use crate::notify::{Messenger, Notification, Notifier, NotifyOptions};
use crate::platform::{ForgeClient, GateDecision, QuotaResource, RateLimitGate};
use crate::search::{PaginatorConfig, PartitionConfig, Searcher};
use crate::state::{StateError, StateStore};
use crate::taxonomy::{Taxonomy, TopicStats};

pub use progress::{ProgressCallback, RunProgress, emit};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    State(#[from] StateError),
}

/// Everything that shapes a run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub taxonomy: Taxonomy,
    /// Most generated base queries run per invocation.
    pub max_queries: usize,
    /// Run the "created since yesterday" query first.
    pub watch_recent: bool,
    /// Topic pairs must co-occur this often to become a follow-up query.
    pub follow_up_min_count: usize,
    /// Most follow-up queries per run; zero disables them.
    pub follow_up_limit: usize,
    pub partition: PartitionConfig,
    pub paginator: PaginatorConfig,
    pub gate: RateLimitGate,
    /// Skip the activity scan entirely.
    pub scan_activity: bool,
    pub scan: ScanOptions,
    pub notify: NotifyOptions,
    /// Never write state.
    pub dry_run: bool,
    /// Date treated as today; the current UTC date if unset.
    pub today: Option<NaiveDate>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            taxonomy: Taxonomy::default(),
            max_queries: 50,
            watch_recent: true,
            follow_up_min_count: 3,
            follow_up_limit: 20,
            partition: PartitionConfig::default(),
            paginator: PaginatorConfig::default(),
            gate: RateLimitGate::default(),
            scan_activity: true,
            scan: ScanOptions::default(),
            notify: NotifyOptions::default(),
            dry_run: false,
            today: None,
        }
    }
}

impl RunOptions {
    pub fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }

    /// Base queries in run order: the recent-creation watch, then the
    /// generated taxonomy queries up to `max_queries`.
    pub fn base_queries(&self) -> Vec<String> {
        let mut queries = Vec::new();
        if self.watch_recent
            && let Some(recent) = self.taxonomy.recent_query(self.today())
        {
            queries.push(recent);
        }
        queries.extend(self.taxonomy.queries().into_iter().take(self.max_queries));
        queries
    }
}

/// Counters for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub queries_run: usize,
    pub follow_up_queries: usize,
    pub partitions: usize,
    pub subqueries_failed: usize,
    pub subqueries_rejected: usize,
    pub partitions_overflowed: usize,
    /// Distinct repositories found this run.
    pub repositories_found: usize,
    /// Repositories added to the ledger this run.
    pub repositories_new: usize,
    pub repositories_scanned: usize,
    pub scan_failures: usize,
    pub activity_baselined: usize,
    pub events_detected: usize,
    pub notifications_sent: usize,
    pub notifications_failed: usize,
    pub notifications_deferred: usize,
    pub duplicates_skipped: usize,
    /// The rate-limit gate cut the run short.
    pub rate_limited: bool,
    /// Ctrl+C cut the run short.
    pub interrupted: bool,
}

impl RunSummary {
    pub fn cut_short(&self) -> bool {
        self.rate_limited || self.interrupted
    }
}

/// Ledger after the run plus what happened.
#[derive(Debug)]
pub struct RunReport {
    pub ledger: Ledger,
    pub summary: RunSummary,
}

/// Polled between batches of work.
pub type StopCheck = dyn Fn() -> bool + Send + Sync;

/// Wires a client, a messenger and optional state persistence into a run.
pub struct Pipeline<'a, C: ?Sized, M: ?Sized> {
    client: &'a C,
    messenger: &'a M,
    options: RunOptions,
    store: Option<&'a StateStore>,
    on_progress: Option<&'a ProgressCallback>,
    stop_requested: Option<&'a StopCheck>,
}

impl<'a, C, M> Pipeline<'a, C, M>
where
    C: ForgeClient + ?Sized,
    M: Messenger + ?Sized,
{
    pub fn new(client: &'a C, messenger: &'a M, options: RunOptions) -> Self {
        Self {
            client,
            messenger,
            options,
            store: None,
            on_progress: None,
            stop_requested: None,
        }
    }

    /// Persist the ledger to `store` at every checkpoint (ignored on dry runs).
    #[must_use]
    pub fn with_store(mut self, store: &'a StateStore) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn with_progress(mut self, on_progress: &'a ProgressCallback) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    /// Polled between batches; returning `true` ends the run early.
    #[must_use]
    pub fn with_stop_check(mut self, stop_requested: &'a StopCheck) -> Self {
        self.stop_requested = Some(stop_requested);
        self
    }

    fn should_stop(&self) -> bool {
        self.stop_requested.is_some_and(|f| f())
    }

    fn checkpoint(&self, ledger: &Ledger) -> Result<(), StateError> {
        if self.options.dry_run {
            return Ok(());
        }
        let Some(store) = self.store else {
            return Ok(());
        };
        store.save(ledger)?;
        emit(
            self.on_progress,
            RunProgress::Checkpoint {
                known: ledger.known().len(),
                delivered: ledger.delivered().len(),
            },
        );
        Ok(())
    }

    /// Execute one run.
    pub async fn run(self, mut ledger: Ledger) -> Result<RunReport, PipelineError> {
        let mut summary = RunSummary::default();
        let today = self.options.today();
        let base_queries = self.options.base_queries();

        emit(
            self.on_progress,
            RunProgress::Started {
                queries: base_queries.len(),
                dry_run: self.options.dry_run,
            },
        );
        tracing::info!(
            queries = base_queries.len(),
            dry_run = self.options.dry_run,
            "Starting run"
        );

        // Discovery.
        let mut searcher = Searcher::new(
            self.options.partition.clone(),
            self.options.paginator.clone(),
            self.options.gate.clone(),
        );
        let mut frontier = Frontier::new();
        let mut executed: HashSet<String> = HashSet::new();

        self.discover(
            &mut searcher,
            &base_queries,
            today,
            &mut frontier,
            &mut executed,
            &mut summary,
        )
        .await;

        if !summary.cut_short() && self.options.follow_up_limit > 0 {
            let stats = TopicStats::from_repositories(frontier.iter());
            let follow_ups = stats.follow_up_queries(
                self.options.follow_up_min_count,
                self.options.follow_up_limit,
                &executed,
            );
            if !follow_ups.is_empty() {
                tracing::info!(
                    count = follow_ups.len(),
                    topics = stats.distinct_topics(),
                    "Running topic co-occurrence follow-up queries"
                );
                emit(
                    self.on_progress,
                    RunProgress::FollowUpsPlanned {
                        count: follow_ups.len(),
                    },
                );
                summary.follow_up_queries = follow_ups.len();
                self.discover(
                    &mut searcher,
                    &follow_ups,
                    today,
                    &mut frontier,
                    &mut executed,
                    &mut summary,
                )
                .await;
            }
        }

        let new_ids = ledger.merge(frontier.ids().cloned());
        summary.repositories_found = frontier.len();
        summary.repositories_new = new_ids.len();
        for id in &new_ids {
            tracing::debug!(repo = %id, "New repository");
        }
        emit(
            self.on_progress,
            RunProgress::DiscoveryComplete {
                found: frontier.len(),
                new: new_ids.len(),
            },
        );
        if summary.interrupted {
            return self.finish(ledger, summary);
        }
        self.checkpoint(&ledger)?;

        // Activity.
        let mut events = Vec::new();
        if self.options.scan_activity {
            let scanner = Scanner::new(self.options.scan.clone(), self.options.gate.clone());
            let total = scanner.select(&ledger).len();
            let mut save_error: Option<StateError> = None;
            let mut interrupted = false;

            let report = scanner
                .scan(self.client, &mut ledger, |ledger, so_far| {
                    emit(
                        self.on_progress,
                        RunProgress::ScanBatch {
                            scanned: so_far.scanned,
                            total,
                            events: so_far.events.len(),
                        },
                    );
                    if let Err(e) = self.checkpoint(ledger) {
                        save_error = Some(e);
                        return ControlFlow::Break(());
                    }
                    if self.should_stop() {
                        interrupted = true;
                        return ControlFlow::Break(());
                    }
                    ControlFlow::Continue(())
                })
                .await;

            if let Some(e) = save_error {
                return Err(e.into());
            }
            summary.repositories_scanned = report.scanned;
            summary.scan_failures = report.failures;
            summary.activity_baselined = report.baselined;
            summary.events_detected = report.events.len();
            summary.duplicates_skipped += report.duplicates;
            if interrupted {
                summary.interrupted = true;
                emit(self.on_progress, RunProgress::Interrupted);
            } else if report.halted {
                summary.rate_limited = true;
                emit(
                    self.on_progress,
                    RunProgress::RateLimitStop {
                        resource: QuotaResource::Core,
                    },
                );
            }
            events = report.events;
            self.checkpoint(&ledger)?;
        }

        if summary.interrupted {
            return self.finish(ledger, summary);
        }

        // Notification. New repositories come first, in discovery order;
        // ones deferred by an earlier run come back while still undelivered.
        let mut items: Vec<Notification> = frontier
            .into_vec()
            .into_iter()
            .filter(|repo| !ledger.is_delivered(&EventId::repository(repo.id.clone())))
            .map(Notification::NewRepository)
            .collect();
        items.extend(events.into_iter().map(Notification::Activity));

        let mut notifier = Notifier::new(self.options.notify.clone());
        let delivery = notifier.deliver(self.messenger, items, &mut ledger).await;
        summary.notifications_sent = delivery.sent;
        summary.notifications_failed = delivery.failed;
        summary.notifications_deferred = delivery.deferred;
        summary.duplicates_skipped += delivery.duplicates;
        emit(
            self.on_progress,
            RunProgress::NotifyComplete { report: delivery },
        );

        self.finish(ledger, summary)
    }

    /// Run `queries` through the searcher, stopping on Ctrl+C or when the
    /// search gate says the quota is gone.
    async fn discover(
        &self,
        searcher: &mut Searcher,
        queries: &[String],
        today: NaiveDate,
        frontier: &mut Frontier,
        executed: &mut HashSet<String>,
        summary: &mut RunSummary,
    ) {
        let total = queries.len();
        for (i, query) in queries.iter().enumerate() {
            if self.should_stop() {
                summary.interrupted = true;
                emit(self.on_progress, RunProgress::Interrupted);
                return;
            }
            if let GateDecision::Stop { .. } = searcher
                .gate()
                .check(self.client, QuotaResource::Search)
                .await
            {
                summary.rate_limited = true;
                emit(
                    self.on_progress,
                    RunProgress::RateLimitStop {
                        resource: QuotaResource::Search,
                    },
                );
                return;
            }

            emit(
                self.on_progress,
                RunProgress::QueryStarted {
                    index: i + 1,
                    total,
                    query: query.clone(),
                },
            );
            executed.insert(query.clone());
            let outcome = searcher.collect(self.client, query, today, frontier).await;

            summary.queries_run += 1;
            summary.partitions += outcome.partitions;
            summary.subqueries_failed += outcome.failed;
            summary.subqueries_rejected += outcome.rejected;
            summary.partitions_overflowed += outcome.overflowed;
            let halted = outcome.halted;
            emit(
                self.on_progress,
                RunProgress::QueryFinished {
                    query: query.clone(),
                    outcome,
                    frontier: frontier.len(),
                },
            );
            if halted {
                summary.rate_limited = true;
                emit(
                    self.on_progress,
                    RunProgress::RateLimitStop {
                        resource: QuotaResource::Search,
                    },
                );
                return;
            }
        }
    }

    fn finish(self, ledger: Ledger, summary: RunSummary) -> Result<RunReport, PipelineError> {
        self.checkpoint(&ledger)?;
        tracing::info!(
            queries = summary.queries_run,
            follow_ups = summary.follow_up_queries,
            found = summary.repositories_found,
            new = summary.repositories_new,
            scanned = summary.repositories_scanned,
            events = summary.events_detected,
            sent = summary.notifications_sent,
            failed = summary.notifications_failed,
            deferred = summary.notifications_deferred,
            duplicates = summary.duplicates_skipped,
            subqueries_failed = summary.subqueries_failed,
            scan_failures = summary.scan_failures,
            cut_short = summary.cut_short(),
            "Run complete"
        );
        emit(
            self.on_progress,
            RunProgress::Finished {
                summary: summary.clone(),
            },
        );
        Ok(RunReport { ledger, summary })
    }
}
