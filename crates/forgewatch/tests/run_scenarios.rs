//! End-to-end runs of the pipeline against a synthetic backend, with state
//! persisted to a temporary directory between runs.
//!
//! Key scenarios tested:
//! - New repositories are announced once, and a second run is silent
//! - A new release after the baseline produces exactly one message
//! - An exhausted search quota ends the run cleanly with state saved
//! - The per-run cap defers the overflow to the next run
//! - Dry runs never write state
//! - Ctrl+C mid-scan stops before notifying and keeps the progress made

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};

use common::{RecordingMessenger, SynthRepo, SyntheticForge, date};
use forgewatch::activity::ScanOptions;
use forgewatch::ledger::Ledger;
use forgewatch::model::RepoId;
use forgewatch::notify::NotifyOptions;
use forgewatch::pipeline::{Pipeline, RunOptions, RunReport};
use forgewatch::state::StateStore;
use forgewatch::taxonomy::Taxonomy;
use tempfile::TempDir;

const QUERY: &str = "topic:flipperzero archived:false";

fn options() -> RunOptions {
    RunOptions {
        taxonomy: Taxonomy {
            categories: Vec::new(),
            logical_pairs: Vec::new(),
            triples: Vec::new(),
            languages: Vec::new(),
            star_filters: Vec::new(),
            compound_queries: vec![QUERY.to_string()],
        },
        watch_recent: false,
        follow_up_limit: 0,
        today: Some(date(2024, 6, 30)),
        ..RunOptions::default()
    }
}

fn repos(prefix: &str, count: usize) -> Vec<SynthRepo> {
    (0..count)
        .map(|i| SynthRepo::new(&format!("{}/repo{:02}", prefix, i), date(2024, 5, 1)))
        .collect()
}

struct Harness {
    _dir: TempDir,
    store: StateStore,
    backend: SyntheticForge,
    messenger: RecordingMessenger,
}

impl Harness {
    fn new(backend: SyntheticForge) -> Self {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        Self {
            _dir: dir,
            store,
            backend,
            messenger: RecordingMessenger::default(),
        }
    }

    /// Load the ledger from disk, run once, and return the report.
    async fn run(&self, options: RunOptions) -> RunReport {
        let ledger = self.store.load().unwrap();
        Pipeline::new(&self.backend, &self.messenger, options)
            .with_store(&self.store)
            .run(ledger)
            .await
            .unwrap()
    }
}

#[tokio::test(start_paused = true)]
async fn second_run_is_silent() {
    let h = Harness::new(SyntheticForge::new(repos("maker", 3)));

    let first = h.run(options()).await;
    assert_eq!(first.summary.repositories_found, 3);
    assert_eq!(first.summary.repositories_new, 3);
    assert_eq!(first.summary.notifications_sent, 3);
    let sent = h.messenger.sent();
    assert_eq!(sent.len(), 3);
    assert!(sent[0].contains("maker/repo00"));
    assert!(h.store.path().exists());

    h.messenger.clear();
    let second = h.run(options()).await;
    assert_eq!(second.summary.repositories_found, 3);
    assert_eq!(second.summary.repositories_new, 0);
    assert_eq!(second.summary.notifications_sent, 0);
    assert!(h.messenger.sent().is_empty());
    assert_eq!(second.ledger.known().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn new_release_is_announced_once() {
    let h = Harness::new(SyntheticForge::new(repos("maker", 1)));
    h.backend.set_release("maker/repo00", "v1.0");

    // First sighting: the repository is announced, the release is only
    // recorded as a baseline.
    let first = h.run(options()).await;
    assert_eq!(first.summary.activity_baselined, 1);
    assert_eq!(first.summary.events_detected, 0);
    assert_eq!(h.messenger.sent().len(), 1);

    h.messenger.clear();
    h.backend.set_release("maker/repo00", "v1.1");
    let second = h.run(options()).await;
    assert_eq!(second.summary.events_detected, 1);
    let sent = h.messenger.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("v1.1"));

    let repo = RepoId::parse("maker/repo00").unwrap();
    let marker = second.ledger.marker(&repo).unwrap();
    assert_eq!(
        marker.get(forgewatch::ledger::EventKind::Release).as_deref(),
        Some("v1.1")
    );

    h.messenger.clear();
    let third = h.run(options()).await;
    assert_eq!(third.summary.events_detected, 0);
    assert!(h.messenger.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn exhausted_search_quota_stops_cleanly() {
    let mut backend = SyntheticForge::new(repos("maker", 3));
    backend.search_remaining = 5;
    let h = Harness::new(backend);

    // A ledger from an earlier run, already on disk.
    let mut ledger = Ledger::new();
    ledger.merge([RepoId::parse("old/project").unwrap()]);
    h.store.save(&ledger).unwrap();

    let report = h.run(options()).await;
    assert!(report.summary.rate_limited);
    assert!(report.summary.cut_short());
    assert_eq!(report.summary.queries_run, 0);
    assert!(h.backend.queries().is_empty());
    assert!(h.messenger.sent().is_empty());

    let reloaded = h.store.load().unwrap();
    assert!(reloaded.is_known(&RepoId::parse("old/project").unwrap()));
    assert_eq!(reloaded.known().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cap_defers_the_rest_to_the_next_run() {
    let h = Harness::new(SyntheticForge::new(repos("bulk", 30)));
    let capped = || RunOptions {
        notify: NotifyOptions {
            max_per_run: 25,
            ..NotifyOptions::default()
        },
        ..options()
    };

    let first = h.run(capped()).await;
    assert_eq!(first.summary.notifications_sent, 25);
    assert_eq!(first.summary.notifications_deferred, 5);
    assert_eq!(first.ledger.known().len(), 30);

    h.messenger.clear();
    let second = h.run(capped()).await;
    assert_eq!(second.summary.repositories_new, 0);
    assert_eq!(second.summary.notifications_sent, 5);
    assert_eq!(second.summary.notifications_deferred, 0);
    let sent = h.messenger.sent();
    assert_eq!(sent.len(), 5);
    assert!(sent.iter().all(|m| !m.contains("bulk/repo00")));
    assert!(sent.iter().any(|m| m.contains("bulk/repo29")));

    h.messenger.clear();
    let third = h.run(capped()).await;
    assert_eq!(third.summary.notifications_sent, 0);
}

#[tokio::test(start_paused = true)]
async fn dry_run_writes_no_state() {
    let h = Harness::new(SyntheticForge::new(repos("maker", 2)));
    let report = h
        .run(RunOptions {
            dry_run: true,
            ..options()
        })
        .await;

    assert_eq!(report.summary.repositories_new, 2);
    assert_eq!(h.messenger.sent().len(), 2);
    assert!(!h.store.path().exists());

    // Nothing was remembered, so a real run announces the same repositories.
    h.messenger.clear();
    let real = h.run(options()).await;
    assert_eq!(real.summary.notifications_sent, 2);
}

#[tokio::test(start_paused = true)]
async fn interrupt_during_scan_persists_progress() {
    let h = Harness::new(SyntheticForge::new(repos("maker", 5)));
    let opts = RunOptions {
        scan: ScanOptions {
            batch_size: 2,
            ..ScanOptions::default()
        },
        ..options()
    };

    // Polled once before the single query, then after each scan batch.
    let polls = AtomicUsize::new(0);
    let stop_after_first_batch = move || polls.fetch_add(1, Ordering::SeqCst) >= 1;

    let ledger = h.store.load().unwrap();
    let report = Pipeline::new(&h.backend, &h.messenger, opts)
        .with_store(&h.store)
        .with_stop_check(&stop_after_first_batch)
        .run(ledger)
        .await
        .unwrap();

    assert!(report.summary.interrupted);
    assert!(report.summary.cut_short());
    assert_eq!(report.summary.queries_run, 1);
    assert_eq!(report.summary.repositories_scanned, 2);
    assert_eq!(report.summary.notifications_sent, 0);
    assert!(h.messenger.sent().is_empty());

    let saved = h.store.load().unwrap();
    assert_eq!(saved.known().len(), 5);
    assert_eq!(saved.scan_offset(), 2);
    assert!(saved.delivered().is_empty());

    // The next uninterrupted run announces everything it held back.
    let next = h.run(options()).await;
    assert_eq!(next.summary.notifications_sent, 5);
    assert_eq!(h.messenger.sent().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn interrupt_before_discovery_keeps_old_state() {
    let h = Harness::new(SyntheticForge::new(repos("maker", 3)));
    let mut ledger = Ledger::new();
    ledger.merge([RepoId::parse("old/project").unwrap()]);
    h.store.save(&ledger).unwrap();

    let always = || true;
    let report = Pipeline::new(&h.backend, &h.messenger, options())
        .with_store(&h.store)
        .with_stop_check(&always)
        .run(h.store.load().unwrap())
        .await
        .unwrap();

    assert!(report.summary.interrupted);
    assert_eq!(report.summary.queries_run, 0);
    assert!(h.backend.queries().is_empty());
    assert!(h.messenger.sent().is_empty());
    let saved = h.store.load().unwrap();
    assert!(saved.is_known(&RepoId::parse("old/project").unwrap()));
}
