//! Release, commit and issue activity of known repositories.
//!
//! Each scan fetches only the newest item of each kind and compares it with
//! the repository's [`ActivityMarker`]. Several releases published between
//! two runs therefore surface as one event for the newest.

use std::ops::ControlFlow;

use serde::{Deserialize, Serialize};

use crate::ledger::{EventId, EventKind, Ledger};
use crate::model::RepoId;
use crate::platform::{
    ForgeClient, GateDecision, PlatformError, QuotaResource, RateLimitGate, short_error_message,
};

/// A change detected on a known repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityEvent {
    Release {
        repo: RepoId,
        tag: String,
        name: Option<String>,
        url: String,
        prerelease: bool,
    },
    Commit {
        repo: RepoId,
        sha: String,
        message: String,
        url: String,
        author: Option<String>,
    },
    Issue {
        repo: RepoId,
        number: u64,
        title: String,
        url: String,
        is_pull_request: bool,
        author: Option<String>,
    },
}

impl ActivityEvent {
    pub fn repo(&self) -> &RepoId {
        match self {
            ActivityEvent::Release { repo, .. }
            | ActivityEvent::Commit { repo, .. }
            | ActivityEvent::Issue { repo, .. } => repo,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            ActivityEvent::Release { .. } => EventKind::Release,
            ActivityEvent::Commit { .. } => EventKind::Commit,
            ActivityEvent::Issue { .. } => EventKind::Issue,
        }
    }

    /// The value recorded in the marker once this event is handled.
    pub fn version(&self) -> String {
        match self {
            ActivityEvent::Release { tag, .. } => tag.clone(),
            ActivityEvent::Commit { sha, .. } => sha.clone(),
            ActivityEvent::Issue { number, .. } => number.to_string(),
        }
    }

    pub fn event_id(&self) -> EventId {
        EventId::new(self.repo().clone(), self.kind(), self.version())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    pub releases: bool,
    pub commits: bool,
    pub issues: bool,
    /// Repositories per batch; the gate runs before each one.
    pub batch_size: usize,
    /// Cap on repositories scanned per run. Later runs continue where the
    /// previous one stopped.
    pub max_repositories: Option<usize>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            releases: true,
            commits: true,
            issues: true,
            batch_size: 50,
            max_repositories: None,
        }
    }
}

impl ScanOptions {
    pub fn kinds(&self) -> Vec<EventKind> {
        let mut kinds = Vec::with_capacity(3);
        if self.releases {
            kinds.push(EventKind::Release);
        }
        if self.commits {
            kinds.push(EventKind::Commit);
        }
        if self.issues {
            kinds.push(EventKind::Issue);
        }
        kinds
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub scanned: usize,
    /// New activity, in scan order. Markers for these are not advanced yet.
    pub events: Vec<ActivityEvent>,
    /// Kinds seen for the first time and recorded without an event.
    pub baselined: usize,
    /// Latest items whose event id was already delivered.
    pub duplicates: usize,
    /// Per-kind lookups that failed.
    pub failures: usize,
    pub batches: usize,
    /// The gate or the caller stopped the scan early.
    pub halted: bool,
}

/// Walks known repositories in gated batches.
#[derive(Debug, Clone)]
pub struct Scanner {
    options: ScanOptions,
    gate: RateLimitGate,
}

impl Scanner {
    pub fn new(options: ScanOptions, gate: RateLimitGate) -> Self {
        Self { options, gate }
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Repositories for this run: the known set rotated to the saved
    /// offset, capped at `max_repositories`.
    pub fn select(&self, ledger: &Ledger) -> Vec<RepoId> {
        let known: Vec<&RepoId> = ledger.known().iter().collect();
        if known.is_empty() {
            return Vec::new();
        }
        let start = ledger.scan_offset() % known.len();
        let limit = self
            .options
            .max_repositories
            .unwrap_or(known.len())
            .min(known.len());
        known
            .iter()
            .cycle()
            .skip(start)
            .take(limit)
            .map(|id| (*id).clone())
            .collect()
    }

    /// Scan the selected repositories.
    ///
    /// `checkpoint` runs after every batch with the ledger and the report so
    /// far; returning `Break` stops the scan. The ledger's scan offset is
    /// moved past the repositories actually scanned.
    pub async fn scan<C, F>(&self, client: &C, ledger: &mut Ledger, mut checkpoint: F) -> ScanReport
    where
        C: ForgeClient + ?Sized,
        F: FnMut(&Ledger, &ScanReport) -> ControlFlow<()>,
    {
        let mut report = ScanReport::default();
        let selection = self.select(ledger);
        let total_known = ledger.known().len();
        let start = if total_known == 0 {
            0
        } else {
            ledger.scan_offset() % total_known
        };

        for batch in selection.chunks(self.options.batch_size.max(1)) {
            if let GateDecision::Stop { .. } = self.gate.check(client, QuotaResource::Core).await {
                report.halted = true;
                break;
            }
            for repo in batch {
                self.scan_repository(client, repo, ledger, &mut report).await;
                report.scanned += 1;
            }
            report.batches += 1;
            if total_known > 0 {
                ledger.set_scan_offset((start + report.scanned) % total_known);
            }
            if checkpoint(ledger, &report).is_break() {
                report.halted = true;
                break;
            }
        }

        tracing::info!(
            scanned = report.scanned,
            events = report.events.len(),
            baselined = report.baselined,
            failures = report.failures,
            "Activity scan complete"
        );
        report
    }

    /// Check every enabled kind of one repository. Failures are counted and
    /// logged; the other kinds still run.
    pub async fn scan_repository<C>(
        &self,
        client: &C,
        repo: &RepoId,
        ledger: &mut Ledger,
        report: &mut ScanReport,
    ) where
        C: ForgeClient + ?Sized,
    {
        for kind in self.options.kinds() {
            let latest = match fetch_latest(client, repo, kind).await {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(e) => {
                    report.failures += 1;
                    tracing::warn!(
                        repo = %repo,
                        %kind,
                        error = %short_error_message(&e),
                        "Activity lookup failed, skipping"
                    );
                    continue;
                }
            };

            let version = latest.version();
            let previous = ledger.marker(repo).and_then(|m| m.get(kind));
            match previous {
                None => {
                    ledger.set_marker(repo, kind, &version);
                    report.baselined += 1;
                    tracing::debug!(repo = %repo, %kind, %version, "Recorded activity baseline");
                }
                Some(previous) if previous == version => {}
                Some(previous) if is_older_issue(kind, &previous, &version) => {
                    tracing::debug!(
                        repo = %repo,
                        %previous,
                        %version,
                        "Newest open issue predates the marker, moving marker"
                    );
                    ledger.set_marker(repo, kind, &version);
                }
                Some(_) if ledger.is_delivered(&latest.event_id()) => {
                    ledger.set_marker(repo, kind, &version);
                    report.duplicates += 1;
                }
                Some(previous) => {
                    tracing::debug!(repo = %repo, %kind, %previous, %version, "New activity");
                    report.events.push(latest);
                }
            }
        }
    }
}

/// The newest open issue went backwards: the one in the marker was closed,
/// so the previous open issue surfaced again.
fn is_older_issue(kind: EventKind, previous: &str, version: &str) -> bool {
    if kind != EventKind::Issue {
        return false;
    }
    match (previous.parse::<u64>(), version.parse::<u64>()) {
        (Ok(previous), Ok(version)) => version < previous,
        _ => false,
    }
}

async fn fetch_latest<C>(
    client: &C,
    repo: &RepoId,
    kind: EventKind,
) -> Result<Option<ActivityEvent>, PlatformError>
where
    C: ForgeClient + ?Sized,
{
    let event = match kind {
        EventKind::Release => client
            .latest_release(repo)
            .await?
            .map(|r| ActivityEvent::Release {
                repo: repo.clone(),
                tag: r.tag,
                name: r.name,
                url: r.url,
                prerelease: r.prerelease,
            }),
        EventKind::Commit => client
            .latest_commit(repo)
            .await?
            .map(|c| ActivityEvent::Commit {
                repo: repo.clone(),
                sha: c.sha,
                message: c.message,
                url: c.url,
                author: c.author,
            }),
        EventKind::Issue => client
            .latest_issue(repo)
            .await?
            .map(|i| ActivityEvent::Issue {
                repo: repo.clone(),
                number: i.number,
                title: i.title,
                url: i.url,
                is_pull_request: i.is_pull_request,
                author: i.author,
            }),
        EventKind::Repository => None,
    };
    Ok(event)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{Duration, Utc};

    use super::*;
    use crate::platform::{
        LatestCommit, LatestIssue, LatestRelease, QuotaSnapshot, RateLimitInfo, Result,
        SearchPage, SearchRequest,
    };

    #[derive(Default)]
    struct Activity {
        releases: Mutex<HashMap<String, String>>,
        issues: Mutex<HashMap<String, u64>>,
        broken_commits: Vec<String>,
        core_remaining: usize,
    }

    impl Activity {
        fn release(&self, repo: &str, tag: &str) {
            self.releases
                .lock()
                .unwrap()
                .insert(repo.to_string(), tag.to_string());
        }

        fn open_issue(&self, repo: &str, number: u64) {
            self.issues
                .lock()
                .unwrap()
                .insert(repo.to_string(), number);
        }
    }

    #[async_trait]
    impl ForgeClient for Activity {
        async fn search_repositories(&self, _: &SearchRequest) -> Result<SearchPage> {
            Ok(SearchPage::default())
        }

        async fn get_rate_limits(&self) -> Result<QuotaSnapshot> {
            let info = RateLimitInfo {
                limit: 5000,
                remaining: self.core_remaining,
                reset_at: Utc::now() + Duration::hours(1),
            };
            Ok(QuotaSnapshot {
                core: info.clone(),
                search: info,
            })
        }

        async fn latest_release(&self, repo: &RepoId) -> Result<Option<LatestRelease>> {
            Ok(self
                .releases
                .lock()
                .unwrap()
                .get(repo.as_str())
                .map(|tag| LatestRelease {
                    tag: tag.clone(),
                    name: None,
                    url: format!("{}/releases/tag/{}", repo.html_url(), tag),
                    prerelease: false,
                    published_at: None,
                }))
        }

        async fn latest_commit(&self, repo: &RepoId) -> Result<Option<LatestCommit>> {
            if self.broken_commits.iter().any(|r| r == repo.as_str()) {
                return Err(PlatformError::api(500, "boom"));
            }
            Ok(None)
        }

        async fn latest_issue(&self, repo: &RepoId) -> Result<Option<LatestIssue>> {
            Ok(self
                .issues
                .lock()
                .unwrap()
                .get(repo.as_str())
                .map(|number| LatestIssue {
                    number: *number,
                    title: format!("Issue {}", number),
                    url: format!("{}/issues/{}", repo.html_url(), number),
                    is_pull_request: false,
                    author: None,
                }))
        }
    }

    fn id(s: &str) -> RepoId {
        RepoId::parse(s).unwrap()
    }

    fn scanner(options: ScanOptions) -> Scanner {
        Scanner::new(options, RateLimitGate::default())
    }

    #[tokio::test]
    async fn first_sight_is_a_silent_baseline() {
        let client = Activity {
            core_remaining: 5000,
            ..Activity::default()
        };
        client.release("a/b", "v1.0");
        let mut ledger = Ledger::new();
        ledger.merge([id("a/b")]);

        let report = scanner(ScanOptions::default())
            .scan(&client, &mut ledger, |_, _| ControlFlow::Continue(()))
            .await;
        assert!(report.events.is_empty());
        assert_eq!(report.baselined, 1);
        assert_eq!(
            ledger.marker(&id("a/b")).unwrap().release.as_deref(),
            Some("v1.0")
        );
    }

    #[tokio::test]
    async fn changed_release_yields_one_event_without_advancing_marker() {
        let client = Activity {
            core_remaining: 5000,
            ..Activity::default()
        };
        client.release("a/b", "v1.1");
        let mut ledger = Ledger::new();
        ledger.merge([id("a/b")]);
        ledger.set_marker(&id("a/b"), EventKind::Release, "v1.0");

        let report = scanner(ScanOptions::default())
            .scan(&client, &mut ledger, |_, _| ControlFlow::Continue(()))
            .await;
        assert_eq!(report.events.len(), 1);
        assert_eq!(
            report.events[0].event_id().to_string(),
            "a/b#release#v1.1"
        );
        assert_eq!(
            ledger.marker(&id("a/b")).unwrap().release.as_deref(),
            Some("v1.0")
        );
    }

    #[tokio::test]
    async fn already_delivered_version_only_moves_marker() {
        let client = Activity {
            core_remaining: 5000,
            ..Activity::default()
        };
        client.release("a/b", "v1.1");
        let mut ledger = Ledger::new();
        ledger.merge([id("a/b")]);
        ledger.set_marker(&id("a/b"), EventKind::Release, "v1.0");
        ledger.mark_delivered(EventId::new(id("a/b"), EventKind::Release, "v1.1"));

        let report = scanner(ScanOptions::default())
            .scan(&client, &mut ledger, |_, _| ControlFlow::Continue(()))
            .await;
        assert!(report.events.is_empty());
        assert_eq!(report.duplicates, 1);
        assert_eq!(
            ledger.marker(&id("a/b")).unwrap().release.as_deref(),
            Some("v1.1")
        );
    }

    #[tokio::test]
    async fn closed_newest_issue_moves_marker_back_silently() {
        let client = Activity {
            core_remaining: 5000,
            ..Activity::default()
        };
        client.open_issue("a/b", 7);
        let mut ledger = Ledger::new();
        ledger.merge([id("a/b")]);
        ledger.set_marker(&id("a/b"), EventKind::Issue, "9");

        let scan = scanner(ScanOptions::default());
        let report = scan
            .scan(&client, &mut ledger, |_, _| ControlFlow::Continue(()))
            .await;
        assert!(report.events.is_empty());
        assert_eq!(
            ledger.marker(&id("a/b")).unwrap().get(EventKind::Issue).as_deref(),
            Some("7")
        );

        // A genuinely newer issue is still reported.
        client.open_issue("a/b", 12);
        let report = scan
            .scan(&client, &mut ledger, |_, _| ControlFlow::Continue(()))
            .await;
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].event_id().to_string(), "a/b#issue#12");
    }

    #[tokio::test]
    async fn one_failing_kind_does_not_stop_the_rest() {
        let client = Activity {
            core_remaining: 5000,
            broken_commits: vec!["a/bad".to_string()],
            ..Activity::default()
        };
        client.release("a/bad", "v2");
        client.release("a/good", "v3");
        let mut ledger = Ledger::new();
        ledger.merge([id("a/bad"), id("a/good")]);

        let report = scanner(ScanOptions::default())
            .scan(&client, &mut ledger, |_, _| ControlFlow::Continue(()))
            .await;
        assert_eq!(report.scanned, 2);
        assert_eq!(report.failures, 1);
        assert_eq!(report.baselined, 2);
    }

    #[tokio::test]
    async fn gate_stop_halts_before_first_batch() {
        let client = Activity {
            core_remaining: 3,
            ..Activity::default()
        };
        let mut ledger = Ledger::new();
        ledger.merge([id("a/b")]);
        let report = scanner(ScanOptions::default())
            .scan(&client, &mut ledger, |_, _| ControlFlow::Continue(()))
            .await;
        assert!(report.halted);
        assert_eq!(report.scanned, 0);
    }

    #[tokio::test]
    async fn checkpoint_runs_per_batch_and_can_stop() {
        let client = Activity {
            core_remaining: 5000,
            ..Activity::default()
        };
        let mut ledger = Ledger::new();
        ledger.merge((0..5).map(|i| id(&format!("o/r{}", i))));
        let mut calls = 0;
        let report = scanner(ScanOptions {
            batch_size: 2,
            ..ScanOptions::default()
        })
        .scan(&client, &mut ledger, |_, so_far| {
            calls += 1;
            if so_far.scanned >= 4 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .await;
        assert_eq!(calls, 2);
        assert_eq!(report.scanned, 4);
        assert!(report.halted);
        assert_eq!(ledger.scan_offset(), 4);
    }

    #[test]
    fn select_rotates_through_known_set() {
        let s = scanner(ScanOptions {
            max_repositories: Some(2),
            ..ScanOptions::default()
        });
        let mut ledger = Ledger::new();
        ledger.merge([id("o/a"), id("o/b"), id("o/c")]);
        assert_eq!(s.select(&ledger), vec![id("o/a"), id("o/b")]);
        ledger.set_scan_offset(2);
        assert_eq!(s.select(&ledger), vec![id("o/c"), id("o/a")]);
        ledger.set_scan_offset(7);
        assert_eq!(s.select(&ledger), vec![id("o/b"), id("o/c")]);
        assert!(s.select(&Ledger::new()).is_empty());
    }

    #[test]
    fn kinds_follow_options() {
        let options = ScanOptions {
            commits: false,
            ..ScanOptions::default()
        };
        assert_eq!(options.kinds(), vec![EventKind::Release, EventKind::Issue]);
    }
}
