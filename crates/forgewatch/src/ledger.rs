//! Persistent dedup state: known repositories, delivered events and
//! per-repository activity markers, plus the in-run [`Frontier`].

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{RepoId, RepoSummary};

/// Kinds of notifiable event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Repository,
    Release,
    Commit,
    Issue,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Repository => "repository",
            EventKind::Release => "release",
            EventKind::Commit => "commit",
            EventKind::Issue => "issue",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = EventIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "repository" => Ok(EventKind::Repository),
            "release" => Ok(EventKind::Release),
            "commit" => Ok(EventKind::Commit),
            "issue" => Ok(EventKind::Issue),
            other => Err(EventIdError::UnknownKind(other.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventIdError {
    #[error("malformed event id: {0}")]
    Malformed(String),
    #[error("unknown event kind: {0}")]
    UnknownKind(String),
}

/// Identity of a notifiable event, stored as `owner/name#kind#version`.
///
/// A new repository uses its own name as the version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventId {
    pub repo: RepoId,
    pub kind: EventKind,
    pub version: String,
}

impl EventId {
    pub fn new(repo: RepoId, kind: EventKind, version: impl Into<String>) -> Self {
        Self {
            repo,
            kind,
            version: version.into(),
        }
    }

    /// Event id for the discovery of `repo` itself.
    pub fn repository(repo: RepoId) -> Self {
        let version = repo.as_str().to_string();
        Self::new(repo, EventKind::Repository, version)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}#{}", self.repo, self.kind, self.version)
    }
}

impl FromStr for EventId {
    type Err = EventIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '#');
        let (Some(repo), Some(kind), Some(version)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(EventIdError::Malformed(s.to_string()));
        };
        let repo = RepoId::parse(repo).ok_or_else(|| EventIdError::Malformed(s.to_string()))?;
        Ok(Self::new(repo, kind.parse()?, version))
    }
}

impl TryFrom<String> for EventId {
    type Error = EventIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EventId> for String {
    fn from(id: EventId) -> Self {
        id.to_string()
    }
}

/// Last-seen activity of one repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityMarker {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<u64>,
}

impl ActivityMarker {
    /// The marker value for `kind`, rendered the way event versions are.
    pub fn get(&self, kind: EventKind) -> Option<String> {
        match kind {
            EventKind::Release => self.release.clone(),
            EventKind::Commit => self.commit.clone(),
            EventKind::Issue => self.issue.map(|n| n.to_string()),
            EventKind::Repository => None,
        }
    }

    /// Record `version` as last seen for `kind`.
    pub fn set(&mut self, kind: EventKind, version: &str) {
        match kind {
            EventKind::Release => self.release = Some(version.to_string()),
            EventKind::Commit => self.commit = Some(version.to_string()),
            EventKind::Issue => {
                if let Ok(n) = version.parse() {
                    self.issue = Some(n);
                }
            }
            EventKind::Repository => {}
        }
    }

    pub fn is_empty(&self) -> bool {
        self.release.is_none() && self.commit.is_none() && self.issue.is_none()
    }
}

/// Everything the poller remembers between runs.
///
/// Grows monotonically: repositories and delivered events are only ever
/// added. Only an external reset empties it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    known: BTreeSet<RepoId>,
    delivered: BTreeSet<EventId>,
    markers: BTreeMap<RepoId, ActivityMarker>,
    scan_offset: usize,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from persisted parts.
    pub fn from_parts(
        known: BTreeSet<RepoId>,
        delivered: BTreeSet<EventId>,
        markers: BTreeMap<RepoId, ActivityMarker>,
        scan_offset: usize,
    ) -> Self {
        Self {
            known,
            delivered,
            markers,
            scan_offset,
        }
    }

    pub fn known(&self) -> &BTreeSet<RepoId> {
        &self.known
    }

    pub fn is_known(&self, repo: &RepoId) -> bool {
        self.known.contains(repo)
    }

    /// Union `candidates` into the known set and return the ones that were
    /// not there before, in input order.
    pub fn merge<I>(&mut self, candidates: I) -> Vec<RepoId>
    where
        I: IntoIterator<Item = RepoId>,
    {
        candidates
            .into_iter()
            .filter(|id| self.known.insert(id.clone()))
            .collect()
    }

    pub fn delivered(&self) -> &BTreeSet<EventId> {
        &self.delivered
    }

    pub fn is_delivered(&self, id: &EventId) -> bool {
        self.delivered.contains(id)
    }

    /// Record `id` as delivered. Returns `false` if it already was.
    pub fn mark_delivered(&mut self, id: EventId) -> bool {
        self.delivered.insert(id)
    }

    pub fn markers(&self) -> &BTreeMap<RepoId, ActivityMarker> {
        &self.markers
    }

    pub fn marker(&self, repo: &RepoId) -> Option<&ActivityMarker> {
        self.markers.get(repo)
    }

    /// Advance the marker of `repo` for `kind`.
    pub fn set_marker(&mut self, repo: &RepoId, kind: EventKind, version: &str) {
        self.markers
            .entry(repo.clone())
            .or_default()
            .set(kind, version);
    }

    /// Where the next activity scan starts in the known set.
    pub fn scan_offset(&self) -> usize {
        self.scan_offset
    }

    pub fn set_scan_offset(&mut self, offset: usize) {
        self.scan_offset = offset;
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty() && self.delivered.is_empty() && self.markers.is_empty()
    }
}

/// Deduplicated, insertion-ordered set of repositories found in one run.
///
/// Partitions overlap (a repository matches several base queries and
/// several secondary slices), so everything found goes through here.
#[derive(Debug, Clone, Default)]
pub struct Frontier {
    items: Vec<RepoSummary>,
    seen: HashSet<RepoId>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `summary` unless its id is already present. Returns whether it
    /// was added.
    pub fn insert(&mut self, summary: RepoSummary) -> bool {
        if self.seen.insert(summary.id.clone()) {
            self.items.push(summary);
            true
        } else {
            false
        }
    }

    /// Insert every item; returns how many were new.
    pub fn extend<I>(&mut self, items: I) -> usize
    where
        I: IntoIterator<Item = RepoSummary>,
    {
        items
            .into_iter()
            .filter(|summary| self.insert(summary.clone()))
            .count()
    }

    pub fn contains(&self, id: &RepoId) -> bool {
        self.seen.contains(id)
    }

    pub fn get(&self, id: &RepoId) -> Option<&RepoSummary> {
        if !self.contains(id) {
            return None;
        }
        self.items.iter().find(|s| &s.id == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RepoSummary> {
        self.items.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &RepoId> {
        self.items.iter().map(|s| &s.id)
    }

    pub fn into_vec(self) -> Vec<RepoSummary> {
        self.items
    }
}
