//! Synthetic search backend and recording messenger shared by the
//! integration tests.
//!
//! `SyntheticForge` understands the qualifiers the partitioner emits
//! (`topic:`, `created:`, `size:`, `stars:`, `language:`) and enforces the
//! 1000-result window the way the real search endpoint does.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use forgewatch::model::{RepoId, RepoSummary};
use forgewatch::notify::{Messenger, NotifyError};
use forgewatch::platform::{
    ForgeClient, LatestCommit, LatestIssue, LatestRelease, PaginationInfo, PlatformError,
    QuotaSnapshot, RateLimitInfo, Result, SearchPage, SearchRequest,
};

pub const WINDOW: usize = 1000;

#[derive(Debug, Clone)]
pub struct SynthRepo {
    pub id: RepoId,
    pub created: NaiveDate,
    pub size_kb: u64,
    pub stars: u64,
    pub language: Option<String>,
    pub topics: Vec<String>,
}

impl SynthRepo {
    pub fn new(name: &str, created: NaiveDate) -> Self {
        Self {
            id: RepoId::parse(name).unwrap(),
            created,
            size_kb: 100,
            stars: 0,
            language: Some("C".to_string()),
            topics: vec!["flipperzero".to_string()],
        }
    }

    /// A repository whose size, stars and language cycle with `n`, so that
    /// no secondary bucket holds more than a sixth to a fifth of a dataset.
    pub fn varied(name: &str, created: NaiveDate, n: usize) -> Self {
        const SIZES: [u64; 12] = [
            5, 20, 70, 150, 300, 700, 1500, 3000, 7000, 15000, 30000, 60000,
        ];
        const STARS: [u64; 5] = [0, 2, 10, 50, 200];
        const LANGUAGES: [Option<&str>; 6] = [
            Some("C"),
            Some("Python"),
            Some("Rust"),
            Some("C++"),
            Some("JavaScript"),
            None,
        ];
        let mut repo = Self::new(name, created);
        repo.size_kb = SIZES[n % SIZES.len()];
        repo.stars = STARS[n % STARS.len()];
        repo.language = LANGUAGES[n % LANGUAGES.len()].map(String::from);
        repo
    }

    fn summary(&self) -> RepoSummary {
        let mut summary = RepoSummary::bare(self.id.clone());
        summary.description = Some(format!("Synthetic repository {}", self.id));
        summary.stars = self.stars;
        summary.language = self.language.clone();
        summary.topics = self.topics.clone();
        summary.size_kb = self.size_kb;
        summary.created_at = self.created.and_hms_opt(12, 0, 0).map(|dt| dt.and_utc());
        summary
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub struct SyntheticForge {
    repos: Vec<SynthRepo>,
    pub search_remaining: usize,
    pub core_remaining: usize,
    /// Queries containing any of these are refused with a validation error.
    pub reject_containing: Vec<String>,
    releases: Mutex<HashMap<RepoId, String>>,
    queries: Mutex<Vec<String>>,
}

impl SyntheticForge {
    pub fn new(mut repos: Vec<SynthRepo>) -> Self {
        repos.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            repos,
            search_remaining: 30,
            core_remaining: 5000,
            reject_containing: Vec::new(),
            releases: Mutex::new(HashMap::new()),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn set_release(&self, repo: &str, tag: &str) {
        self.releases
            .lock()
            .unwrap()
            .insert(RepoId::parse(repo).unwrap(), tag.to_string());
    }

    /// Every query string requested, one entry per page.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    fn matching(&self, query: &str) -> Vec<&SynthRepo> {
        self.repos
            .iter()
            .filter(|repo| query.split_whitespace().all(|token| token_matches(repo, token)))
            .collect()
    }
}

fn token_matches(repo: &SynthRepo, token: &str) -> bool {
    let Some((key, value)) = token.split_once(':') else {
        return true;
    };
    match key {
        "topic" => repo.topics.iter().any(|t| t == value),
        "language" => repo.language.as_deref() == Some(value),
        "size" => in_range(repo.size_kb, value),
        "stars" => in_range(repo.stars, value),
        "created" => created_matches(repo.created, value),
        _ => true,
    }
}

fn in_range(n: u64, spec: &str) -> bool {
    if let Some(v) = spec.strip_prefix(">=") {
        return n >= v.parse().unwrap();
    }
    if let Some(v) = spec.strip_prefix("<=") {
        return n <= v.parse().unwrap();
    }
    if let Some(v) = spec.strip_prefix('>') {
        return n > v.parse().unwrap();
    }
    if let Some(v) = spec.strip_prefix('<') {
        return n < v.parse().unwrap();
    }
    if let Some((lo, hi)) = spec.split_once("..") {
        return n >= lo.parse().unwrap() && n <= hi.parse().unwrap();
    }
    n == spec.parse::<u64>().unwrap()
}

fn created_matches(created: NaiveDate, spec: &str) -> bool {
    let parse = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
    if let Some(v) = spec.strip_prefix(">=") {
        return created >= parse(v);
    }
    if let Some((lo, hi)) = spec.split_once("..") {
        return created >= parse(lo) && created <= parse(hi);
    }
    created == parse(spec)
}

#[async_trait]
impl ForgeClient for SyntheticForge {
    async fn search_repositories(&self, request: &SearchRequest) -> Result<SearchPage> {
        self.queries.lock().unwrap().push(request.query.clone());
        if self
            .reject_containing
            .iter()
            .any(|needle| request.query.contains(needle.as_str()))
        {
            return Err(PlatformError::QueryRejected {
                message: "Validation Failed".to_string(),
            });
        }

        let matches = self.matching(&request.query);
        let per_page = request.per_page as usize;
        let start = (request.page as usize - 1) * per_page;
        if start >= WINDOW {
            return Err(PlatformError::QueryRejected {
                message: "Only the first 1000 search results are available".to_string(),
            });
        }
        let reachable = matches.len().min(WINDOW);
        let end = (start + per_page).min(reachable);
        let items = if start < end {
            matches[start..end].iter().map(|r| r.summary()).collect()
        } else {
            Vec::new()
        };
        Ok(SearchPage {
            total_count: matches.len() as u64,
            incomplete_results: false,
            items,
            pagination: PaginationInfo {
                total_pages: Some(reachable.div_ceil(per_page.max(1)) as u32),
                next_page: (end < reachable).then_some(request.page + 1),
            },
        })
    }

    async fn get_rate_limits(&self) -> Result<QuotaSnapshot> {
        let reset_at = Utc::now() + Duration::hours(1);
        Ok(QuotaSnapshot {
            core: RateLimitInfo {
                limit: 5000,
                remaining: self.core_remaining,
                reset_at,
            },
            search: RateLimitInfo {
                limit: 30,
                remaining: self.search_remaining,
                reset_at,
            },
        })
    }

    async fn latest_release(&self, repo: &RepoId) -> Result<Option<LatestRelease>> {
        Ok(self
            .releases
            .lock()
            .unwrap()
            .get(repo)
            .map(|tag| LatestRelease {
                tag: tag.clone(),
                name: None,
                url: format!("{}/releases/tag/{}", repo.html_url(), tag),
                prerelease: false,
                published_at: None,
            }))
    }

    async fn latest_commit(&self, _repo: &RepoId) -> Result<Option<LatestCommit>> {
        Ok(None)
    }

    async fn latest_issue(&self, _repo: &RepoId) -> Result<Option<LatestIssue>> {
        Ok(None)
    }
}

/// Messenger that records every message.
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<String>>,
}

impl RecordingMessenger {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send(&self, text: &str) -> std::result::Result<(), NotifyError> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}
