//! Core domain values shared by the search engine, ledger and notifier.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A repository identifier in `owner/name` form.
///
/// This is the key the ledger stores; everything else refers to it rather
/// than copying repository metadata around.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepoId(String);

impl RepoId {
    /// Build an id from a `full_name` as returned by the search API.
    ///
    /// Returns `None` unless the value has exactly one `/` with non-empty
    /// owner and name parts.
    pub fn parse(full_name: &str) -> Option<Self> {
        let (owner, name) = full_name.split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') || full_name.contains('#') {
            return None;
        }
        Some(Self(full_name.to_string()))
    }

    /// Build an id from separate owner and name.
    pub fn from_parts(owner: &str, name: &str) -> Option<Self> {
        Self::parse(&format!("{}/{}", owner, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn owner(&self) -> &str {
        self.0.split_once('/').map(|(o, _)| o).unwrap_or(&self.0)
    }

    pub fn name(&self) -> &str {
        self.0.split_once('/').map(|(_, n)| n).unwrap_or_default()
    }

    /// Browser URL of the repository.
    pub fn html_url(&self) -> String {
        format!("https://github.com/{}", self.0)
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A repository as surfaced by search, carried in the run frontier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSummary {
    pub id: RepoId,
    pub description: Option<String>,
    pub html_url: String,
    pub stars: u64,
    pub forks: u64,
    pub language: Option<String>,
    pub topics: Vec<String>,
    pub size_kb: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub pushed_at: Option<DateTime<Utc>>,
}

impl RepoSummary {
    /// A summary with only the identifier filled in.
    pub fn bare(id: RepoId) -> Self {
        let html_url = id.html_url();
        Self {
            id,
            description: None,
            html_url,
            stars: 0,
            forks: 0,
            language: None,
            topics: Vec::new(),
            size_kb: 0,
            created_at: None,
            pushed_at: None,
        }
    }

    /// Creation date, used by date-sliced test backends and logging.
    pub fn created_on(&self) -> Option<NaiveDate> {
        self.created_at.map(|dt| dt.date_naive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_owner_slash_name() {
        let id = RepoId::parse("flipperdevices/flipperzero-firmware").unwrap();
        assert_eq!(id.owner(), "flipperdevices");
        assert_eq!(id.name(), "flipperzero-firmware");
        assert_eq!(id.to_string(), "flipperdevices/flipperzero-firmware");
        assert_eq!(
            id.html_url(),
            "https://github.com/flipperdevices/flipperzero-firmware"
        );
    }

    #[test]
    fn parse_rejects_malformed_names() {
        assert!(RepoId::parse("noslash").is_none());
        assert!(RepoId::parse("/name").is_none());
        assert!(RepoId::parse("owner/").is_none());
        assert!(RepoId::parse("a/b/c").is_none());
        assert!(RepoId::parse("a/b#c").is_none());
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = RepoId::from_parts("octo", "cat").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"octo/cat\"");
        let back: RepoId = serde_json::from_str("\"octo/cat\"").unwrap();
        assert_eq!(back, id);
    }
}
