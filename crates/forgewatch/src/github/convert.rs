//! Conversion from GitHub wire types to engine types.

use crate::model::{RepoId, RepoSummary};
use crate::platform::{LatestCommit, LatestIssue, LatestRelease};

use super::types::{WireCommit, WireIssue, WireRelease, WireRepository};

/// Convert a search hit. Returns `None` for a malformed `full_name`.
pub fn to_repo_summary(repo: WireRepository) -> Option<RepoSummary> {
    let id = RepoId::parse(&repo.full_name)?;
    Some(RepoSummary {
        id,
        description: repo.description.filter(|d| !d.trim().is_empty()),
        html_url: repo.html_url,
        stars: repo.stargazers_count,
        forks: repo.forks_count,
        language: repo.language,
        topics: repo.topics,
        size_kb: repo.size,
        created_at: repo.created_at,
        pushed_at: repo.pushed_at,
    })
}

pub fn to_latest_release(release: WireRelease) -> LatestRelease {
    LatestRelease {
        tag: release.tag_name,
        name: release.name.filter(|n| !n.trim().is_empty()),
        url: release.html_url,
        prerelease: release.prerelease,
        published_at: release.published_at,
    }
}

pub fn to_latest_commit(commit: WireCommit) -> LatestCommit {
    let author = commit
        .author
        .map(|u| u.login)
        .or_else(|| commit.commit.author.and_then(|a| a.name));
    LatestCommit {
        sha: commit.sha,
        message: commit.commit.message,
        url: commit.html_url,
        author,
    }
}

pub fn to_latest_issue(issue: WireIssue) -> LatestIssue {
    LatestIssue {
        number: issue.number,
        title: issue.title,
        url: issue.html_url,
        is_pull_request: issue.pull_request.is_some(),
        author: issue.user.map(|u| u.login),
    }
}
