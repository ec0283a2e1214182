//! Telegram HTML rendering of notifications.

use crate::activity::ActivityEvent;
use crate::model::RepoSummary;

use super::Notification;

/// Telegram rejects messages over 4096 characters.
const MAX_MESSAGE_CHARS: usize = 4096;
const MAX_DESCRIPTION_CHARS: usize = 300;
const MAX_TOPICS: usize = 8;

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

fn link(url: &str, label: &str) -> String {
    format!("<a href=\"{}\">{}</a>", escape_html(url), escape_html(label))
}

/// Render one notification as a message body.
pub fn render(notification: &Notification) -> String {
    let text = match notification {
        Notification::NewRepository(repo) => render_repository(repo),
        Notification::Activity(event) => render_activity(event),
    };
    truncate(&text, MAX_MESSAGE_CHARS)
}

fn render_repository(repo: &RepoSummary) -> String {
    let mut lines = vec![format!(
        "🆕 <b>New repository</b>: {}",
        link(&repo.html_url, repo.id.as_str())
    )];
    if let Some(description) = &repo.description {
        lines.push(escape_html(&truncate(description, MAX_DESCRIPTION_CHARS)));
    }

    let mut stats = vec![format!("⭐ {}", repo.stars)];
    if repo.forks > 0 {
        stats.push(format!("🍴 {}", repo.forks));
    }
    if let Some(language) = &repo.language {
        stats.push(escape_html(language));
    }
    lines.push(stats.join(" · "));

    if !repo.topics.is_empty() {
        let tags: Vec<String> = repo
            .topics
            .iter()
            .take(MAX_TOPICS)
            .map(|t| format!("#{}", escape_html(&t.replace('-', "_"))))
            .collect();
        lines.push(tags.join(" "));
    }
    lines.join("\n")
}

fn render_activity(event: &ActivityEvent) -> String {
    match event {
        ActivityEvent::Release {
            repo,
            tag,
            name,
            url,
            prerelease,
        } => {
            let label = if *prerelease { "Pre-release" } else { "Release" };
            let mut text = format!(
                "🚀 <b>{}</b> {} in {}",
                label,
                link(url, tag),
                escape_html(repo.as_str())
            );
            if let Some(name) = name.as_deref().filter(|n| *n != tag.as_str()) {
                text.push('\n');
                text.push_str(&escape_html(name));
            }
            text
        }
        ActivityEvent::Commit {
            repo,
            sha,
            message,
            url,
            author,
        } => {
            let short_sha: String = sha.chars().take(7).collect();
            let summary = message.lines().next().unwrap_or_default();
            let mut text = format!(
                "📝 <b>Commit</b> {} in {}\n{}",
                link(url, &short_sha),
                escape_html(repo.as_str()),
                escape_html(&truncate(summary, MAX_DESCRIPTION_CHARS))
            );
            if let Some(author) = author {
                text.push_str(&format!("\nby {}", escape_html(author)));
            }
            text
        }
        ActivityEvent::Issue {
            repo,
            number,
            title,
            url,
            is_pull_request,
            author,
        } => {
            let (icon, label) = if *is_pull_request {
                ("🔀", "Pull request")
            } else {
                ("🐛", "Issue")
            };
            let mut text = format!(
                "{} <b>{}</b> {} in {}\n{}",
                icon,
                label,
                link(url, &format!("#{}", number)),
                escape_html(repo.as_str()),
                escape_html(&truncate(title, MAX_DESCRIPTION_CHARS))
            );
            if let Some(author) = author {
                text.push_str(&format!("\nby {}", escape_html(author)));
            }
            text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RepoId;

    fn id(s: &str) -> RepoId {
        RepoId::parse(s).unwrap()
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape_html("a < b && \"c\" > d"), "a &lt; b &amp;&amp; &quot;c&quot; &gt; d");
    }

    #[test]
    fn repository_message_lists_stats_and_topics() {
        let mut repo = RepoSummary::bare(id("flipperdevices/qFlipper"));
        repo.description = Some("Desktop <app>".to_string());
        repo.stars = 1200;
        repo.language = Some("C++".to_string());
        repo.topics = vec!["flipper-zero".to_string(), "nfc".to_string()];
        let text = render(&Notification::NewRepository(repo));
        assert!(text.contains("<a href=\"https://github.com/flipperdevices/qFlipper\">flipperdevices/qFlipper</a>"));
        assert!(text.contains("Desktop &lt;app&gt;"));
        assert!(text.contains("⭐ 1200 · C++"));
        assert!(text.contains("#flipper_zero #nfc"));
    }

    #[test]
    fn release_message_marks_prereleases() {
        let event = ActivityEvent::Release {
            repo: id("a/b"),
            tag: "v1.1-rc1".to_string(),
            name: Some("Candidate".to_string()),
            url: "https://github.com/a/b/releases/tag/v1.1-rc1".to_string(),
            prerelease: true,
        };
        let text = render(&Notification::Activity(event));
        assert!(text.starts_with("🚀 <b>Pre-release</b>"));
        assert!(text.ends_with("\nCandidate"));
    }

    #[test]
    fn commit_message_uses_short_sha_and_first_line() {
        let event = ActivityEvent::Commit {
            repo: id("a/b"),
            sha: "0123456789abcdef".to_string(),
            message: "Fix NFC parser\n\nLong body".to_string(),
            url: "https://github.com/a/b/commit/0123456789abcdef".to_string(),
            author: Some("dev".to_string()),
        };
        let text = render(&Notification::Activity(event));
        assert!(text.contains(">0123456</a>"));
        assert!(text.contains("Fix NFC parser\nby dev"));
        assert!(!text.contains("Long body"));
    }

    #[test]
    fn issue_message_distinguishes_pull_requests() {
        let event = ActivityEvent::Issue {
            repo: id("a/b"),
            number: 7,
            title: "Add iButton".to_string(),
            url: "https://github.com/a/b/pull/7".to_string(),
            is_pull_request: true,
            author: None,
        };
        let text = render(&Notification::Activity(event));
        assert!(text.starts_with("🔀 <b>Pull request</b>"));
        assert!(text.contains(">#7</a>"));
    }

    #[test]
    fn long_text_is_truncated() {
        let long = "x".repeat(5000);
        assert_eq!(truncate(&long, 10).chars().count(), 10);
        assert_eq!(truncate("short", 10), "short");
    }
}
