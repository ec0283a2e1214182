use forgewatch::github::{GitHubClient, GitHubRateLimits, RateLimitResource};

use super::{OutputFormat, print_rows};
use crate::config::Config;

/// Rate limit information for display.
#[derive(Debug, Clone, serde::Serialize, tabled::Tabled)]
pub(crate) struct RateLimitDisplay {
    #[tabled(rename = "Resource")]
    #[serde(rename = "resource")]
    pub resource: String,
    #[tabled(rename = "Limit")]
    pub limit: String,
    #[tabled(rename = "Used")]
    pub used: String,
    #[tabled(rename = "Remaining")]
    pub remaining: String,
    #[tabled(rename = "Usage %")]
    pub usage_percent: String,
    #[tabled(rename = "Resets At")]
    pub reset_at: String,
    #[tabled(rename = "Resets In")]
    pub reset_in: String,
    /// Whether the gate would let a batch start right now.
    #[tabled(rename = "Gate")]
    pub gate: String,
}

impl RateLimitDisplay {
    pub(crate) fn from_resource(name: &str, resource: &RateLimitResource, threshold: usize) -> Self {
        let usage_percent = if resource.limit > 0 {
            (resource.used as f64 / resource.limit as f64) * 100.0
        } else {
            0.0
        };
        let now = chrono::Utc::now();
        let reset_at = resource.reset_at();
        let reset_duration = reset_at.signed_duration_since(now);
        let reset_in = if reset_duration.num_seconds() > 0 {
            format_duration(reset_duration)
        } else {
            "now".to_string()
        };
        let gate = if resource.remaining >= threshold {
            "open"
        } else {
            "closed"
        };
        Self {
            resource: name.to_string(),
            limit: resource.limit.to_string(),
            used: resource.used.to_string(),
            remaining: resource.remaining.to_string(),
            usage_percent: format!("{:.1}%", usage_percent),
            reset_at: reset_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            reset_in,
            gate: gate.to_string(),
        }
    }
}

/// Resources the poller draws from, search first.
pub(crate) fn rate_limits_to_display(
    limits: &GitHubRateLimits,
    threshold: usize,
) -> Vec<RateLimitDisplay> {
    let mut items = vec![
        RateLimitDisplay::from_resource("search", &limits.search, threshold),
        RateLimitDisplay::from_resource("core", &limits.core, threshold),
    ];
    if let Some(ref r) = limits.graphql {
        items.push(RateLimitDisplay::from_resource("graphql", r, threshold));
    }
    items
}

/// Show the current search and core quotas.
pub(crate) async fn handle_limits(
    output: OutputFormat,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = GitHubClient::new(config.github_token())?;
    let response = client.get_rate_limit_response().await?;
    let items = rate_limits_to_display(&response.resources, config.rate_limit.threshold);
    print_rows(items, output)?;
    Ok(())
}

/// Format a duration in a human-readable way.
fn format_duration(duration: chrono::Duration) -> String {
    let total_secs = duration.num_seconds();
    if total_secs < 60 {
        format!("{}s", total_secs)
    } else if total_secs < 3600 {
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        if secs > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}m", mins)
        }
    } else {
        let hours = total_secs / 3600;
        let mins = (total_secs % 3600) / 60;
        if mins > 0 {
            format!("{}h {}m", hours, mins)
        } else {
            format!("{}h", hours)
        }
    }
}
