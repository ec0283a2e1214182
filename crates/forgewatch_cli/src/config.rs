//! Configuration file support for forgewatch.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Legacy environment variables (`TELEGRAM_TOKEN`, `CHANNEL_ID`,
//!    `TOPIC_ID`, `GITHUB_TOKEN`)
//! 3. Environment variables prefixed with `FORGEWATCH_`, with `__` between
//!    nested keys (e.g. `FORGEWATCH_TELEGRAM__CHAT_ID`)
//! 4. Config file (./forgewatch.toml, then ~/.config/forgewatch/config.toml)
//! 5. Built-in defaults
//!
//! The state file defaults to `~/.local/state/forgewatch/state.json` on Linux
//! (using the XDG state directory) if not explicitly configured.
//!
//! Example config file:
//! ```toml
//! [github]
//! token = "ghp_..."  # or GITHUB_TOKEN
//!
//! [telegram]
//! token = "123456:ABC..."  # or TELEGRAM_TOKEN
//! chat_id = "@flipper_feed"  # or CHANNEL_ID
//! thread_id = 40  # optional forum topic, or TOPIC_ID
//!
//! [search]
//! max_queries = 50
//! follow_up_limit = 20
//!
//! [search.partition]
//! epoch = "2020-01-01"
//!
//! [notify]
//! max_per_run = 25
//! delay_ms = 1000
//!
//! [rate_limit]
//! threshold = 10
//! max_wait_secs = 90
//! ```

use std::path::PathBuf;
use std::time::Duration;

use config::builder::DefaultState;
use config::{Config as ConfigBuilder, ConfigBuilder as Builder, Environment, File, FileFormat};
use directories::ProjectDirs;
use forgewatch::activity::ScanOptions;
use forgewatch::notify::NotifyOptions;
use forgewatch::pipeline::RunOptions;
use forgewatch::platform::RateLimitGate;
use forgewatch::search::{PaginatorConfig, PartitionConfig};
use forgewatch::taxonomy::Taxonomy;
use serde::Deserialize;

/// Name of the state file inside the state directory.
const STATE_FILE_NAME: &str = "state.json";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub github: GitHubConfig,
    pub telegram: TelegramConfig,
    pub state: StateConfig,
    pub search: SearchConfig,
    pub scan: ScanOptions,
    pub notify: NotifyOptions,
    pub rate_limit: RateLimitConfig,
    pub taxonomy: Taxonomy,
}

/// GitHub configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// API token. Optional, but unauthenticated search gets a third of the
    /// quota.
    pub token: Option<String>,
}

/// Telegram delivery settings.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token.
    pub token: Option<String>,
    /// Target chat, either `@channel` or a numeric id.
    pub chat_id: Option<String>,
    /// Forum topic to post into.
    pub thread_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// State file location. Defaults to the XDG state directory.
    pub path: Option<PathBuf>,
}

/// Discovery settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub max_queries: usize,
    pub watch_recent: bool,
    pub follow_up_min_count: usize,
    pub follow_up_limit: usize,
    pub partition: PartitionConfig,
    pub paginator: PaginatorConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        let run = RunOptions::default();
        Self {
            max_queries: run.max_queries,
            watch_recent: run.watch_recent,
            follow_up_min_count: run.follow_up_min_count,
            follow_up_limit: run.follow_up_limit,
            partition: run.partition,
            paginator: run.paginator,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Minimum remaining calls needed to start a batch.
    pub threshold: usize,
    /// Longest wait for a quota reset before the run stops instead.
    pub max_wait_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let gate = RateLimitGate::default();
        Self {
            threshold: gate.threshold,
            max_wait_secs: gate.max_wait.as_secs(),
        }
    }
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/forgewatch/config.toml)
    /// 3. Local config file (./forgewatch.toml)
    /// 4. Environment variables with FORGEWATCH_ prefix
    /// 5. Legacy environment variables
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(proj_dirs) = ProjectDirs::from("", "", "forgewatch") {
            let xdg_config = proj_dirs.config_dir().join("config.toml");
            if xdg_config.exists() {
                tracing::debug!("Loading config from {:?}", xdg_config);
                builder = builder.add_source(
                    File::from(xdg_config)
                        .format(FileFormat::Toml)
                        .required(false),
                );
            }
        }

        let local_config = PathBuf::from("forgewatch.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./forgewatch.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // e.g., FORGEWATCH_TELEGRAM__CHAT_ID -> telegram.chat_id
        builder = builder.add_source(
            Environment::with_prefix("FORGEWATCH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let builder = match with_legacy_env(builder, |key| std::env::var(key).ok()) {
            Ok(builder) => builder,
            Err(e) => {
                tracing::warn!("Ignoring legacy environment variables: {}", e);
                return Config::default();
            }
        };

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        }
    }

    /// State file path, falling back to the default state directory.
    pub fn state_path(&self) -> Option<PathBuf> {
        self.state
            .path
            .clone()
            .or_else(|| Self::default_state_dir().map(|dir| dir.join(STATE_FILE_NAME)))
    }

    /// Get the default state directory path.
    ///
    /// On Linux, this is `$XDG_STATE_HOME/forgewatch` or `~/.local/state/forgewatch`.
    /// On macOS/Windows, falls back to the data directory.
    pub fn default_state_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "forgewatch").map(|dirs| {
            dirs.state_dir()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| dirs.data_dir().to_path_buf())
        })
    }

    /// GitHub token, with blank values treated as unset.
    pub fn github_token(&self) -> Option<&str> {
        non_blank(self.github.token.as_deref())
    }

    /// Bot token and chat id, if both are configured.
    pub fn telegram_credentials(&self) -> Option<(&str, &str)> {
        Some((
            non_blank(self.telegram.token.as_deref())?,
            non_blank(self.telegram.chat_id.as_deref())?,
        ))
    }

    pub fn gate(&self) -> RateLimitGate {
        RateLimitGate::new(
            self.rate_limit.threshold,
            Duration::from_secs(self.rate_limit.max_wait_secs),
        )
    }

    /// Run options built from the configured sections.
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            taxonomy: self.taxonomy.clone(),
            max_queries: self.search.max_queries,
            watch_recent: self.search.watch_recent,
            follow_up_min_count: self.search.follow_up_min_count,
            follow_up_limit: self.search.follow_up_limit,
            partition: self.search.partition.clone(),
            paginator: self.search.paginator.clone(),
            gate: self.gate(),
            scan_activity: true,
            scan: self.scan.clone(),
            notify: self.notify.clone(),
            dry_run: false,
            today: None,
        }
    }
}

/// Map the variable names of older deployments onto config keys.
fn with_legacy_env<F>(
    builder: Builder<DefaultState>,
    lookup: F,
) -> Result<Builder<DefaultState>, config::ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let topic_id = lookup("TOPIC_ID").and_then(|v| match v.trim().parse::<i64>() {
        Ok(id) => Some(id),
        Err(_) => {
            tracing::warn!(value = %v, "TOPIC_ID is not a number, ignoring");
            None
        }
    });
    builder
        .set_override_option("github.token", lookup("GITHUB_TOKEN"))?
        .set_override_option("telegram.token", lookup("TELEGRAM_TOKEN"))?
        .set_override_option("telegram.chat_id", lookup("CHANNEL_ID"))?
        .set_override_option("telegram.thread_id", topic_id)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
