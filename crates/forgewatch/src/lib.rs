//! Forgewatch - exhaustive GitHub topic search with change notifications.
//!
//! The search API caps every query at 1000 results. Forgewatch works around
//! the cap by partitioning each base query into creation-date slices (and
//! size, star and language slices as a fallback), drains every slice page by
//! page, deduplicates the union, and remembers what it has already announced
//! in a persistent [`Ledger`]. Known repositories are then scanned for new
//! releases, commits and issues, and everything new is posted to Telegram.
//!
//! # Example
//!
//! ```ignore
//! use forgewatch::github::GitHubClient;
//! use forgewatch::notify::TelegramMessenger;
//! use forgewatch::pipeline::{Pipeline, RunOptions};
//! use forgewatch::state::StateStore;
//!
//! let client = GitHubClient::new(Some(&github_token))?;
//! let messenger = TelegramMessenger::new(&bot_token, "@channel", None)?;
//! let store = StateStore::new("state.json");
//!
//! let ledger = store.load()?;
//! let report = Pipeline::new(&client, &messenger, RunOptions::default())
//!     .with_store(&store)
//!     .run(ledger)
//!     .await?;
//! println!("{} new repositories", report.summary.repositories_new);
//! ```

pub mod activity;
pub mod github;
pub mod http;
pub mod ledger;
pub mod model;
pub mod notify;
pub mod pipeline;
pub mod platform;
pub mod search;
pub mod state;
pub mod taxonomy;

pub use activity::{ActivityEvent, ScanOptions, Scanner};
pub use ledger::{ActivityMarker, EventId, EventKind, Frontier, Ledger};
pub use model::{RepoId, RepoSummary};
pub use notify::{Messenger, Notification, Notifier, NotifyError, NotifyOptions};
pub use pipeline::{Pipeline, PipelineError, RunOptions, RunProgress, RunReport, RunSummary};
pub use platform::{ForgeClient, PlatformError, RateLimitGate};
pub use state::{StateError, StateStore};
pub use taxonomy::Taxonomy;
