use std::path::PathBuf;
use std::sync::Arc;

use forgewatch::github::GitHubClient;
use forgewatch::notify::{DryRunMessenger, Messenger, TelegramMessenger};
use forgewatch::pipeline::{Pipeline, RunOptions};
use forgewatch::state::StateStore;

use crate::config::Config;
use crate::progress::ProgressReporter;
use crate::shutdown::is_shutdown_requested;

/// Flags of the `run` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub(crate) struct RunArgs {
    /// Search and scan, log messages instead of sending them, write no state
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Skip the release/commit/issue scan
    #[arg(long)]
    pub no_scan: bool,

    /// Cap on generated base queries (default from config or 50)
    #[arg(short = 'q', long)]
    pub max_queries: Option<usize>,

    /// State file (default from config or the XDG state directory)
    #[arg(short, long)]
    pub state: Option<PathBuf>,
}

/// Resolve the state file from the flag, then the config.
pub(crate) fn state_store(
    flag: Option<PathBuf>,
    config: &Config,
) -> Result<StateStore, Box<dyn std::error::Error>> {
    let path = flag
        .or_else(|| config.state_path())
        .ok_or("Could not determine a state file location; set [state] path")?;
    Ok(StateStore::new(path))
}

/// Apply command-line flags on top of the configured run options.
pub(crate) fn run_options(args: &RunArgs, config: &Config) -> RunOptions {
    let mut options = config.run_options();
    options.dry_run = args.dry_run;
    options.scan_activity = !args.no_scan;
    if let Some(max) = args.max_queries {
        options.max_queries = max;
    }
    options
}

/// Build the messenger. Sending for real needs Telegram credentials.
fn messenger(
    dry_run: bool,
    config: &Config,
) -> Result<Box<dyn Messenger>, Box<dyn std::error::Error>> {
    if dry_run {
        return Ok(Box::new(DryRunMessenger));
    }
    let (token, chat_id) = config.telegram_credentials().ok_or(
        "Telegram bot token and chat id are required \
         (set TELEGRAM_TOKEN and CHANNEL_ID, or use --dry-run)",
    )?;
    Ok(Box::new(TelegramMessenger::new(
        token,
        chat_id,
        config.telegram.thread_id,
    )?))
}

pub(crate) async fn handle_run(
    args: RunArgs,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let options = run_options(&args, config);
    let messenger = messenger(options.dry_run, config)?;
    let store = state_store(args.state, config)?;
    let ledger = store.load()?;

    if config.github_token().is_none() {
        tracing::warn!("No GitHub token configured, search quota is 10 requests per minute");
    }
    let client = GitHubClient::new(config.github_token())?;

    tracing::info!(
        state = %store.path().display(),
        known = ledger.known().len(),
        delivered = ledger.delivered().len(),
        "Loaded state"
    );

    let reporter = Arc::new(ProgressReporter::new());
    let callback = reporter.as_callback();

    let report = Pipeline::new(&client, messenger.as_ref(), options)
        .with_store(&store)
        .with_progress(&callback)
        .with_stop_check(&is_shutdown_requested)
        .run(ledger)
        .await?;

    let summary = &report.summary;
    if !console::Term::stdout().is_term() {
        return Ok(());
    }
    println!(
        "{} repositories found ({} new), {} events, {} messages sent{}",
        summary.repositories_found,
        summary.repositories_new,
        summary.events_detected,
        summary.notifications_sent,
        if summary.cut_short() {
            ", stopped early"
        } else {
            ""
        }
    );
    Ok(())
}
