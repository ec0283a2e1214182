//! Forgewatch CLI - polls GitHub topic search and announces what is new.

mod commands;
mod config;
mod progress;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::Term;
use tracing_subscriber::EnvFilter;

use crate::commands::OutputFormat;
use crate::commands::run::RunArgs;
use crate::commands::state::StateAction;

#[derive(Parser)]
#[command(name = "forgewatch")]
#[command(version)]
#[command(about = "Exhaustive GitHub topic search with Telegram notifications")]
#[command(
    long_about = "Forgewatch runs a family of topic searches against GitHub, slicing each \
one by creation date until every slice fits under the 1000-result search window. \
New repositories, and new releases, commits and issues of known ones, are posted \
to a Telegram chat. A local state file makes every item announced exactly once."
)]
#[command(after_long_help = r#"EXAMPLES
    Run once (e.g. from cron):
        $ forgewatch run

    See what a run would find without sending or saving anything:
        $ forgewatch run --dry-run

    Discovery only, fewer queries:
        $ forgewatch run --no-scan --max-queries 10

    List the generated base queries:
        $ forgewatch plan

    Check the remaining search quota:
        $ forgewatch limits

CONFIGURATION
    Forgewatch reads configuration from:
      1. ~/.config/forgewatch/config.toml (or $XDG_CONFIG_HOME/forgewatch/config.toml)
      2. ./forgewatch.toml
      3. Environment variables (FORGEWATCH_ prefix, __ between sections,
         e.g. FORGEWATCH_NOTIFY__MAX_PER_RUN)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    GITHUB_TOKEN      GitHub personal access token
    TELEGRAM_TOKEN    Telegram bot token
    CHANNEL_ID        Telegram chat to post into (@name or numeric id)
    TOPIC_ID          Forum topic id within the chat (optional)
"#)]
pub(crate) struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search, scan and notify once
    Run(RunArgs),
    /// Print the base queries a run would start with
    Plan {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Show current GitHub rate limit status
    Limits {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Inspect or reset the state file
    State {
        #[command(subcommand)]
        action: StateAction,

        /// State file (default from config or the XDG state directory)
        #[arg(short, long, global = true)]
        state: Option<PathBuf>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
    /// Generate man page(s)
    Man {
        /// Output directory for man pages (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Set up graceful shutdown handler (Ctrl+C)
    shutdown::setup_shutdown_handler();

    // Structured logging when not on a TTY. On a TTY the progress bars carry
    // the run, so only warnings and dry-run messages are logged.
    let is_tty = Term::stdout().is_term();
    let default_filter = if is_tty {
        "forgewatch=warn,forgewatch_cli=warn,forgewatch::dry_run=info"
    } else {
        "forgewatch=info,forgewatch_cli=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Handle commands that don't need configuration first
    match &cli.command {
        Commands::Completions { shell } => {
            commands::meta::handle_completions(*shell)?;
            return Ok(());
        }
        Commands::Man { output } => {
            commands::meta::handle_man(output.clone())?;
            return Ok(());
        }
        _ => {}
    }

    // Load configuration (config file -> env vars -> defaults)
    let config = config::Config::load();

    match cli.command {
        Commands::Run(args) => {
            commands::run::handle_run(args, &config).await?;
        }
        Commands::Plan { output } => {
            commands::plan::handle_plan(&config.run_options(), output)?;
        }
        Commands::Limits { output } => {
            commands::limits::handle_limits(output, &config).await?;
        }
        Commands::State { action, state } => {
            commands::state::handle_state(action, state, &config)?;
        }
        Commands::Completions { .. } | Commands::Man { .. } => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::parse_from([
            "forgewatch",
            "run",
            "--dry-run",
            "--no-scan",
            "--max-queries",
            "5",
            "--state",
            "/tmp/s.json",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(args.dry_run);
        assert!(args.no_scan);
        assert_eq!(args.max_queries, Some(5));
        assert_eq!(args.state, Some(PathBuf::from("/tmp/s.json")));
    }

    #[test]
    fn state_reset_parses() {
        let cli = Cli::parse_from(["forgewatch", "state", "reset", "--yes"]);
        assert!(matches!(
            cli.command,
            Commands::State {
                action: StateAction::Reset { yes: true },
                state: None
            }
        ));
    }
}
