use std::path::PathBuf;

use clap::Subcommand;
use forgewatch::state::{PersistedState, StateStore};

use super::{OutputFormat, print_rows};
use super::run::state_store;
use crate::config::Config;

#[derive(Debug, Clone, Subcommand)]
pub(crate) enum StateAction {
    /// Show what the state file remembers
    Show {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Delete the state file; the next run starts from scratch
    Reset {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Debug, Clone, serde::Serialize, tabled::Tabled)]
pub(crate) struct StateRow {
    #[tabled(rename = "Property")]
    pub property: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

fn row(property: &str, value: impl ToString) -> StateRow {
    StateRow {
        property: property.to_string(),
        value: value.to_string(),
    }
}

pub(crate) fn state_rows(store: &StateStore, state: Option<&PersistedState>) -> Vec<StateRow> {
    let mut rows = vec![row("Path", store.path().display())];
    match state {
        None => rows.push(row("Status", "no state yet")),
        Some(state) => {
            rows.push(row("Schema version", state.schema_version));
            rows.push(row(
                "Saved at",
                state.saved_at.format("%Y-%m-%d %H:%M:%S UTC"),
            ));
            rows.push(row("Known repositories", state.known_repositories.len()));
            rows.push(row("Delivered events", state.delivered_events.len()));
            rows.push(row("Activity markers", state.markers.len()));
            rows.push(row("Scan offset", state.scan_offset));
        }
    }
    rows
}

pub(crate) fn handle_state(
    action: StateAction,
    state_flag: Option<PathBuf>,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = state_store(state_flag, config)?;
    match action {
        StateAction::Show { output } => {
            let state = store.load_persisted()?;
            print_rows(state_rows(&store, state.as_ref()), output)?;
        }
        StateAction::Reset { yes } => {
            if !yes {
                return Err(format!(
                    "Refusing to delete {} without --yes; every repository would be announced again",
                    store.path().display()
                )
                .into());
            }
            if store.reset()? {
                println!("Deleted {}", store.path().display());
            } else {
                println!("No state file at {}", store.path().display());
            }
        }
    }
    Ok(())
}
