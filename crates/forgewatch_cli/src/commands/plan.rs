use chrono::NaiveDate;
use forgewatch::pipeline::RunOptions;

use super::{OutputFormat, print_rows};

/// One base query as it would run.
#[derive(Debug, Clone, serde::Serialize, tabled::Tabled)]
pub(crate) struct PlannedQuery {
    #[tabled(rename = "#")]
    pub index: usize,
    #[tabled(rename = "Query")]
    pub query: String,
}

pub(crate) fn planned_queries(options: &RunOptions, today: NaiveDate) -> Vec<PlannedQuery> {
    let options = RunOptions {
        today: Some(today),
        ..options.clone()
    };
    options
        .base_queries()
        .into_iter()
        .enumerate()
        .map(|(i, query)| PlannedQuery {
            index: i + 1,
            query,
        })
        .collect()
}

/// Print the base queries a run would start with. Follow-up queries depend
/// on what the run finds and are not listed.
pub(crate) fn handle_plan(
    options: &RunOptions,
    output: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let rows = planned_queries(options, chrono::Utc::now().date_naive());
    print_rows(rows, output)?;
    Ok(())
}
