//! Progress reporting for poller runs.
//!
//! Two modes, picked by whether stdout is a terminal:
//! - Interactive mode (TTY): a search spinner and a scan bar using indicatif
//! - Logging mode (non-TTY): structured logging using tracing

mod interactive;
mod logging;

use std::sync::Arc;

use console::Term;
use forgewatch::pipeline::{ProgressCallback, RunProgress};

pub use interactive::InteractiveReporter;
pub use logging::LoggingReporter;

/// Progress reporter that handles both interactive and logging modes.
pub enum ProgressReporter {
    /// Interactive progress bars for TTY.
    Interactive(InteractiveReporter),
    /// Structured logging for non-TTY (cron, CI, pipes).
    Logging(LoggingReporter),
}

impl ProgressReporter {
    /// Create a new progress reporter, auto-detecting TTY mode.
    pub fn new() -> Self {
        if Term::stdout().is_term() {
            Self::Interactive(InteractiveReporter::new())
        } else {
            Self::Logging(LoggingReporter::new())
        }
    }

    pub fn handle(&self, event: RunProgress) {
        match self {
            Self::Interactive(r) => r.handle(event),
            Self::Logging(r) => r.handle(event),
        }
    }

    /// Convert to a callback for the pipeline.
    pub fn as_callback(self: &Arc<Self>) -> ProgressCallback {
        let reporter = Arc::clone(self);
        Box::new(move |event| {
            reporter.handle(event);
        })
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use forgewatch::pipeline::RunSummary;

    use super::*;

    fn events() -> Vec<RunProgress> {
        vec![
            RunProgress::Started {
                queries: 2,
                dry_run: true,
            },
            RunProgress::QueryStarted {
                index: 1,
                total: 2,
                query: "topic:flipperzero archived:false".to_string(),
            },
            RunProgress::DiscoveryComplete { found: 4, new: 1 },
            RunProgress::ScanBatch {
                scanned: 4,
                total: 4,
                events: 0,
            },
            RunProgress::Interrupted,
            RunProgress::Finished {
                summary: RunSummary::default(),
            },
        ]
    }

    #[test]
    fn logging_reporter_accepts_every_phase() {
        let reporter = Arc::new(ProgressReporter::Logging(LoggingReporter::new()));
        let callback = reporter.as_callback();
        for event in events() {
            callback(event);
        }
    }

    #[test]
    fn interactive_reporter_accepts_every_phase() {
        let reporter = InteractiveReporter::new();
        for event in events() {
            reporter.handle(event);
        }
    }
}
