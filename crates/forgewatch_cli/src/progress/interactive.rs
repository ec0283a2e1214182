use std::sync::Mutex;

use forgewatch::pipeline::RunProgress;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Bars for the phases seen so far.
#[derive(Default)]
struct ProgressState {
    /// Spinner for discovery; one message per query.
    search_bar: Option<ProgressBar>,
    /// Bar for the activity scan, created on the first batch.
    scan_bar: Option<ProgressBar>,
}

/// Interactive progress reporter using indicatif.
pub struct InteractiveReporter {
    multi: MultiProgress,
    state: Mutex<ProgressState>,
}

impl InteractiveReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            state: Mutex::new(ProgressState::default()),
        }
    }

    fn create_search_bar(&self) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(Self::spinner_style());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb.set_prefix(format!("{:10}", "Searching"));
        pb
    }

    fn create_scan_bar(&self, total: usize) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(total as u64));
        pb.set_style(Self::bar_style());
        pb.set_prefix(format!("{:10}", "Scanning"));
        pb
    }

    pub fn handle(&self, event: RunProgress) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        match event {
            RunProgress::Started { queries, dry_run } => {
                let pb = self.create_search_bar();
                let mode = if dry_run { " (dry run)" } else { "" };
                pb.set_message(format!("{} base queries{}", queries, mode));
                state.search_bar = Some(pb);
            }

            RunProgress::QueryStarted {
                index,
                total,
                query,
            } => {
                if let Some(ref pb) = state.search_bar {
                    pb.set_message(format!("[{}/{}] {}", index, total, query));
                }
            }

            RunProgress::QueryFinished {
                query, outcome, ..
            } => {
                if outcome.failed > 0 || outcome.rejected > 0 || outcome.overflowed > 0 {
                    let _ = self.multi.println(format!(
                        "⚠ {}: {} failed, {} rejected, {} over the window",
                        query, outcome.failed, outcome.rejected, outcome.overflowed
                    ));
                }
            }

            RunProgress::FollowUpsPlanned { count } => {
                if let Some(ref pb) = state.search_bar {
                    pb.set_message(format!("{} follow-up queries from topic pairs", count));
                }
            }

            RunProgress::DiscoveryComplete { found, new } => {
                if let Some(ref pb) = state.search_bar {
                    pb.finish_with_message(format!("✓ {} repositories, {} new", found, new));
                }
            }

            RunProgress::ScanBatch {
                scanned,
                total,
                events,
            } => {
                if state.scan_bar.is_none() {
                    state.scan_bar = Some(self.create_scan_bar(total));
                }
                if let Some(ref pb) = state.scan_bar {
                    pb.set_position(scanned as u64);
                    pb.set_message(format!("{} new events", events));
                }
            }

            RunProgress::NotifyComplete { report } => {
                if let Some(ref pb) = state.scan_bar
                    && !pb.is_finished()
                {
                    pb.finish();
                }
                let _ = self.multi.println(format!(
                    "✉ {} sent, {} failed, {} deferred, {} duplicates",
                    report.sent, report.failed, report.deferred, report.duplicates
                ));
            }

            RunProgress::RateLimitStop { resource } => {
                let _ = self.multi.println(format!(
                    "⏸ {} quota exhausted, stopping early; state is saved",
                    resource
                ));
            }

            RunProgress::Interrupted => {
                let _ = self.multi.println("⏹ Interrupted, saving state");
            }

            RunProgress::Finished { .. } => {
                for pb in [state.search_bar.take(), state.scan_bar.take()]
                    .into_iter()
                    .flatten()
                {
                    if !pb.is_finished() {
                        pb.abandon();
                    }
                }
            }

            _ => {}
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos:>4}/{len:4} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░")
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}
