//! Outgoing notifications: formatting, pacing and delivery bookkeeping.

pub mod format;
pub mod telegram;

use std::time::Duration as StdDuration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::activity::ActivityEvent;
use crate::ledger::{EventId, Ledger};
use crate::model::RepoSummary;
use crate::platform::Pacer;

pub use format::{escape_html, render};
pub use telegram::TelegramMessenger;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("message transport error: {0}")]
    Transport(String),

    #[error("could not encode message: {0}")]
    Encode(String),

    #[error("message rejected ({status}): {description}")]
    Rejected { status: u16, description: String },
}

/// Something that can post a rendered message.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), NotifyError>;
}

/// Logs messages instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunMessenger;

#[async_trait]
impl Messenger for DryRunMessenger {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        tracing::info!(target: "forgewatch::dry_run", "Would send:\n{}", text);
        Ok(())
    }
}

/// One item to announce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    NewRepository(RepoSummary),
    Activity(ActivityEvent),
}

impl Notification {
    pub fn event_id(&self) -> EventId {
        match self {
            Notification::NewRepository(repo) => EventId::repository(repo.id.clone()),
            Notification::Activity(event) => event.event_id(),
        }
    }

    /// Record this item as handled: mark it delivered and, for activity,
    /// move the repository's marker to its version.
    fn settle(&self, ledger: &mut Ledger) -> bool {
        if let Notification::Activity(event) = self {
            ledger.set_marker(event.repo(), event.kind(), &event.version());
        }
        ledger.mark_delivered(self.event_id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyOptions {
    /// Most messages attempted in one run.
    pub max_per_run: usize,
    /// Minimum spacing between sends, in milliseconds.
    pub delay_ms: u64,
}

impl Default for NotifyOptions {
    fn default() -> Self {
        Self {
            max_per_run: 25,
            delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub sent: usize,
    pub failed: usize,
    /// Items already in the delivered set, skipped without sending.
    pub duplicates: usize,
    /// Items left for a later run because the cap was reached.
    pub deferred: usize,
}

/// Sends notifications one by one with fixed pacing and a per-run cap.
///
/// There are no retries. A failed send is still marked delivered so a
/// flaky chat never produces duplicates; deferred items are left untouched
/// and come back next run.
#[derive(Debug)]
pub struct Notifier {
    options: NotifyOptions,
    pacer: Pacer,
}

impl Notifier {
    pub fn new(options: NotifyOptions) -> Self {
        let pacer = Pacer::new(StdDuration::from_millis(options.delay_ms));
        Self { options, pacer }
    }

    pub fn options(&self) -> &NotifyOptions {
        &self.options
    }

    /// Deliver `items` in order, recording the outcome in `ledger`.
    pub async fn deliver<M>(
        &mut self,
        messenger: &M,
        items: Vec<Notification>,
        ledger: &mut Ledger,
    ) -> DeliveryReport
    where
        M: Messenger + ?Sized,
    {
        let mut report = DeliveryReport::default();
        let mut attempted = 0usize;

        for item in items {
            let id = item.event_id();
            if ledger.is_delivered(&id) {
                report.duplicates += 1;
                item.settle(ledger);
                continue;
            }
            if attempted >= self.options.max_per_run {
                report.deferred += 1;
                continue;
            }

            attempted += 1;
            self.pacer.pace().await;
            let text = render(&item);
            match messenger.send(&text).await {
                Ok(()) => {
                    report.sent += 1;
                    tracing::debug!(event = %id, "Notification sent");
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(event = %id, error = %e, "Notification failed, not retrying");
                }
            }
            if !item.settle(ledger) {
                tracing::error!(event = %id, "Event was delivered twice");
            }
        }

        if report.deferred > 0 {
            tracing::info!(
                deferred = report.deferred,
                cap = self.options.max_per_run,
                "Notification cap reached, remaining items deferred to next run"
            );
        }
        report
    }
}
