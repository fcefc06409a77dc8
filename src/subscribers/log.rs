//! # LogWriter: events rendered through `tracing`
//!
//! A minimal subscriber that turns every [`Event`] into one `tracing` record
//! under the `taskgate::events` target. Install any `tracing` subscriber to see them.
//!
//! ## Example output (with `tracing_subscriber::fmt`)
//! ```text
//! INFO taskgate::events: starting runner="banner" op=3
//! INFO taskgate::events: joined runner="banner" op=3
//! WARN taskgate::events: failed runner="banner" op=3 err="connection refused"
//! INFO taskgate::events: replaced runner="sort" op=4
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let runner = e.runner.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::OpQueued => {
                tracing::debug!(target: "taskgate::events", runner, op = ?e.op, "queued");
            }
            EventKind::OpStarting => {
                tracing::info!(target: "taskgate::events", runner, op = ?e.op, "starting");
            }
            EventKind::OpCompleted => {
                tracing::info!(target: "taskgate::events", runner, op = ?e.op, "completed");
            }
            EventKind::OpFailed => {
                tracing::warn!(target: "taskgate::events", runner, op = ?e.op, err = reason, "failed");
            }
            EventKind::OpCanceled => {
                tracing::info!(target: "taskgate::events", runner, op = ?e.op, "cancelled");
            }
            EventKind::ActiveReplaced => {
                tracing::info!(target: "taskgate::events", runner, op = ?e.op, "replaced");
            }
            EventKind::ActiveJoined => {
                tracing::info!(target: "taskgate::events", runner, op = ?e.op, "joined");
            }
            EventKind::SlotContended => {
                tracing::debug!(
                    target: "taskgate::events",
                    runner,
                    op = ?e.op,
                    attempt = ?e.attempt,
                    "slot contended"
                );
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(target: "taskgate::events", subscriber = runner, reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                tracing::error!(target: "taskgate::events", subscriber = runner, info = reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
