//! # Runtime events emitted by the runners.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Operation lifecycle**: queued, starting, completed, failed, cancelled
//! - **Slot coordination**: replace, join, lost CAS races
//! - **Subscriber health**: overflow, panic
//!
//! The [`Event`] struct carries additional metadata such as timestamps, runner
//! name, operation id and reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use taskgate::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::OpFailed)
//!     .with_runner("banner")
//!     .with_op(7)
//!     .with_reason("boom");
//!
//! assert_eq!(ev.kind, EventKind::OpFailed);
//! assert_eq!(ev.runner.as_deref(), Some("banner"));
//! assert_eq!(ev.op, Some(7));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `runner`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `runner`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Operation lifecycle ===
    /// Caller is waiting for its turn on a sequential runner.
    ///
    /// Sets:
    /// - `runner`: runner name
    /// - `op`: ticket number (submission order)
    OpQueued,

    /// Operation body is about to run.
    ///
    /// Sets:
    /// - `runner`: runner name
    /// - `op`: ticket or handle id
    OpStarting,

    /// Operation finished with a value.
    ///
    /// Sets:
    /// - `runner`, `op`
    OpCompleted,

    /// Operation finished with its own error (or panicked).
    ///
    /// Sets:
    /// - `runner`, `op`
    /// - `reason`: error message
    OpFailed,

    /// Operation (or its waiting caller) was cancelled.
    ///
    /// Sets:
    /// - `runner`, `op`
    OpCanceled,

    // === Slot coordination ===
    /// A replacing call is cancelling the active operation.
    ///
    /// Sets:
    /// - `runner`: runner name
    /// - `op`: id of the operation being cancelled
    ActiveReplaced,

    /// A joining call attached to the active operation instead of starting its own.
    ///
    /// Sets:
    /// - `runner`: runner name
    /// - `op`: id of the joined operation
    ActiveJoined,

    /// A call lost the race for an empty slot and will retry.
    ///
    /// Sets:
    /// - `runner`: runner name
    /// - `op`: id of the losing (never started) operation
    /// - `attempt`: number of races lost so far in this call
    SlotContended,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,

    /// Event classification.
    pub kind: EventKind,
    /// Name of the runner (or subscriber), if applicable.
    pub runner: Option<Arc<str>>,
    /// Operation id: a handle id or a sequential ticket.
    pub op: Option<u64>,
    /// Attempt count (starting from 1).
    pub attempt: Option<u32>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            runner: None,
            op: None,
            attempt: None,
            reason: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a runner name.
    #[inline]
    pub fn with_runner(mut self, runner: impl Into<Arc<str>>) -> Self {
        self.runner = Some(runner.into());
        self
    }

    /// Attaches an operation id.
    #[inline]
    pub fn with_op(mut self, id: u64) -> Self {
        self.op = Some(id);
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_runner(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_runner(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    /// Returns `true` for events that end an operation.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            EventKind::OpCompleted | EventKind::OpFailed | EventKind::OpCanceled
        )
    }
}
