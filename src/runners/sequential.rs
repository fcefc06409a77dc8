//! # Run operations one at a time, in submission order.
//!
//! [`SequentialRunner`] holds a single FIFO-fair async mutex. Every call waits
//! for the operations submitted before it, runs its own operation while
//! holding the lock, and releases the lock on every exit path.
//!
//! ## Event flow
//!
//! ```text
//! run_after_previous(op)
//!   ├─► publish OpQueued{ op = ticket }
//!   ├─► wait for lock (or caller cancellation ─► OpCanceled, op never invoked)
//!   ├─► publish OpStarting
//!   ├─► op.invoke(ctx)
//!   │       ├─ Ok   ─► OpCompleted
//!   │       ├─ Err  ─► OpFailed
//!   │       └─ caller cancelled ─► ctx fired, future dropped ─► OpCanceled
//!   └─► lock released
//! ```
//!
//! ## Rules
//! - At most one operation body runs per runner at any instant.
//! - Waiters are granted the lock in the order they asked for it (`tokio::sync::Mutex` is FIFO).
//! - A caller dropped while waiting leaves the queue without running its operation.
//! - A caller dropped while running fires the operation's token and drops its future.

use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::RunError;
use crate::events::{Bus, Event, EventKind};
use crate::operation::{BoxOperation, Operation, Outcome};

/// Serializes operations submitted by possibly concurrent callers.
///
/// ## Example
/// ```rust
/// use tokio_util::sync::CancellationToken;
/// use taskgate::SequentialRunner;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let saver = SequentialRunner::new("saver");
///
/// let user = saver
///     .run_after_previous(|_ctx: CancellationToken| async { Ok::<_, String>("user saved") })
///     .await;
/// let song = saver
///     .run_after_previous(|_ctx: CancellationToken| async { Ok::<_, String>("song saved") })
///     .await;
///
/// assert_eq!(user, Ok("user saved"));
/// assert_eq!(song, Ok("song saved"));
/// # }
/// ```
#[derive(Debug)]
pub struct SequentialRunner {
    name: Arc<str>,
    lock: Mutex<()>,
    tickets: AtomicU64,
    bus: Bus,
}

impl SequentialRunner {
    /// Creates a runner with its own (unobserved) event bus.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            lock: Mutex::new(()),
            tickets: AtomicU64::new(1),
            bus: Bus::default(),
        }
    }

    /// Publishes this runner's events on `bus`.
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = bus;
        self
    }

    /// Runner name used in events.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` while some operation holds the lock.
    pub fn is_busy(&self) -> bool {
        self.lock.try_lock().is_err()
    }

    /// Runs `op` after every previously submitted operation has finished.
    ///
    /// Cancel the call by dropping the returned future.
    pub async fn run_after_previous<T, E, O>(&self, op: O) -> Outcome<T, E>
    where
        O: Operation<T, E>,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        self.run_boxed(&CancellationToken::new(), Box::new(op)).await
    }

    /// Like [`run_after_previous`](Self::run_after_previous), with an explicit
    /// caller-side cancellation token.
    ///
    /// - Fired while waiting: the operation is never invoked, `Err(Canceled)`.
    /// - Fired while running: the operation's token is fired, its future is
    ///   dropped, `Err(Canceled)`.
    pub async fn run_after_previous_with<T, E, O>(
        &self,
        cancel: &CancellationToken,
        op: O,
    ) -> Outcome<T, E>
    where
        O: Operation<T, E>,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        self.run_boxed(cancel, Box::new(op)).await
    }

    pub(crate) async fn run_boxed<T, E>(
        &self,
        cancel: &CancellationToken,
        op: BoxOperation<T, E>,
    ) -> Outcome<T, E>
    where
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed);
        self.publish(EventKind::OpQueued, ticket);

        let guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            guard = self.lock.lock() => Some(guard),
        };
        let Some(_guard) = guard else {
            tracing::debug!(runner = %self.name, op = ticket, "cancelled while queued");
            self.publish(EventKind::OpCanceled, ticket);
            return Err(RunError::Canceled);
        };

        // Fired on every exit path, including the caller dropping this future.
        let ctx = cancel.child_token();
        let _fire_on_exit = ctx.clone().drop_guard();

        self.publish(EventKind::OpStarting, ticket);
        let res = tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(RunError::Canceled),
            res = op.invoke(ctx.clone()) => res.map_err(RunError::Failed),
        };

        match &res {
            Ok(_) => self.publish(EventKind::OpCompleted, ticket),
            Err(RunError::Canceled) => self.publish(EventKind::OpCanceled, ticket),
            Err(e) => self
                .bus
                .publish(self.event(EventKind::OpFailed, ticket).with_reason(e.as_message())),
        }
        res
    }

    fn publish(&self, kind: EventKind, ticket: u64) {
        self.bus.publish(self.event(kind, ticket));
    }

    fn event(&self, kind: EventKind, ticket: u64) -> Event {
        Event::new(kind)
            .with_runner(Arc::clone(&self.name))
            .with_op(ticket)
    }
}
