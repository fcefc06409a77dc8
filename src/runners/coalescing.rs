//! # One active operation per runner: cancel-and-replace or join-or-run.
//!
//! [`CoalescingRunner`] tracks at most one active operation in a single atomic
//! slot and offers two policies on top of it:
//!
//! - [`replace_active`](CoalescingRunner::replace_active): cancel whatever is
//!   active, then run this operation. Useful when a new request makes the old
//!   one irrelevant (re-sorting, re-filtering, search-as-you-type).
//! - [`join_active`](CoalescingRunner::join_active): if something is active,
//!   wait for it and return its result; otherwise run this operation. Useful to
//!   stop duplicate requests for the same resource from flooding the backend.
//!
//! ## Slot state machine
//! ```text
//!            CAS(None → h)                     h completes: CAS(h → None)
//!   EMPTY ─────────────────► OCCUPIED(h) ─────────────────────────────► EMPTY
//!                                 │
//!                                 └─ replace: cancel h, wait, then CAS(None → h2)
//! ```
//!
//! ## Rules
//! - The slot is only written by the two CAS transitions above; there is no other lock.
//! - A handle only ever clears the slot if it is still the occupant, so a stale
//!   completion never erases a newer operation.
//! - Handles are created un-started; a caller that loses the race drops (or
//!   cancels) its handle before the operation is ever invoked.
//! - Lost races are retried after `yield_now()`; they never surface as errors.
//! - `replace_active` always ends up running its own operation; `join_active`
//!   always ends up sharing the result of whichever operation is active.

use std::fmt::Display;
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::config::Config;
use crate::events::{Bus, Event, EventKind};
use crate::operation::{BoxOperation, Operation, Outcome, TaskHandle, Waiter};

/// Runner with a single active-operation slot.
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
/// use taskgate::CoalescingRunner;
///
/// # #[tokio::main]
/// # async fn main() {
/// let banner: CoalescingRunner<String, String> = CoalescingRunner::new("banner");
///
/// let fetch = |_ctx: CancellationToken| async {
///     tokio::time::sleep(Duration::from_millis(20)).await;
///     Ok::<_, String>("banner v1".to_string())
/// };
/// let duplicate = |_ctx: CancellationToken| async { Ok::<_, String>("never fetched".to_string()) };
///
/// let (a, b) = tokio::join!(banner.join_active(fetch), banner.join_active(duplicate));
/// assert_eq!(a, Ok("banner v1".to_string()));
/// assert_eq!(b, a);
/// # }
/// ```
pub struct CoalescingRunner<T, E> {
    name: Arc<str>,
    active: Arc<ArcSwapOption<TaskHandle<T, E>>>,
    bus: Bus,
    warn_after: Option<u32>,
}

impl<T, E> CoalescingRunner<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + Display + 'static,
{
    /// Creates an idle runner with default settings and its own (unobserved) bus.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        let cfg = Config::default();
        Self {
            name: name.into(),
            active: Arc::new(ArcSwapOption::empty()),
            bus: Bus::new(cfg.bus_capacity_clamped()),
            warn_after: cfg.contention_warn_threshold(),
        }
    }

    /// Applies `cfg` (contention warning threshold).
    pub fn with_config(mut self, cfg: &Config) -> Self {
        self.warn_after = cfg.contention_warn_threshold();
        self
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

    /// Returns `true` while an operation occupies the slot.
    pub fn is_active(&self) -> bool {
        self.active.load().is_some()
    }

    /// Id of the handle currently occupying the slot.
    pub fn active_id(&self) -> Option<u64> {
        self.active.load_full().map(|h| h.id())
    }

    /// Cancels any active operation, then runs `op` as the sole active operation.
    ///
    /// Returns `op`'s outcome, or `Err(Canceled)` if a later `replace_active`
    /// (or [`cancel_active`](Self::cancel_active)) cancelled it in turn.
    /// Dropping the returned future cancels `op` unless a `join_active` caller
    /// is also waiting on it.
    pub async fn replace_active<O>(&self, op: O) -> Outcome<T, E>
    where
        O: Operation<T, E>,
    {
        self.replace_boxed(Box::new(op)).await
    }

    /// Returns the active operation's outcome if there is one; otherwise runs `op`.
    ///
    /// Every caller that joins the same operation receives the same outcome,
    /// success or failure. `op` is only invoked if this call wins the slot.
    pub async fn join_active<O>(&self, op: O) -> Outcome<T, E>
    where
        O: Operation<T, E>,
    {
        self.join_boxed(Box::new(op)).await
    }

    /// Cancels the active operation (if any) and waits until it has stopped.
    ///
    /// Returns `false` if the slot was empty.
    pub async fn cancel_active(&self) -> bool {
        match self.active.load_full() {
            Some(current) => {
                self.publish(EventKind::ActiveReplaced, current.id());
                let _ = current.cancel_and_join().await;
                true
            }
            None => false,
        }
    }

    pub(crate) async fn replace_boxed(&self, op: BoxOperation<T, E>) -> Outcome<T, E> {
        if let Some(previous) = self.active.load_full() {
            self.publish(EventKind::ActiveReplaced, previous.id());
            let _ = previous.cancel_and_join().await;
        }

        let (handle, waiter) = self.lazy_handle(op);
        let mut lost = 0u32;
        loop {
            if self.try_install(&handle) {
                handle.start();
                return waiter.join().await;
            }

            lost += 1;
            self.contended(&handle, lost);
            if let Some(current) = self.active.load_full() {
                self.publish(EventKind::ActiveReplaced, current.id());
                let _ = current.cancel_and_join().await;
            }
            tokio::task::yield_now().await;
        }
    }

    pub(crate) async fn join_boxed(&self, op: BoxOperation<T, E>) -> Outcome<T, E> {
        if let Some(joined) = self.attach() {
            return joined.join().await;
        }

        let (handle, waiter) = self.lazy_handle(op);
        let mut lost = 0u32;
        loop {
            if self.try_install(&handle) {
                handle.start();
                return waiter.join().await;
            }

            if let Some(joined) = self.attach() {
                drop(waiter);
                return joined.join().await;
            }

            lost += 1;
            self.contended(&handle, lost);
            tokio::task::yield_now().await;
        }
    }

    /// Becomes a waiter of the current occupant.
    ///
    /// Returns `None` if the slot is empty or its occupant was abandoned by
    /// all of its waiters; such an occupant is already cancelled and about to
    /// leave the slot.
    fn attach(&self) -> Option<Waiter<T, E>> {
        let current = self.active.load_full()?;
        let waiter = current.register_waiter()?;
        self.publish(EventKind::ActiveJoined, current.id());
        Some(waiter)
    }

    /// Builds an un-started handle that clears the slot when it completes,
    /// but only while it is still the occupant.
    ///
    /// The caller is counted as a waiter before the handle can be installed,
    /// so joiners that come and go never leave it with zero waiters.
    fn lazy_handle(&self, op: BoxOperation<T, E>) -> (Arc<TaskHandle<T, E>>, Waiter<T, E>) {
        let (handle, waiter) = TaskHandle::lazy_joined(op, Arc::clone(&self.name), self.bus.clone());
        let slot = Arc::downgrade(&self.active);
        handle.on_complete(move |h, _outcome| {
            let Some(slot) = slot.upgrade() else {
                return;
            };
            let prev = slot.compare_and_swap(h, None::<Arc<TaskHandle<T, E>>>);
            let cleared = (*prev).as_ref().is_some_and(|p| Arc::ptr_eq(p, h));
            tracing::trace!(op = h.id(), cleared, "slot release");
        });
        (handle, waiter)
    }

    /// CAS(EMPTY → handle). Returns `true` if the handle is now the occupant.
    fn try_install(&self, handle: &Arc<TaskHandle<T, E>>) -> bool {
        let prev = self
            .active
            .compare_and_swap(&None::<Arc<TaskHandle<T, E>>>, Some(Arc::clone(handle)));
        prev.is_none()
    }

    fn contended(&self, handle: &TaskHandle<T, E>, lost: u32) {
        self.bus.publish(
            self.event(EventKind::SlotContended, handle.id())
                .with_attempt(lost),
        );
        tracing::trace!(runner = %self.name, op = handle.id(), lost, "lost slot race, retrying");
        if self.warn_after == Some(lost) {
            tracing::warn!(runner = %self.name, lost, "slot is heavily contended");
        }
    }

    fn publish(&self, kind: EventKind, op: u64) {
        self.bus.publish(self.event(kind, op));
    }

    fn event(&self, kind: EventKind, op: u64) -> Event {
        Event::new(kind)
            .with_runner(Arc::clone(&self.name))
            .with_op(op)
    }
}

impl<T, E> std::fmt::Debug for CoalescingRunner<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoalescingRunner")
            .field("name", &self.name)
            .field("active", &self.active.load_full().map(|h| h.id()))
            .finish()
    }
}
