//! # Lazily started, shareable operation handle.
//!
//! [`TaskHandle`] wraps one operation instance and exposes the four things a
//! coordinating runner needs:
//!
//! - [`start`](TaskHandle::start): invoke the operation on a spawned driver task
//! - [`cancel`](TaskHandle::cancel): stop it (or make sure it never starts)
//! - [`join`](TaskHandle::join): wait for the outcome, from any number of callers
//! - [`on_complete`](TaskHandle::on_complete): run a callback when it finishes
//!
//! ## Lifecycle
//! ```text
//! lazy() ──► Pending ──start()──► Running ──► Done(outcome)
//!               │                    │
//!               └──cancel()──────────┴──────► Done(Err(Canceled))
//! ```
//!
//! ## Rules
//! - The operation is invoked at most once, and only by `start()`.
//! - Cancelling a pending handle completes it immediately without invoking the operation.
//! - Completion callbacks run exactly once, before any `join()` observes the outcome.
//!   A callback registered after completion runs immediately.
//! - Every `join()` caller receives a clone of the same outcome.
//! - If every `join()` caller goes away before completion, the handle cancels itself:
//!   nobody is left to use the result. Such a handle is *abandoned*: it refuses
//!   new waiters, so a late joiner never inherits a cancellation it did not ask for.
//! - A runner that installs a handle in its slot holds a waiter from creation
//!   (see `lazy_joined`), so the slot never holds a
//!   handle with zero waiters that is still expected to run.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::RunError;
use crate::events::{Bus, Event, EventKind};
use crate::operation::BoxOperation;
use crate::subscribers::panic_message;

/// Result delivered to everyone waiting on a handle.
pub type Outcome<T, E> = Result<T, RunError<E>>;

type Callback<T, E> = Box<dyn FnOnce(&Arc<TaskHandle<T, E>>, &Outcome<T, E>) + Send>;

/// Global id counter for handles.
static HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Waiter count of a handle whose last waiter left before completion.
const ABANDONED: usize = usize::MAX;

/// Mutable part of a handle, guarded by a short-lived mutex.
struct State<T, E> {
    /// Operation not yet invoked (`None` once started or cancelled).
    pending: Option<BoxOperation<T, E>>,
    /// Callbacks waiting for completion.
    callbacks: Vec<Callback<T, E>>,
    /// Final outcome, once known.
    outcome: Option<Outcome<T, E>>,
}

/// Handle around a single operation instance.
///
/// Always used behind an `Arc`: the runner slot, the driver task and every
/// waiter share the same handle, and slot identity is `Arc` identity.
pub struct TaskHandle<T, E> {
    id: u64,
    runner: Arc<str>,
    token: CancellationToken,
    state: Mutex<State<T, E>>,
    done: watch::Sender<Option<Outcome<T, E>>>,
    waiters: AtomicUsize,
    bus: Bus,
}

impl<T, E> TaskHandle<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + std::fmt::Display + 'static,
{
    /// Creates a handle that will run `op` once [`start`](Self::start)ed.
    ///
    /// `runner` and `bus` are used for event publishing only.
    pub fn lazy(op: BoxOperation<T, E>, runner: Arc<str>, bus: Bus) -> Arc<Self> {
        Self::build(op, runner, bus, 0)
    }

    /// Like [`lazy`](Self::lazy), with the creator already counted as a waiter.
    ///
    /// Dropping the returned [`Waiter`] before completion cancels the handle,
    /// unless someone else joined it in the meantime.
    pub(crate) fn lazy_joined(
        op: BoxOperation<T, E>,
        runner: Arc<str>,
        bus: Bus,
    ) -> (Arc<Self>, Waiter<T, E>) {
        let handle = Self::build(op, runner, bus, 1);
        let waiter = Waiter {
            handle: Arc::clone(&handle),
        };
        (handle, waiter)
    }

    fn build(op: BoxOperation<T, E>, runner: Arc<str>, bus: Bus, waiters: usize) -> Arc<Self> {
        let (done, _rx) = watch::channel(None);
        Arc::new(Self {
            id: HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            runner,
            token: CancellationToken::new(),
            state: Mutex::new(State {
                pending: Some(op),
                callbacks: Vec::new(),
                outcome: None,
            }),
            done,
            waiters: AtomicUsize::new(waiters),
            bus,
        })
    }

    /// Returns `true` once cancellation was requested.
    pub fn is_canceled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns `true` once the outcome is known.
    pub fn is_done(&self) -> bool {
        self.lock().outcome.is_some()
    }

    /// Returns `true` while the operation was neither started nor cancelled.
    pub fn is_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    /// Invokes the operation on a spawned driver task.
    ///
    /// Returns `false` if the handle was already started or cancelled.
    /// Must be called from within a tokio runtime.
    pub fn start(self: &Arc<Self>) -> bool {
        let Some(op) = self.lock().pending.take() else {
            return false;
        };

        self.bus.publish(self.event(EventKind::OpStarting));
        tracing::debug!(runner = %self.runner, op = self.id, "operation starting");

        let this = Arc::clone(self);
        let ctx = self.token.clone();
        tokio::spawn(async move {
            let fut = std::panic::AssertUnwindSafe(op.invoke(ctx.clone())).catch_unwind();
            let outcome = tokio::select! {
                biased;
                _ = ctx.cancelled() => Err(RunError::Canceled),
                res = fut => match res {
                    Ok(res) => res.map_err(RunError::Failed),
                    Err(panic) => Err(RunError::Panicked { reason: panic_message(&*panic) }),
                },
            };
            this.complete(outcome);
        });
        true
    }

    /// Requests cancellation.
    ///
    /// A pending handle completes with [`RunError::Canceled`] right away and its
    /// operation is dropped un-invoked. A running handle has its token fired and
    /// its future dropped by the driver; use [`cancel_and_join`](Self::cancel_and_join)
    /// to wait for that.
    pub fn cancel(self: &Arc<Self>) {
        self.token.cancel();
        let never_started = self.lock().pending.take();
        if let Some(op) = never_started {
            drop(op);
            self.complete(Err(RunError::Canceled));
        }
    }

    /// Cancels and waits until the handle has completed.
    ///
    /// On return the operation's future has been dropped and every completion
    /// callback has run. Does not count as a waiter.
    pub async fn cancel_and_join(self: &Arc<Self>) -> Outcome<T, E> {
        self.cancel();
        self.wait().await
    }

    /// Waits for the outcome.
    ///
    /// Any number of callers may join; each receives a clone of the same outcome.
    /// If this future is dropped before completion and it was the last waiter,
    /// the handle is cancelled. Joining an abandoned handle returns its
    /// (cancelled) outcome without counting as a waiter.
    pub async fn join(self: &Arc<Self>) -> Outcome<T, E> {
        match self.register_waiter() {
            Some(waiter) => waiter.join().await,
            None => self.wait().await,
        }
    }

    /// Counts the caller as a waiter, unless the handle was abandoned.
    pub(crate) fn register_waiter(self: &Arc<Self>) -> Option<Waiter<T, E>> {
        self.waiters
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n != ABANDONED).then(|| n + 1)
            })
            .ok()?;
        Some(Waiter {
            handle: Arc::clone(self),
        })
    }

    /// Drops one waiter; the last one leaving before completion abandons the handle.
    fn release_waiter(self: &Arc<Self>) {
        let done = self.is_done();
        let prev = self
            .waiters
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| match n {
                1 if !done => Some(ABANDONED),
                n => Some(n.saturating_sub(1)),
            });
        if prev == Ok(1) && !done {
            tracing::debug!(runner = %self.runner, op = self.id, "last waiter gone, cancelling");
            self.cancel();
        }
    }

    /// Registers a callback to run once the handle completes.
    ///
    /// Runs immediately (on the caller's thread) if the handle already completed.
    pub fn on_complete<F>(self: &Arc<Self>, f: F)
    where
        F: FnOnce(&Arc<TaskHandle<T, E>>, &Outcome<T, E>) + Send + 'static,
    {
        let mut st = self.lock();
        match &st.outcome {
            Some(outcome) => {
                let outcome = outcome.clone();
                drop(st);
                f(self, &outcome);
            }
            None => st.callbacks.push(Box::new(f)),
        }
    }

    async fn wait(&self) -> Outcome<T, E> {
        let mut rx = self.done.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or(Err(RunError::Canceled)),
            Err(_) => Err(RunError::Canceled),
        }
    }

    /// Records the outcome, runs callbacks, then wakes waiters. Idempotent.
    fn complete(self: &Arc<Self>, outcome: Outcome<T, E>) {
        let callbacks = {
            let mut st = self.lock();
            if st.outcome.is_some() {
                return;
            }
            st.outcome = Some(outcome.clone());
            std::mem::take(&mut st.callbacks)
        };

        match &outcome {
            Ok(_) => self.bus.publish(self.event(EventKind::OpCompleted)),
            Err(RunError::Canceled) => self.bus.publish(self.event(EventKind::OpCanceled)),
            Err(e) => self
                .bus
                .publish(self.event(EventKind::OpFailed).with_reason(e.as_message())),
        }
        tracing::debug!(
            runner = %self.runner,
            op = self.id,
            outcome = outcome.as_ref().map_or_else(RunError::as_label, |_| "op_completed"),
            "operation finished"
        );

        for cb in callbacks {
            cb(self, &outcome);
        }
        self.done.send_replace(Some(outcome));
    }

    fn event(&self, kind: EventKind) -> Event {
        Event::new(kind)
            .with_runner(Arc::clone(&self.runner))
            .with_op(self.id)
    }
}

impl<T, E> TaskHandle<T, E> {
    /// Process-unique handle id (also used as the event `op` id).
    pub fn id(&self) -> u64 {
        self.id
    }

    fn lock(&self) -> MutexGuard<'_, State<T, E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T, E> std::fmt::Debug for TaskHandle<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("runner", &self.runner)
            .field("canceled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// A counted `join()` caller of one handle.
///
/// Dropping it before the handle completes, as the last waiter, cancels the handle.
pub(crate) struct Waiter<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + std::fmt::Display + 'static,
{
    handle: Arc<TaskHandle<T, E>>,
}

impl<T, E> Waiter<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + std::fmt::Display + 'static,
{
    /// Waits for the outcome; the waiter is released when this future ends or is dropped.
    pub(crate) async fn join(self) -> Outcome<T, E> {
        self.handle.wait().await
    }
}

impl<T, E> Drop for Waiter<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + std::fmt::Display + 'static,
{
    fn drop(&mut self) {
        self.handle.release_waiter();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn handle_of<F, Fut>(f: F) -> Arc<TaskHandle<u32, String>>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<u32, String>> + Send + 'static,
    {
        TaskHandle::lazy(Box::new(f), Arc::from("test"), Bus::new(16))
    }

    #[tokio::test]
    async fn test_not_started_until_start() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let h = handle_of(move |_ctx| async move {
            flag.store(true, Ordering::SeqCst);
            Ok(5)
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!ran.load(Ordering::SeqCst));
        assert!(h.is_pending());

        assert!(h.start());
        assert!(!h.start());
        assert_eq!(h.join().await, Ok(5));
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_cancel_pending_never_invokes() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let h = handle_of(move |_ctx| async move {
            flag.store(true, Ordering::SeqCst);
            Ok(5)
        });

        h.cancel();
        assert!(h.is_done());
        assert!(!h.start());
        assert_eq!(h.join().await, Err(RunError::Canceled));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_cancel_running_fires_token() {
        let seen = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&seen);
        let (started_tx, started_rx) = oneshot::channel();
        let h = handle_of(move |ctx: CancellationToken| async move {
            let _ = started_tx.send(());
            let child = ctx.clone();
            tokio::spawn(async move {
                child.cancelled().await;
                flag.store(true, Ordering::SeqCst);
            });
            std::future::pending::<()>().await;
            Ok(0)
        });

        h.start();
        started_rx.await.unwrap();
        assert_eq!(h.cancel_and_join().await, Err(RunError::Canceled));
        assert!(h.is_canceled());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(seen.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_all_joiners_share_failure() {
        let h = handle_of(|_ctx| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Err("boom".to_string())
        });
        h.start();
        let (a, b) = tokio::join!(h.join(), h.join());
        assert_eq!(a, Err(RunError::Failed("boom".to_string())));
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_callbacks_run_before_joiners_wake() {
        let fired = Arc::new(AtomicBool::new(false));
        let h = handle_of(|_ctx| async { Ok(1) });
        let flag = Arc::clone(&fired);
        h.on_complete(move |_h, out| {
            assert_eq!(out, &Ok(1));
            flag.store(true, Ordering::SeqCst);
        });

        h.start();
        assert_eq!(h.join().await, Ok(1));
        assert!(fired.load(Ordering::SeqCst));

        let late = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&late);
        h.on_complete(move |_h, _out| flag.store(true, Ordering::SeqCst));
        assert!(late.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_panic_is_reported_to_joiners() {
        let h = handle_of(|_ctx| async {
            let boom = true;
            if boom {
                panic!("kaboom");
            }
            Ok(0)
        });
        h.start();
        match h.join().await {
            Err(RunError::Panicked { reason }) => assert_eq!(reason, "kaboom"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_last_waiter_leaving_cancels() {
        let h = handle_of(|_ctx| std::future::pending());
        h.start();

        let first = tokio::time::timeout(Duration::from_millis(10), h.join()).await;
        assert!(first.is_err());
        assert!(h.is_canceled());
        assert_eq!(h.join().await, Err(RunError::Canceled));
    }

    #[tokio::test]
    async fn test_abandoned_handle_refuses_waiters() {
        let h = handle_of(|_ctx| std::future::pending());
        let waiter = h.register_waiter();
        assert!(waiter.is_some());
        drop(waiter);

        assert!(h.is_done());
        assert!(h.register_waiter().is_none());
        assert_eq!(h.join().await, Err(RunError::Canceled));
    }

    #[tokio::test]
    async fn test_creator_waiter_outlives_departed_joiner() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let (h, creator) = TaskHandle::<u32, String>::lazy_joined(
            Box::new(move |_ctx: CancellationToken| async move {
                flag.store(true, Ordering::SeqCst);
                Ok(3)
            }),
            Arc::from("test"),
            Bus::new(16),
        );

        let gone = tokio::time::timeout(Duration::from_millis(1), h.join()).await;
        assert!(gone.is_err());
        assert!(!h.is_canceled());

        assert!(h.start());
        assert_eq!(creator.join().await, Ok(3));
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_early_leaver_does_not_cancel_shared_run() {
        let h = handle_of(|_ctx| async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(9)
        });
        h.start();

        let stay = tokio::spawn({
            let h = Arc::clone(&h);
            async move { h.join().await }
        });
        tokio::time::sleep(Duration::from_millis(5)).await;
        let leave = tokio::time::timeout(Duration::from_millis(5), h.join()).await;
        assert!(leave.is_err());
        assert!(!h.is_canceled());
        assert_eq!(stay.await.unwrap(), Ok(9));
    }
}
