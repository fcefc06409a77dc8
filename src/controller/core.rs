//! # Slot controller.
//!
//! Routes submissions to one runner per slot name:
//!
//! ```text
//! submit(spec) ──► slots[spec.slot]
//!                    ├─ Queue          ─► SequentialRunner::run_boxed
//!                    ├─ Replace        ─► CoalescingRunner::replace_boxed
//!                    └─ Join           ─► CoalescingRunner::join_boxed
//!
//! runners ── publish(Event) ──► Bus ──► listener ──► SubscriberSet::emit(&Event)
//! ```
//!
//! A slot is created by its first submission and keeps that runner kind for
//! the controller's lifetime.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    error::RunError,
    events::{Bus, Event},
    subscribers::SubscriberSet,
};

use super::{
    admission::Admission,
    builder::ControllerBuilder,
    config::ControllerConfig,
    error::{ControllerError, SubmitError},
    slot::{SlotRunner, SlotState},
    spec::ControllerSpec,
};

/// Controller manages named slots, each served by a runner chosen from its
/// first admission.
///
/// Operations in one slot never run in parallel; different slots are
/// independent.
pub struct Controller<T, E> {
    cfg: Config,
    bus: Bus,
    slots: RwLock<HashMap<String, SlotState<T, E>>>,
    token: CancellationToken,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl<T, E> Controller<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + Display + 'static,
{
    /// Returns a builder for a controller with the given configuration.
    pub fn builder(cfg: Config) -> ControllerBuilder<T, E> {
        ControllerBuilder::new(cfg)
    }

    pub(super) fn new_internal(
        cfg: Config,
        controller_cfg: ControllerConfig,
        bus: Bus,
        set: SubscriberSet,
    ) -> Arc<Self> {
        let token = CancellationToken::new();
        let listener = spawn_listener(set, bus.subscribe(), token.clone());

        Arc::new(Self {
            cfg,
            bus,
            slots: RwLock::new(HashMap::with_capacity(controller_cfg.slot_capacity)),
            token,
            listener: Mutex::new(Some(listener)),
        })
    }

    /// Runs `spec.op` in its slot according to `spec.admission`.
    ///
    /// - `Queue`: waits for every earlier `Queue` submission to the slot.
    /// - `Replace`: cancels the slot's active operation and runs this one.
    /// - `Join`: shares the active operation's result, or runs this one.
    ///
    /// Fails with [`ControllerError::PolicyMismatch`] when the slot was created
    /// by the other runner kind, and with [`ControllerError::Closed`] after
    /// [`shutdown`](Self::shutdown).
    pub async fn submit(&self, spec: ControllerSpec<T, E>) -> Result<T, SubmitError<E>> {
        if self.token.is_cancelled() {
            return Err(ControllerError::Closed.into());
        }

        let ControllerSpec { slot, admission, op } = spec;
        let runner = self.bind(&slot, admission).await?;

        let outcome = match runner {
            SlotRunner::Sequential(r) => r.run_boxed(&self.token, op).await,
            SlotRunner::Coalescing(r) => {
                let run = async {
                    match admission {
                        Admission::Replace => r.replace_boxed(op).await,
                        _ => r.join_boxed(op).await,
                    }
                };
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => Err(RunError::Canceled),
                    out = run => out,
                }
            }
        };
        outcome.map_err(SubmitError::from)
    }

    /// Cancels the active operation of a coalescing slot.
    ///
    /// Returns `false` for unknown slots, queueing slots and idle slots.
    pub async fn cancel_active(&self, slot: &str) -> bool {
        let runner = match self.slots.read().await.get(slot) {
            Some(state) => state.runner.clone(),
            None => return false,
        };
        match runner {
            SlotRunner::Coalescing(r) => r.cancel_active().await,
            SlotRunner::Sequential(_) => false,
        }
    }

    /// Returns the names of every slot created so far, sorted.
    pub async fn slots(&self) -> Vec<String> {
        let mut names: Vec<String> = self.slots.read().await.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Returns the event bus shared by every runner of this controller.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) was called.
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stops the controller.
    ///
    /// Rejects new submissions, cancels queued and running operations, then
    /// waits for subscribers to drain the events published so far.
    /// Calling it again is a no-op.
    pub async fn shutdown(&self) {
        self.token.cancel();

        let coalescing: Vec<_> = self
            .slots
            .read()
            .await
            .values()
            .filter_map(|state| match &state.runner {
                SlotRunner::Coalescing(r) => Some(Arc::clone(r)),
                SlotRunner::Sequential(_) => None,
            })
            .collect();
        for r in coalescing {
            r.cancel_active().await;
        }

        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(h) = listener {
            let _ = h.await;
        }
        tracing::debug!("controller shut down");
    }

    /// Returns the runner serving `slot`, creating the slot on first use.
    async fn bind(&self, slot: &str, admission: Admission) -> Result<SlotRunner<T, E>, ControllerError> {
        if let Some(state) = self.slots.read().await.get(slot) {
            return state.serve(slot, admission);
        }

        let mut slots = self.slots.write().await;
        let state = slots.entry(slot.to_owned()).or_insert_with(|| {
            tracing::debug!(slot, ?admission, "slot created");
            SlotState::new(slot, admission, &self.cfg, &self.bus)
        });
        state.serve(slot, admission)
    }
}

impl<T, E> Drop for Controller<T, E> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl<T, E> std::fmt::Debug for Controller<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("closed", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Forwards bus events to the subscriber set until the token fires, then
/// drains what is already buffered and shuts the set down.
fn spawn_listener(
    set: SubscriberSet,
    mut rx: broadcast::Receiver<Event>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                msg = rx.recv() => match msg {
                    Ok(ev) => forward(&set, &ev),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "controller listener lagged");
                        continue;
                    }
                }
            }
        }

        loop {
            match rx.try_recv() {
                Ok(ev) => forward(&set, &ev),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        set.shutdown().await;
    })
}

/// Overflow reports stay out of the subscriber queues: a full queue would
/// otherwise report its own overflow forever.
fn forward(set: &SubscriberSet, ev: &Event) {
    if ev.is_subscriber_overflow() {
        tracing::warn!(reason = ?ev.reason, "subscriber dropped an event");
        return;
    }
    set.emit(ev);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::subscribers::Subscribe;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    type Ctl = Arc<Controller<u32, String>>;

    fn controller() -> Ctl {
        Controller::builder(Config::default()).build()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_queue_slot_never_overlaps() {
        let ctl = controller();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut calls = Vec::new();
        for i in 0..6u32 {
            let ctl = Arc::clone(&ctl);
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            calls.push(tokio::spawn(async move {
                ctl.submit(ControllerSpec::queue("save", move |_ctx: CancellationToken| async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(i)
                }))
                .await
            }));
        }
        for (i, call) in calls.into_iter().enumerate() {
            assert_eq!(call.await.unwrap(), Ok(i as u32));
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_join_slot_shares_result() {
        let ctl = controller();
        let invoked = Arc::new(AtomicUsize::new(0));

        let first = {
            let ctl = Arc::clone(&ctl);
            let invoked = Arc::clone(&invoked);
            tokio::spawn(async move {
                ctl.submit(ControllerSpec::join("banner", move |_ctx: CancellationToken| async move {
                    invoked.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(1)
                }))
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let again = Arc::clone(&invoked);
        let second = ctl
            .submit(ControllerSpec::join("banner", move |_ctx: CancellationToken| async move {
                again.fetch_add(1, Ordering::SeqCst);
                Ok(2)
            }))
            .await;

        assert_eq!(second, Ok(1));
        assert_eq!(first.await.unwrap(), Ok(1));
        assert_eq!(invoked.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_replace_slot_cancels_previous() {
        let ctl = controller();

        let first = {
            let ctl = Arc::clone(&ctl);
            tokio::spawn(async move {
                ctl.submit(ControllerSpec::replace("sort", |ctx: CancellationToken| async move {
                    ctx.cancelled().await;
                    Ok(1)
                }))
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = ctl
            .submit(ControllerSpec::replace("sort", |_ctx: CancellationToken| async { Ok(2) }))
            .await;

        assert_eq!(second, Ok(2));
        assert_eq!(first.await.unwrap(), Err(SubmitError::Run(RunError::Canceled)));
    }

    #[tokio::test]
    async fn test_slot_keeps_its_runner_kind() {
        let ctl = controller();
        let ok = ctl
            .submit(ControllerSpec::queue("user", |_ctx: CancellationToken| async { Ok(1) }))
            .await;
        assert_eq!(ok, Ok(1));

        let err = ctl
            .submit(ControllerSpec::join("user", |_ctx: CancellationToken| async { Ok(2) }))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SubmitError::Controller(ControllerError::PolicyMismatch {
                slot: "user".into(),
                registered: Admission::Queue,
                requested: Admission::Join,
            })
        );
        assert_eq!(ctl.slots().await, vec!["user".to_string()]);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_and_cancels() {
        let ctl = controller();

        let running = {
            let ctl = Arc::clone(&ctl);
            tokio::spawn(async move {
                ctl.submit(ControllerSpec::join("feed", |ctx: CancellationToken| async move {
                    ctx.cancelled().await;
                    Ok(1)
                }))
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        ctl.shutdown().await;
        assert!(ctl.is_closed());
        assert_eq!(running.await.unwrap(), Err(SubmitError::Run(RunError::Canceled)));

        let rejected = ctl
            .submit(ControllerSpec::queue("feed2", |_ctx: CancellationToken| async { Ok(1) }))
            .await;
        assert_eq!(rejected, Err(SubmitError::Controller(ControllerError::Closed)));

        ctl.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancel_active_on_unknown_slot() {
        let ctl = controller();
        assert!(!ctl.cancel_active("nope").await);
    }

    struct Recorder {
        seen: std::sync::Mutex<Vec<EventKind>>,
    }

    #[async_trait]
    impl Subscribe for Recorder {
        async fn on_event(&self, ev: &Event) {
            self.seen.lock().unwrap().push(ev.kind);
        }
    }

    #[tokio::test]
    async fn test_subscribers_see_runner_events() {
        let rec = Arc::new(Recorder {
            seen: std::sync::Mutex::new(Vec::new()),
        });
        let ctl: Ctl = Controller::builder(Config::default())
            .with_subscribers(vec![rec.clone() as Arc<dyn Subscribe>])
            .build();

        let out = ctl
            .submit(ControllerSpec::queue("save", |_ctx: CancellationToken| async { Ok(7) }))
            .await;
        assert_eq!(out, Ok(7));
        ctl.shutdown().await;

        let seen = rec.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![EventKind::OpQueued, EventKind::OpStarting, EventKind::OpCompleted]
        );
    }
}
