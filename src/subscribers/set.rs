//! # Delivering runner events to subscribers.
//!
//! [`SubscriberSet`] gives each [`Subscribe`] implementation a private queue and
//! a worker, so `emit` only has to push into queues and never waits on
//! subscriber code.
//!
//! ```text
//! emit(event) ──┬─► queue ─► worker ─► log.on_event()
//!               └─► queue ─► worker ─► metrics.on_event()
//!                              └─ panic ─► SubscriberPanicked on the bus
//! ```
//!
//! - Each subscriber sees events in emit order; two subscribers are not kept in step.
//! - A full or closed queue loses the event for that subscriber and raises
//!   `SubscriberOverflow` on the bus (never for an overflow event itself).
//! - Panics are caught with `AssertUnwindSafe`, so a subscriber that panics while
//!   holding one of its own locks may leave that state half-updated.

use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::events::{Bus, Event, EventKind};
use crate::subscribers::Subscribe;

/// Queue feeding one subscriber's worker.
struct SubscriberChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Owns the queues and workers of a group of subscribers.
pub struct SubscriberSet {
    channels: Vec<SubscriberChannel>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Spawns a worker per subscriber; overflow and panic reports go to `bus`.
    ///
    /// Needs a running tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let mut channels = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let cap = sub.queue_capacity().max(1);
            let name = sub.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(cap);
            let reports = bus.clone();

            let worker = tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    let fut = sub.on_event(ev.as_ref());

                    if let Err(payload) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                        let info = panic_message(&*payload);
                        tracing::warn!(subscriber = sub.name(), %info, "subscriber panicked");
                        reports.publish(Event::subscriber_panicked(sub.name(), info));
                    }
                }
            });
            channels.push(SubscriberChannel { name, sender: tx });
            workers.push(worker);
        }
        Self {
            channels,
            workers,
            bus,
        }
    }

    /// Number of subscribers fed by this set.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns `true` if nobody is listening.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Queues `event` for every subscriber, sharing one clone between them.
    pub fn emit(&self, event: &Event) {
        self.emit_arc(Arc::new(event.clone()));
    }

    /// Queues an already shared event for every subscriber.
    pub fn emit_arc(&self, event: Arc<Event>) {
        let report = !matches!(event.kind, EventKind::SubscriberOverflow);

        for channel in &self.channels {
            let reason = match channel.sender.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            if report {
                self.bus
                    .publish(Event::subscriber_overflow(channel.name, reason));
            }
        }
    }

    /// Closes every queue and waits until the workers have handled what was
    /// already queued.
    pub async fn shutdown(self) {
        drop(self.channels);

        for h in self.workers {
            let _ = h.await;
        }
    }
}

/// Renders a panic payload as text.
pub(crate) fn panic_message(any: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = any.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = any.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    struct Recorder {
        seen: Mutex<Vec<EventKind>>,
        notify: Notify,
    }

    #[async_trait]
    impl Subscribe for Recorder {
        async fn on_event(&self, ev: &Event) {
            self.seen.lock().unwrap().push(ev.kind);
            self.notify.notify_one();
        }

        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    struct Panicky;

    #[async_trait]
    impl Subscribe for Panicky {
        async fn on_event(&self, _ev: &Event) {
            panic!("subscriber blew up");
        }

        fn name(&self) -> &'static str {
            "panicky"
        }
    }

    #[tokio::test]
    async fn test_emit_delivers_in_order() {
        let rec = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
            notify: Notify::new(),
        });
        let set = SubscriberSet::new(vec![rec.clone() as Arc<dyn Subscribe>], Bus::new(8));
        assert_eq!(set.len(), 1);

        set.emit(&Event::new(EventKind::OpQueued));
        set.emit(&Event::new(EventKind::OpStarting));
        set.shutdown().await;

        assert_eq!(
            *rec.seen.lock().unwrap(),
            vec![EventKind::OpQueued, EventKind::OpStarting]
        );
    }

    #[tokio::test]
    async fn test_panic_is_reported_on_bus() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        let set = SubscriberSet::new(vec![Arc::new(Panicky) as Arc<dyn Subscribe>], bus.clone());

        set.emit(&Event::new(EventKind::OpCompleted));

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::SubscriberPanicked);
        assert_eq!(ev.runner.as_deref(), Some("panicky"));
        assert_eq!(ev.reason.as_deref(), Some("subscriber blew up"));
        set.shutdown().await;
    }
}
