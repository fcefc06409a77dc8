//! # Reacting to runner events.
//!
//! Implement [`Subscribe`] to watch what runners do with operations: when one
//! is queued behind another, when a replace cancels its predecessor, when a
//! caller joins an operation already in flight, when a slot is fought over.
//!
//! A subscriber is fed by its own worker through its own bounded queue (sized by
//! [`Subscribe::queue_capacity`]). When that queue is full the event is lost for
//! that subscriber alone and a `SubscriberOverflow` event is raised instead; a
//! panic inside `on_event` becomes a `SubscriberPanicked` event and the worker
//! moves on to the next event. Runners publish and forget, so even a stuck
//! subscriber cannot delay an operation.
//!
//! ## Example
//! ```rust
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use async_trait::async_trait;
//! use taskgate::{Subscribe, Event, EventKind};
//!
//! /// Counts how often duplicate requests were folded into one.
//! #[derive(Default)]
//! struct DedupCounter(AtomicU64);
//!
//! #[async_trait]
//! impl Subscribe for DedupCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::ActiveJoined {
//!             self.0.fetch_add(1, Ordering::Relaxed);
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "dedup-counter" }
//!     fn queue_capacity(&self) -> usize { 256 }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Receives every event published on a runner bus it was registered with.
///
/// `on_event` shares the executor with the runners: await I/O, never block, and
/// keep failures to yourself.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event. Events arrive in publish order.
    async fn on_event(&self, event: &Event);

    /// Label carried by overflow and panic events about this subscriber.
    ///
    /// Falls back to the full type path; a short name reads better in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// How many events may wait for this subscriber before new ones are dropped.
    ///
    /// Zero is treated as one. Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
