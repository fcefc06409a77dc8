//! # taskgate
//!
//! **Taskgate** coordinates async operations that target the same logical
//! resource (a query, a document, an API client) when several callers ask
//! for it at once.
//!
//! Two runners cover the usual collisions:
//! - [`SequentialRunner`]: run one at a time in submission order.
//! - [`CoalescingRunner`]: keep at most one active operation, and either
//!   replace it with the newest request or let the newcomer share its result.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   caller A          caller B          caller C
//!      │                 │                 │
//!      ▼                 ▼                 ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │  Controller (optional, feature "controller")                  │
//! │  - slots: name ─► runner chosen by first Admission            │
//! └──────┬───────────────────────────────────────────┬────────────┘
//!        ▼                                           ▼
//! ┌──────────────────────┐             ┌──────────────────────────┐
//! │  SequentialRunner    │             │  CoalescingRunner        │
//! │  FIFO async mutex    │             │  CAS slot (ArcSwapOption)│
//! │  one op at a time    │             │  replace / join          │
//! └──────┬───────────────┘             └──────┬───────────────────┘
//!        │                                    ▼
//!        │                             ┌──────────────────────────┐
//!        │                             │  TaskHandle (lazy start, │
//!        │                             │  shared result, cancel)  │
//!        │                             └──────┬───────────────────┘
//!        │ Publishes Events:                  │ Publishes Events:
//!        │ - OpQueued / OpStarting            │ - ActiveReplaced / ActiveJoined
//!        │ - OpCompleted / OpFailed           │ - SlotContended
//!        ▼                                    ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │                   Bus (broadcast channel)                     │
//! │                 (capacity: Config::bus_capacity)              │
//! └──────────────────────────────┬────────────────────────────────┘
//!                                ▼
//!                    ┌────────────────────────┐
//!                    │   controller listener  │
//!                    └───────────┬────────────┘
//!                                ▼
//!                          SubscriberSet
//!                         (per-sub queues)
//!                     ┌──────────┼──────────┐
//!                     ▼          ▼          ▼
//!                  worker1    worker2    workerN
//! ```
//!
//! ### Coalescing lifecycle
//! ```text
//! replace_active(op)                     join_active(op)
//!   ├─► h = TaskHandle::lazy(op)           ├─► occupant? ─► join it
//!   └─ loop {                              ├─► h = TaskHandle::lazy(op)
//!        CAS(None ─► h)                    └─ loop {
//!          ├─ won  ─► start h, join h           CAS(None ─► h)
//!          └─ lost ─► cancel occupant,            ├─ won  ─► start h, join h
//!                     yield, retry                └─ lost ─► occupant? ─► cancel h, join it
//!      }                                                     else yield, retry
//!                                             }
//! h completes ─► CAS(h ─► None)   (no-op if a newer handle holds the slot)
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                           |
//! |-------------------|--------------------------------------------------------------|----------------------------------------------|
//! | **Runners**       | Serialize, replace or join concurrent operations.            | [`SequentialRunner`], [`CoalescingRunner`]   |
//! | **Operations**    | One-shot cancelable async work, lazily started handles.      | [`Operation`], [`TaskHandle`]                |
//! | **Subscriber API**| Hook into runner events (logging, metrics, custom handlers). | [`Subscribe`], [`SubscriberSet`], [`Bus`]    |
//! | **Errors**        | Typed outcome of a call that produced no value.              | [`RunError`]                                 |
//! | **Configuration** | Bus capacity and contention diagnostics.                     | [`Config`]                                   |
//!
//! ## Optional features
//! - `controller` _(default)_: slot registry with per-submission admission policies.
//! - `logging`: exports a built-in [`LogWriter`] that renders events via `tracing`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use taskgate::{CoalescingRunner, RunError, SequentialRunner};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     // Saves through one API client never overlap.
//!     let saves = SequentialRunner::new("api-client");
//!     let saved = saves
//!         .run_after_previous(|_ctx: CancellationToken| async { Ok::<_, String>("user") })
//!         .await;
//!     assert_eq!(saved, Ok("user"));
//!
//!     // A newer sort request cancels the one in flight.
//!     let sorts = Arc::new(CoalescingRunner::<u32, String>::new("sort"));
//!     let stale = {
//!         let sorts = Arc::clone(&sorts);
//!         tokio::spawn(async move {
//!             sorts
//!                 .replace_active(|ctx: CancellationToken| async move {
//!                     ctx.cancelled().await;
//!                     Ok(1)
//!                 })
//!                 .await
//!         })
//!     };
//!     tokio::time::sleep(Duration::from_millis(10)).await;
//!
//!     let fresh = sorts.replace_active(|_ctx: CancellationToken| async { Ok(2) }).await;
//!     assert_eq!(fresh, Ok(2));
//!     assert_eq!(stale.await.unwrap(), Err(RunError::Canceled));
//! }
//! ```
mod config;
mod error;
mod events;
mod operation;
mod runners;
mod subscribers;

// ---- Public re-exports ----

pub use config::Config;
pub use error::RunError;
pub use events::{Bus, Event, EventKind};
pub use operation::{BoxOpFuture, BoxOperation, Operation, Outcome, TaskHandle};
pub use runners::{CoalescingRunner, SequentialRunner};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose the slot controller.
// Enabled by default; opt out with `default-features = false`.
#[cfg(feature = "controller")]
mod controller;
#[cfg(feature = "controller")]
pub use controller::{
    Admission, Controller, ControllerBuilder, ControllerConfig, ControllerError, ControllerSpec,
    SubmitError,
};

// Optional: expose a built-in logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
