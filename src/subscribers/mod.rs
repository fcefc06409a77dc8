//! # Event subscribers.
//!
//! - [`Subscribe`] - trait for custom event handlers
//! - [`SubscriberSet`] - per-subscriber queues and workers, panic isolation
//! - [`LogWriter`] - renders events through `tracing` (feature `logging`)

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub(crate) use set::panic_message;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
