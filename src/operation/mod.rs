//! # Operations and their handles.
//!
//! - [`Operation`] - trait for one-shot async cancelable work (closures implement it)
//! - [`BoxOperation`] - type-erased operation
//! - [`TaskHandle`] - lazily started, shareable handle around one operation instance

mod handle;
mod op;

pub(crate) use handle::Waiter;
pub use handle::{Outcome, TaskHandle};
pub use op::{BoxOpFuture, BoxOperation, Operation};
