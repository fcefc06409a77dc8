//! Runners: coordination policies for operations that target one logical resource.
//!
//! - [`SequentialRunner`]: one at a time, FIFO.
//! - [`CoalescingRunner`]: one active operation; replace it or join it.
//!
//! Own one runner per logical resource (per query type, per document, ...);
//! runners never share state with each other.

mod coalescing;
mod sequential;

pub use coalescing::CoalescingRunner;
pub use sequential::SequentialRunner;
