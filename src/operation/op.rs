//! # Operation abstraction.
//!
//! An [`Operation`] is a one-shot unit of asynchronous work: invoked once with a
//! [`CancellationToken`], it produces `Result<T, E>`. Any
//! `FnOnce(CancellationToken) -> impl Future<Output = Result<T, E>>` closure is an
//! operation, so most callers never name the trait.
//!
//! Invoking the operation is what starts its side effects, so runners keep
//! operations un-invoked until they have decided the operation should run.
//! An operation that loses a race is dropped without ever being invoked.
//!
//! ## Example
//! ```rust
//! use tokio_util::sync::CancellationToken;
//! use taskgate::{BoxOperation, Operation};
//!
//! let op: BoxOperation<u32, String> = Box::new(|ctx: CancellationToken| async move {
//!     if ctx.is_cancelled() {
//!         return Err("stopped".to_string());
//!     }
//!     Ok(42)
//! });
//! # let _ = op;
//! ```

use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

/// Boxed future produced by an invoked operation.
pub type BoxOpFuture<T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'static>>;

/// Type-erased operation.
pub type BoxOperation<T, E> = Box<dyn Operation<T, E>>;

/// # Asynchronous, cancelable, one-shot unit of work.
///
/// The token passed to [`invoke`](Operation::invoke) is fired when the runner
/// cancels the operation; implementations should check it at their own
/// suspension points. Runners also drop the returned future on cancellation,
/// so checking the token is only needed for work spawned elsewhere.
pub trait Operation<T, E>: Send + 'static {
    /// Consumes the operation and returns the future doing the work.
    fn invoke(self: Box<Self>, ctx: CancellationToken) -> BoxOpFuture<T, E>;
}

impl<F, Fut, T, E> Operation<T, E> for F
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    fn invoke(self: Box<Self>, ctx: CancellationToken) -> BoxOpFuture<T, E> {
        Box::pin((*self)(ctx))
    }
}
