//! Error types returned by the runners.
//!
//! [`RunError`] is the outcome of a single runner call that did not produce a value.
//! It provides `as_label` (stable snake_case, for logs/metrics) and `as_message`.
//!
//! Controller-specific errors live in `controller::error`.

use thiserror::Error;

/// # Why a runner call produced no value.
///
/// `Failed` carries the operation's own error verbatim. `Canceled` is only ever
/// produced for work a runner (or the caller) cancelled, so callers can tell
/// "the operation said no" apart from "the operation was stopped" when deciding
/// whether to retry.
///
/// The type is `Clone` because a single outcome is fanned out to every caller
/// that joined the same operation.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError<E> {
    /// The operation ran and returned an error.
    #[error("operation failed: {0}")]
    Failed(E),

    /// The operation, or the caller waiting for it, was cancelled.
    #[error("operation cancelled")]
    Canceled,

    /// The operation body panicked while running inside a shared handle.
    #[error("operation panicked: {reason}")]
    Panicked {
        /// Panic payload rendered as text.
        reason: String,
    },
}

impl<E> RunError<E> {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use taskgate::RunError;
    ///
    /// let err: RunError<String> = RunError::Canceled;
    /// assert_eq!(err.as_label(), "op_canceled");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RunError::Failed(_) => "op_failed",
            RunError::Canceled => "op_canceled",
            RunError::Panicked { .. } => "op_panicked",
        }
    }

    /// Returns `true` for [`RunError::Canceled`].
    pub fn is_canceled(&self) -> bool {
        matches!(self, RunError::Canceled)
    }

    /// Returns the operation's own error, if that is what this is.
    pub fn into_failure(self) -> Option<E> {
        match self {
            RunError::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Maps the operation error, keeping the other variants.
    pub fn map_failure<F>(self, f: impl FnOnce(E) -> F) -> RunError<F> {
        match self {
            RunError::Failed(e) => RunError::Failed(f(e)),
            RunError::Canceled => RunError::Canceled,
            RunError::Panicked { reason } => RunError::Panicked { reason },
        }
    }
}

impl<E: std::fmt::Display> RunError<E> {
    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RunError::Failed(e) => format!("error: {e}"),
            RunError::Canceled => "cancelled".to_string(),
            RunError::Panicked { reason } => format!("panic: {reason}"),
        }
    }
}
