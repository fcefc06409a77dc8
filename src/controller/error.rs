use thiserror::Error;

use super::admission::Admission;
use crate::error::RunError;

/// Misuse of a controller slot, or of a closed controller.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// The slot is bound to a runner kind that cannot serve the requested admission.
    ///
    /// A slot created with `Queue` stays sequential; a slot created with
    /// `Replace`/`Join` stays coalescing.
    #[error("slot '{slot}' is bound to {registered:?} admission; {requested:?} requested")]
    PolicyMismatch {
        /// Slot name.
        slot: String,
        /// Admission the slot was created with.
        registered: Admission,
        /// Admission of the rejected submission.
        requested: Admission,
    },

    /// Controller was shut down (`shutdown()` was called).
    #[error("controller is shut down")]
    Closed,
}

impl ControllerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ControllerError::PolicyMismatch { .. } => "controller_policy_mismatch",
            ControllerError::Closed => "controller_closed",
        }
    }
}

/// Error returned by [`Controller::submit`](super::Controller::submit).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError<E> {
    /// The submission was admitted and the run produced no value.
    #[error(transparent)]
    Run(#[from] RunError<E>),

    /// The submission was rejected before anything ran.
    #[error(transparent)]
    Controller(#[from] ControllerError),
}

impl<E> SubmitError<E> {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SubmitError::Run(e) => e.as_label(),
            SubmitError::Controller(e) => e.as_label(),
        }
    }

    /// Returns the run error, if the submission got that far.
    pub fn into_run(self) -> Option<RunError<E>> {
        match self {
            SubmitError::Run(e) => Some(e),
            SubmitError::Controller(_) => None,
        }
    }
}
