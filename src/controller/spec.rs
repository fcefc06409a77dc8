use std::borrow::Cow;

use super::admission::Admission;
use crate::operation::{BoxOperation, Operation};

/// Request to run an operation in a controller slot.
///
/// Combines a slot name, admission policy, and the operation itself.
pub struct ControllerSpec<T, E> {
    /// Slot name.
    pub slot: Cow<'static, str>,

    /// Admission policy.
    pub admission: Admission,

    /// Operation to run (invoked only if admitted to run).
    pub op: BoxOperation<T, E>,
}

impl<T, E> ControllerSpec<T, E> {
    /// Creates a new controller submission.
    ///
    /// ## Parameters
    /// - `slot`: Logical resource the operation targets
    /// - `admission`: How to handle concurrent submissions
    /// - `op`: The operation to execute
    pub fn new<O>(slot: impl Into<Cow<'static, str>>, admission: Admission, op: O) -> Self
    where
        O: Operation<T, E>,
    {
        Self {
            slot: slot.into(),
            admission,
            op: Box::new(op),
        }
    }

    /// Returns the slot name.
    pub fn slot_name(&self) -> &str {
        &self.slot
    }

    /// Convenience: Queue admission.
    #[inline]
    pub fn queue<O: Operation<T, E>>(slot: impl Into<Cow<'static, str>>, op: O) -> Self {
        Self::new(slot, Admission::Queue, op)
    }

    #[inline]
    pub fn replace<O: Operation<T, E>>(slot: impl Into<Cow<'static, str>>, op: O) -> Self {
        Self::new(slot, Admission::Replace, op)
    }

    #[inline]
    pub fn join<O: Operation<T, E>>(slot: impl Into<Cow<'static, str>>, op: O) -> Self {
        Self::new(slot, Admission::Join, op)
    }
}

impl<T, E> std::fmt::Debug for ControllerSpec<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerSpec")
            .field("slot", &self.slot)
            .field("admission", &self.admission)
            .finish_non_exhaustive()
    }
}
