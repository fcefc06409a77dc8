//! # Per-submission admission policy
//!
//! Controller treats work as **slots** identified by `name`.
//! When a request for a slot arrives, the admission policy decides how it
//! interacts with whatever that slot is already doing.
//!
//! ## Variants
//! - `Queue`: wait for everything submitted earlier, then run (FIFO).
//! - `Replace`: cancel the running operation and run the new one.
//! - `Join`: if an operation is running, share its result; otherwise run.
//!
//! ## Invariants
//! - Operations within the same slot never run in parallel.
//! - A slot is bound to its first admission's runner kind: `Queue` slots stay
//!   sequential, `Replace`/`Join` slots stay coalescing (and may mix those two).

/// Policy controlling how a submission interacts with its slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Admission {
    /// Queue the operation (FIFO order).
    ///
    /// Use when:
    /// - All submissions must execute
    /// - Order matters
    /// - Example: saving a user, then a song, through one API client
    Queue,

    /// Cancel the current operation and run the new one.
    ///
    /// Use when:
    /// - New request invalidates old one
    /// - Example: re-sorting a list after the sort order changed
    Replace,

    /// Share the current operation's result instead of starting another.
    ///
    /// Use when:
    /// - Duplicate requests should not flood the backend
    /// - Example: several screens asking for the same banner at once
    Join,
}

impl Admission {
    /// Returns `true` for admissions served by a coalescing runner.
    #[inline]
    pub fn is_coalescing(self) -> bool {
        matches!(self, Admission::Replace | Admission::Join)
    }

    /// Returns `true` if a slot bound with `self` can serve `requested`.
    #[inline]
    pub fn compatible_with(self, requested: Admission) -> bool {
        self.is_coalescing() == requested.is_coalescing()
    }
}
