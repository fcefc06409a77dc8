use std::fmt::Display;
use std::sync::Arc;

use super::admission::Admission;
use super::error::ControllerError;
use crate::config::Config;
use crate::events::Bus;
use crate::runners::{CoalescingRunner, SequentialRunner};

/// Runner bound to a single slot.
pub(super) enum SlotRunner<T, E> {
    /// Created by a `Queue` submission.
    Sequential(Arc<SequentialRunner>),

    /// Created by a `Replace` or `Join` submission.
    Coalescing(Arc<CoalescingRunner<T, E>>),
}

/// State of a single slot.
pub(super) struct SlotState<T, E> {
    /// Admission the slot was created with.
    pub bound: Admission,

    /// Runner serving the slot.
    pub runner: SlotRunner<T, E>,
}

impl<T, E> SlotState<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + Display + 'static,
{
    /// Creates the runner kind `admission` needs.
    pub fn new(name: &str, admission: Admission, cfg: &Config, bus: &Bus) -> Self {
        let runner = if admission.is_coalescing() {
            SlotRunner::Coalescing(Arc::new(
                CoalescingRunner::new(name)
                    .with_config(cfg)
                    .with_bus(bus.clone()),
            ))
        } else {
            SlotRunner::Sequential(Arc::new(SequentialRunner::new(name).with_bus(bus.clone())))
        };
        Self {
            bound: admission,
            runner,
        }
    }

    /// Returns the runner if it can serve `requested`.
    pub fn serve(&self, slot: &str, requested: Admission) -> Result<SlotRunner<T, E>, ControllerError> {
        if !self.bound.compatible_with(requested) {
            return Err(ControllerError::PolicyMismatch {
                slot: slot.to_owned(),
                registered: self.bound,
                requested,
            });
        }
        Ok(self.runner.clone())
    }
}

impl<T, E> Clone for SlotRunner<T, E> {
    fn clone(&self) -> Self {
        match self {
            SlotRunner::Sequential(r) => SlotRunner::Sequential(Arc::clone(r)),
            SlotRunner::Coalescing(r) => SlotRunner::Coalescing(Arc::clone(r)),
        }
    }
}
