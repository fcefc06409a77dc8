use std::fmt::Display;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::{
    config::Config,
    events::Bus,
    subscribers::{Subscribe, SubscriberSet},
};

use super::{config::ControllerConfig, core::Controller};

/// Builder for constructing a [`Controller`] with optional subscribers.
pub struct ControllerBuilder<T, E> {
    cfg: Config,
    controller_cfg: ControllerConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    _marker: PhantomData<fn() -> (T, E)>,
}

impl<T, E> ControllerBuilder<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + Display + 'static,
{
    /// Creates a new builder with the given runner configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            controller_cfg: ControllerConfig::default(),
            subscribers: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runner events (queueing, starts, completions,
    /// replacements, joins) through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Overrides the controller configuration.
    pub fn with_controller_config(mut self, cfg: ControllerConfig) -> Self {
        self.controller_cfg = cfg;
        self
    }

    /// Builds the controller and spawns its bus listener.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Arc<Controller<T, E>> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let set = SubscriberSet::new(self.subscribers, bus.clone());
        Controller::new_internal(self.cfg, self.controller_cfg, bus, set)
    }
}
