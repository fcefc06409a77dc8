/// Configuration for the controller.
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Expected number of distinct slots (pre-sizes the slot map).
    pub slot_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self { slot_capacity: 64 }
    }
}
