//! # Runner configuration.
//!
//! Provides [`Config`] shared settings for runners and the controller.
//!
//! ## Sentinel values
//! - `contention_warn_after = 0` → never warn about lost CAS rounds
//! - `bus_capacity = 0` → clamped to 1 by [`Bus`](crate::Bus)

/// Settings shared by runners built from the same configuration.
///
/// ## Field semantics
/// - `bus_capacity`: Event bus ring buffer size (min 1; clamped by Bus)
/// - `contention_warn_after`: Lost CAS attempts in one call before a warning is logged (`0` = off)
///
/// ## Notes
/// All fields are public for flexibility. Prefer the helper accessors to avoid
/// sprinkling sentinel checks (`0`) across the codebase.
#[derive(Clone, Debug)]
pub struct Config {
    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Slow subscribers that lag behind more than `bus_capacity` messages
    /// skip older items.
    pub bus_capacity: usize,

    /// Number of lost slot races in a single runner call after which a
    /// `warn`-level line is logged (once per call).
    ///
    /// Losing races is normal under contention and never fails the call;
    /// the warning only points at a slot that is being hammered.
    pub contention_warn_after: u32,
}

impl Config {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns the contention warning threshold as an `Option`.
    ///
    /// - `None` → never warn
    /// - `Some(n)` → warn once the n-th race in a call is lost
    #[inline]
    pub fn contention_warn_threshold(&self) -> Option<u32> {
        if self.contention_warn_after == 0 {
            None
        } else {
            Some(self.contention_warn_after)
        }
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `bus_capacity = 1024`
    /// - `contention_warn_after = 64`
    fn default() -> Self {
        Self {
            bus_capacity: 1024,
            contention_warn_after: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels() {
        let cfg = Config {
            bus_capacity: 0,
            contention_warn_after: 0,
        };
        assert_eq!(cfg.bus_capacity_clamped(), 1);
        assert_eq!(cfg.contention_warn_threshold(), None);

        let cfg = Config::default();
        assert_eq!(cfg.bus_capacity_clamped(), 1024);
        assert_eq!(cfg.contention_warn_threshold(), Some(64));
    }
}
