//! # Runtime configuration.
//!
//! Provides [`RuntimeConfig`], the settings shared by the bus, active objects and
//! state machines.
//!
//! Config is used in two ways:
//! 1. **Bus creation**: `EventBus::with_config(config)`
//! 2. **Object runtime**: every object wrapped against a bus inherits the bus config
//!    (drain-watcher poll interval, transition cascade guard).
//!
//! ## Sentinel values
//! - `max_transition_cascade = 0` → unlimited synchronous transition chains
//! - `bus_capacity = 0` → clamped to 1
//! - `dispose_poll_interval = 0s` → clamped to 1ms (the watcher never busy-spins)

use std::time::Duration;

/// Settings for one bus and everything attached to it.
///
/// ## Field semantics
/// - `bus_capacity`: broadcast ring buffer size (min 1)
/// - `dispose_poll_interval`: how often a disposing object checks its mailbox is drained
/// - `subscriber_queue`: default queue size of attached [`Subscribe`](crate::Subscribe) workers
/// - `max_transition_cascade`: longest synchronous transition chain (`0` = unlimited)
///
/// ## Notes
/// All fields are public. Prefer the helper accessors over sentinel checks.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Capacity of the broadcast ring buffer.
    ///
    /// Object forwarders that fall more than `bus_capacity` events behind
    /// observe `Lagged` and report it to their `handle_error` hook.
    pub bus_capacity: usize,

    /// Poll period of the dispose drain-watcher.
    pub dispose_poll_interval: Duration,

    /// Default per-subscriber queue capacity for attached subscribers.
    pub subscriber_queue: usize,

    /// Upper bound on chained transitions triggered by a single `next_state`.
    ///
    /// - `0` = unlimited
    /// - `n > 0` = the chain fails with `MachineError::CascadeLimit` after `n` hops
    pub max_transition_cascade: usize,
}

impl RuntimeConfig {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns the drain poll interval clamped to a minimum of 1ms.
    #[inline]
    pub fn dispose_poll(&self) -> Duration {
        self.dispose_poll_interval.max(Duration::from_millis(1))
    }

    /// Returns the subscriber queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn subscriber_queue_clamped(&self) -> usize {
        self.subscriber_queue.max(1)
    }

    /// Returns the transition cascade limit as an `Option`.
    ///
    /// - `None` → unlimited
    /// - `Some(n)` → at most `n` chained transitions
    #[inline]
    pub fn cascade_limit(&self) -> Option<usize> {
        if self.max_transition_cascade == 0 {
            None
        } else {
            Some(self.max_transition_cascade)
        }
    }
}

impl Default for RuntimeConfig {
    /// Default configuration:
    ///
    /// - `bus_capacity = 1024`
    /// - `dispose_poll_interval = 100ms`
    /// - `subscriber_queue = 1024`
    /// - `max_transition_cascade = 64`
    fn default() -> Self {
        Self {
            bus_capacity: 1024,
            dispose_poll_interval: Duration::from_millis(100),
            subscriber_queue: 1024,
            max_transition_cascade: 64,
        }
    }
}
