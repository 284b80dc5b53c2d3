//! # Global runtime configuration.
//!
//! Provides [`Config`], the centralized settings shared by the controller and
//! worker sides.
//!
//! ## Sentinel values
//! - `stop_grace = 0s` → issue the fallback terminate immediately after `STOP`
//! - `drain_grace = 0s` → abandon bodies as soon as `STOP` is observed
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use taskhost::Config;
//!
//! let mut cfg = Config::default();
//! cfg.stop_grace = Duration::from_secs(2);
//! cfg.status.sticky = true;
//!
//! assert_eq!(cfg.check_timeout, Duration::from_millis(1000));
//! ```

use std::time::Duration;

use crate::lifecycle::StatusSpec;

/// Global configuration for both process roles.
///
/// ## Field semantics
/// - `settle_grace`: pause between instance-flag acquisition and the first body
/// - `check_timeout`: default liveness probe timeout
/// - `stop_grace`: wait after `STOP` before the fallback OS terminate
/// - `drain_grace`: how long a draining worker waits for bodies
/// - `bus_capacity`: ring buffer size for the local transport and diagnostic bus (min 1)
/// - `status`: default status indicator spec
#[derive(Clone, Debug)]
pub struct Config {
    /// Pause after a worker session claims the instance flag, so bus
    /// subscriptions are live before any body can emit or expect messages.
    pub settle_grace: Duration,

    /// Default timeout for [`Orchestrator::check_task`](crate::Orchestrator::check_task).
    pub check_timeout: Duration,

    /// Time the controller gives the worker to stop on its own after `STOP`
    /// before asking the service facility to terminate it.
    pub stop_grace: Duration,

    /// Time a draining worker waits for bodies to observe cancellation before
    /// abandoning them to process teardown.
    pub drain_grace: Duration,

    /// Capacity of broadcast ring buffers.
    ///
    /// Lagging receivers skip the oldest items. Minimum value is 1.
    pub bus_capacity: usize,

    /// Status indicator defaults; start-time overrides merge over this.
    pub status: StatusSpec,
}

impl Config {
    /// Returns the bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns the drain wait, `None` when draining should not wait at all.
    #[inline]
    pub fn drain_limit(&self) -> Option<Duration> {
        if self.drain_grace == Duration::ZERO {
            None
        } else {
            Some(self.drain_grace)
        }
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `settle_grace = 100ms`
    /// - `check_timeout = 1000ms`
    /// - `stop_grace = 5s`
    /// - `drain_grace = 5s`
    /// - `bus_capacity = 1024`
    /// - `status = StatusSpec::default()`
    fn default() -> Self {
        Self {
            settle_grace: Duration::from_millis(100),
            check_timeout: Duration::from_millis(1000),
            stop_grace: Duration::from_secs(5),
            drain_grace: Duration::from_secs(5),
            bus_capacity: 1024,
            status: StatusSpec::default(),
        }
    }
}
