//! # Diagnostic events emitted by the controller and worker sides.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Controller events**: start/stop requests, launches, terminates, exits
//! - **Worker events**: session entry, body failures, draining, session end
//! - **Indicator events**: show, re-announce, update, dismiss
//! - **Subscriber events**: overflow and panics in diagnostic subscribers
//!
//! These never cross the process boundary; they feed local subscribers
//! (logging, metrics) and are the error-reporting channel for non-fatal
//! warnings such as a denied permission.
//!
//! ## Ordering guarantees
//! Each event has a process-wide sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use taskhost::{Event, EventKind, RunningState};
//!
//! let ev = Event::new(EventKind::StateChanged)
//!     .with_task("sync")
//!     .with_state(RunningState::Running);
//!
//! assert_eq!(ev.kind, EventKind::StateChanged);
//! assert_eq!(ev.task.as_deref(), Some("sync"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::ipc::Role;
use crate::lifecycle::RunningState;

/// Process-wide sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of diagnostic events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Controller events ===
    /// `start_task` accepted in `Idle`.
    ///
    /// Sets: `task`
    StartRequested,

    /// `start_task` ignored because a session is already active.
    ///
    /// Sets: `task`, `state`
    StartIgnored,

    /// Indicator permission refused; the task proceeds anyway.
    ///
    /// Sets: `task`
    PermissionDenied,

    /// Service facility acknowledged the launch.
    ///
    /// Sets: `task`
    Launched,

    /// Service facility declined the launch.
    ///
    /// Sets: `task`, `reason`
    LaunchFailed,

    /// `stop_task` accepted; `STOP` sent.
    ///
    /// Sets: `task`
    StopRequested,

    /// Fallback terminate issued after `stop_grace`.
    ///
    /// Sets: `task`
    TerminateIssued,

    /// Worker process exit observed.
    ///
    /// Sets: `task`, `reason` (`completed` / `killed` / `terminated`)
    WorkerExited,

    /// Running-state projection changed.
    ///
    /// Sets: `state`, `role`, optionally `task`
    StateChanged,

    // === Worker events ===
    /// A worker session claimed the instance flag.
    ///
    /// Sets: `task`
    SessionStarted,

    /// A second entry found the instance flag taken and exited.
    ///
    /// Sets: `task`
    DuplicateEntry,

    /// A task body returned an error or panicked.
    ///
    /// Sets: `task` (body name), `reason`
    BodyFailed,

    /// `STOP` observed; session is draining.
    StopObserved,

    /// Drain grace ran out with bodies still running.
    ///
    /// Sets: `reason` (abandoned count)
    DrainExceeded,

    /// Session terminated and the instance flag was cleared.
    ///
    /// Sets: `task`, `reason` (report summary)
    SessionEnded,

    // === Indicator events ===
    /// Indicator shown at session start.
    IndicatorShown,

    /// Sticky indicator re-shown after user dismissal.
    IndicatorReannounced,

    /// Indicator content updated.
    IndicatorUpdated,

    /// Indicator dismissed at session end.
    IndicatorDismissed,

    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `task` (subscriber name), `reason` (panic info)
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `task` (subscriber name), `reason`
    SubscriberOverflow,
}

/// Diagnostic event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Task, body or subscriber name, if applicable.
    pub task: Option<Arc<str>>,
    /// Human-readable reason.
    pub reason: Option<Arc<str>>,
    /// Running state, for state changes.
    pub state: Option<RunningState>,
    /// Role of the process that produced the event.
    pub role: Option<Role>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task: None,
            reason: None,
            state: None,
            role: None,
        }
    }

    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[inline]
    pub fn with_state(mut self, state: RunningState) -> Self {
        self.state = Some(state);
        self
    }

    #[inline]
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_task(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_task(subscriber)
            .with_reason(info)
    }
}
