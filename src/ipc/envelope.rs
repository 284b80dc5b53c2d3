//! # Bus envelope and process roles.
//!
//! Every message on the bus is a [`MessageEnvelope`]: an event name, a
//! [`Payload`], and the [`Role`] of the sending process. The role is what the
//! receiving bus compares against its own to suppress echoes.

use std::fmt;
use std::sync::Arc;

use super::payload::Payload;

/// Control event: controller asks the worker session to stop.
pub const STOP: &str = "STOP";
/// Control event: liveness probe sent by the controller.
pub const CHECK: &str = "CHECK";
/// Control event: reply from a live worker to [`CHECK`].
pub const CHECK_OK: &str = "CHECK_OK";
/// Control event: new status indicator content for the running worker.
pub const STATUS_UPDATE: &str = "STATUS_UPDATE";

/// Returns true for event names reserved by the runtime.
pub fn is_control_event(name: &str) -> bool {
    matches!(name, STOP | CHECK | CHECK_OK | STATUS_UPDATE)
}

/// Which side of the hand-off a process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The application process that starts and stops the task.
    Controller,
    /// The isolated process hosting the task session.
    Worker,
}

impl Role {
    #[inline]
    pub fn is_worker(self) -> bool {
        matches!(self, Role::Worker)
    }

    /// Role from the wire flag.
    #[inline]
    pub fn from_worker_flag(origin_is_worker: bool) -> Self {
        if origin_is_worker {
            Role::Worker
        } else {
            Role::Controller
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Controller => f.write_str("controller"),
            Role::Worker => f.write_str("worker"),
        }
    }
}

/// A single bus message. Transient; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEnvelope {
    /// Event name handlers subscribe to.
    pub event: Arc<str>,
    /// Message body.
    pub payload: Payload,
    /// Role of the sending process.
    pub origin: Role,
}

impl MessageEnvelope {
    pub fn new(event: impl Into<Arc<str>>, payload: Payload, origin: Role) -> Self {
        Self {
            event: event.into(),
            payload,
            origin,
        }
    }

    /// True if this envelope was sent by a process playing `role`.
    #[inline]
    pub fn is_echo_for(&self, role: Role) -> bool {
        self.origin == role
    }
}
