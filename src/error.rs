//! Error types used by the taskhost runtime, task bodies and the wire codec.
//!
//! This module defines three error enums:
//!
//! - [`HostError`] — errors surfaced to the caller of the orchestrator facade.
//! - [`TaskError`] — errors returned by individual task bodies.
//! - [`CodecError`] — envelope encode/decode failures (never surfaced past the bus).
//!
//! Each type provides `as_label` for logs/metrics. Transport failures and
//! duplicate worker entries are deliberately absent: the first is swallowed by
//! the transport, the second is an expected re-invocation and is reported as
//! [`SessionOutcome::Duplicate`](crate::SessionOutcome::Duplicate).

use thiserror::Error;

/// # Errors surfaced by the orchestrator facade.
///
/// None of these are fatal to the host application; they only mean the task
/// did not start or could not be reached.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The OS service facility declined to start the worker process.
    #[error("worker launch failed for task {task:?}: {reason}")]
    LaunchFailed {
        /// Task name from the descriptor.
        task: String,
        /// Reason reported by the service host.
        reason: String,
    },

    /// The lifecycle actor is gone (the orchestrator was dropped).
    #[error("lifecycle controller closed")]
    Closed,

    /// The operation is not available in this process role.
    #[error("operation {op} is not available in this process role")]
    WrongRole {
        /// Name of the rejected operation.
        op: &'static str,
    },
}

impl HostError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use taskhost::HostError;
    ///
    /// let err = HostError::LaunchFailed { task: "sync".into(), reason: "denied".into() };
    /// assert_eq!(err.as_label(), "host_launch_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            HostError::LaunchFailed { .. } => "host_launch_failed",
            HostError::Closed => "host_closed",
            HostError::WrongRole { .. } => "host_wrong_role",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            HostError::LaunchFailed { task, reason } => {
                format!("launch failed: task={task} reason={reason}")
            }
            HostError::Closed => "controller closed".to_string(),
            HostError::WrongRole { op } => format!("wrong role for {op}"),
        }
    }
}

/// # Errors produced by task bodies.
///
/// A failing body never cancels its siblings; the runtime records the failure
/// and keeps awaiting the rest of the session.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TaskError {
    /// Body execution failed.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Body observed the stop signal and exited early.
    #[error("context cancelled")]
    Canceled,
}

impl TaskError {
    /// Shorthand for [`TaskError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        TaskError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use taskhost::TaskError;
    ///
    /// assert_eq!(TaskError::fail("boom").as_label(), "task_failed");
    /// assert_eq!(TaskError::Canceled.as_label(), "task_canceled");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Fail { .. } => "task_failed",
            TaskError::Canceled => "task_canceled",
        }
    }

    /// True if the body exited because it observed the stop signal.
    ///
    /// Cancellation is a graceful exit and is not counted as a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, TaskError::Canceled)
    }
}

/// # Envelope codec errors.
///
/// Decode errors are dropped silently by the event bus; encode errors drop the
/// outgoing message. Neither reaches application code.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CodecError {
    /// The frame or its inner payload is not valid JSON.
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload contains a shape outside the supported union.
    #[error("unsupported payload shape: {what}")]
    UnsupportedShape {
        /// What was rejected (e.g. `null`).
        what: &'static str,
    },

    /// A float payload is NaN or infinite and has no JSON encoding.
    #[error("non-finite number in payload")]
    NonFinite,
}

impl CodecError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            CodecError::Json(_) => "codec_json",
            CodecError::UnsupportedShape { .. } => "codec_unsupported_shape",
            CodecError::NonFinite => "codec_non_finite",
        }
    }
}
