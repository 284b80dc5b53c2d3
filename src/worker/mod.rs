//! Worker process side: task bodies, the active instance guard, the session
//! runtime and the process entry point.
//!
//! - [`TaskBody`], [`BodyFn`], [`TaskContext`] describe the work.
//! - [`WorkerRuntime`] runs one [`Session`] per process image.
//! - [`WorkerService`] handles start commands and indicator callbacks.

mod body;
mod guard;
mod runtime;
mod service;

pub use body::{BodyFn, BodyRef, BoxBodyFuture, TaskBody, TaskContext};
pub use guard::{ActiveInstanceFlag, InstanceGuard};
pub use runtime::{Session, SessionOutcome, SessionReport, SessionState, WorkerRuntime};
pub use service::WorkerService;
