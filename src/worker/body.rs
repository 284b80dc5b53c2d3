//! # Task bodies and their execution context.
//!
//! A [`TaskBody`] is one unit of long-running work registered on a
//! [`WorkerRuntime`](crate::WorkerRuntime). Every body of a session runs
//! concurrently with its siblings and receives a fresh [`TaskContext`].
//!
//! [`BodyFn`] wraps a closure `F: Fn(TaskContext) -> Fut`, producing a new
//! future per session.
//!
//! ## Cancellation
//! Cancellation is cooperative only. `STOP` cancels the context's token; a body
//! that never polls it keeps running until the process is torn down.
//!
//! ## Example
//! ```rust
//! use taskhost::{BodyFn, BodyRef, TaskContext, TaskError};
//!
//! let body: BodyRef = BodyFn::arc("sync", |ctx: TaskContext| async move {
//!     let every = ctx.data().get("every_ms").and_then(|v| v.as_i64()).unwrap_or(500);
//!     loop {
//!         tokio::select! {
//!             _ = ctx.stopped() => return Ok::<_, TaskError>(()),
//!             _ = tokio::time::sleep(std::time::Duration::from_millis(every as u64)) => {
//!                 ctx.emit("tick", 1);
//!             }
//!         }
//!     }
//! });
//!
//! assert_eq!(body.name(), "sync");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::ipc::{EventBus, Payload};
use crate::lifecycle::TaskData;
use crate::subscription::Subscription;

/// Boxed future returned by [`TaskBody::spawn`].
pub type BoxBodyFuture = Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send + 'static>>;

/// Shared handle to a task body.
pub type BodyRef = Arc<dyn TaskBody>;

/// Asynchronous, cooperatively cancelable unit of worker-side work.
pub trait TaskBody: Send + Sync + 'static {
    /// Stable, human-readable body name.
    fn name(&self) -> &str;

    /// Creates a new future for one session.
    fn spawn(&self, ctx: TaskContext) -> BoxBodyFuture;
}

/// Function-backed task body.
#[derive(Debug)]
pub struct BodyFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> BodyFn<F> {
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the body and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

impl<F, Fut> TaskBody for BodyFn<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn spawn(&self, ctx: TaskContext) -> BoxBodyFuture {
        Box::pin((self.f)(ctx))
    }
}

/// Everything a body gets for one session.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct TaskContext {
    data: Arc<TaskData>,
    token: CancellationToken,
    bus: Arc<EventBus>,
}

impl TaskContext {
    pub(crate) fn new(data: Arc<TaskData>, token: CancellationToken, bus: Arc<EventBus>) -> Self {
        Self { data, token, bus }
    }

    /// Primitive key/value data from the task descriptor.
    pub fn data(&self) -> &TaskData {
        &self.data
    }

    /// Token cancelled once `STOP` is observed.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    #[inline]
    pub fn is_stopping(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the session is asked to stop.
    pub async fn stopped(&self) {
        self.token.cancelled().await;
    }

    /// Emits to the controller process.
    pub fn emit(&self, event: &str, payload: impl Into<Payload>) {
        self.bus.emit(event, payload);
    }

    /// Listens for controller-originated events.
    pub fn on<F>(&self, event: impl Into<Arc<str>>, handler: F) -> Subscription
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        self.bus.on(event, handler)
    }
}
