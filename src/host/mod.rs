//! # External collaborators.
//!
//! The core talks to the host platform through three narrow traits:
//! - [`ServiceHost`] launches and terminates the worker process;
//! - [`StatusIndicator`] renders the persistent status indicator;
//! - [`PermissionPrompt`] checks/requests the permission to show it.
//!
//! Reference implementations:
//! - [`LocalServiceHost`] runs each worker "process image" as an isolated
//!   tokio task with its own bus endpoint and instance flag;
//! - [`MemoryIndicator`] keeps the indicator in memory and logs operations;
//! - [`StaticPermission`] answers with a fixed status.

mod indicator;
mod local;
mod permission;

pub use indicator::{IndicatorOp, MemoryIndicator};
pub use local::{LocalServiceHost, WorkerImage};
pub use permission::StaticPermission;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::HostError;
use crate::lifecycle::{StatusSpec, TaskDescriptor};

/// How a worker process ended, as observed by the service facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The session finished and the process stopped itself.
    Completed,
    /// The process was torn down from outside (terminate or OS kill).
    Killed,
}

/// Launch acknowledgment: lets the controller observe the process exit.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    exit: watch::Receiver<Option<WorkerExit>>,
}

impl ProcessHandle {
    pub fn new(exit: watch::Receiver<Option<WorkerExit>>) -> Self {
        Self { exit }
    }

    /// Waits for the process to end.
    ///
    /// If the facility drops its side without reporting, the exit counts as
    /// [`WorkerExit::Killed`].
    pub async fn exited(&mut self) -> WorkerExit {
        match self.exit.wait_for(Option::is_some).await {
            Ok(v) => {
                let exit: Option<WorkerExit> = *v;
                exit.unwrap_or(WorkerExit::Killed)
            }
            Err(_) => WorkerExit::Killed,
        }
    }

    /// Exit status if the process has already ended.
    pub fn try_exit(&self) -> Option<WorkerExit> {
        *self.exit.borrow()
    }
}

/// OS facility that hosts the worker process.
#[async_trait]
pub trait ServiceHost: Send + Sync + 'static {
    /// Starts (or binds to) the worker process for `descriptor`.
    async fn launch(&self, descriptor: &TaskDescriptor) -> Result<ProcessHandle, HostError>;

    /// Best-effort teardown of the worker process; returns once acknowledged.
    async fn terminate(&self, descriptor: &TaskDescriptor);
}

/// Renderer for the persistent status indicator.
pub trait StatusIndicator: Send + Sync + 'static {
    fn show(&self, spec: &StatusSpec);
    fn update(&self, spec: &StatusSpec);
    fn dismiss(&self);
}

/// Result of a permission check or request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

impl PermissionStatus {
    #[inline]
    pub fn is_granted(self) -> bool {
        matches!(self, PermissionStatus::Granted)
    }
}

/// Permission facility for showing the status indicator.
#[async_trait]
pub trait PermissionPrompt: Send + Sync + 'static {
    /// Whether this host version needs the permission at all.
    fn required(&self) -> bool {
        true
    }

    async fn check(&self) -> PermissionStatus;

    async fn request(&self) -> PermissionStatus;
}
