//! # Worker process entry.
//!
//! [`WorkerService`] is what the service facility invokes inside the worker
//! process. It pairs the [`WorkerRuntime`] with the [`Announcer`] that owns the
//! status indicator, and it is the target of the host's dismissal callback.
//!
//! ## Start command flow
//! ```text
//! on_start_command(descriptor)
//!   ├─ runtime.enter() refused ─► Duplicate / Retired (indicator untouched)
//!   └─ admitted
//!        ├─► announce(descriptor.status)
//!        ├─► on(STATUS_UPDATE) ─► announcer.update
//!        ├─► session.run(descriptor.data)
//!        └─► retire indicator ─► Completed(report)
//! ```

use std::sync::Arc;

use crate::events::Bus;
use crate::host::StatusIndicator;
use crate::ipc::STATUS_UPDATE;
use crate::lifecycle::{Announcer, StatusOverrides, TaskDescriptor};
use crate::orchestrator::Orchestrator;

use super::runtime::{SessionOutcome, WorkerRuntime};

pub struct WorkerService {
    runtime: Arc<WorkerRuntime>,
    announcer: Arc<Announcer>,
}

impl WorkerService {
    pub fn new(runtime: Arc<WorkerRuntime>, indicator: Arc<dyn StatusIndicator>) -> Arc<Self> {
        let diag: Bus = runtime.diag().clone();
        Arc::new(Self {
            runtime,
            announcer: Arc::new(Announcer::new(indicator, diag)),
        })
    }

    /// Handles one start command delivered by the service facility.
    ///
    /// Resolves when the session ends; a refused entry resolves immediately.
    pub async fn on_start_command(&self, descriptor: TaskDescriptor) -> SessionOutcome {
        let session = match self.runtime.enter(descriptor.name()) {
            Ok(session) => session,
            Err(refused) => return refused,
        };

        self.announcer.announce(descriptor.status().clone());
        let announcer = Arc::clone(&self.announcer);
        let updates = self.runtime.bus().on(STATUS_UPDATE, move |payload| {
            announcer.update(&StatusOverrides::from_payload(payload));
        });

        let report = session.run(Arc::clone(descriptor.data())).await;

        updates.remove();
        self.announcer.retire();
        SessionOutcome::Completed(report)
    }

    /// Host callback: the user dismissed the status indicator.
    pub fn on_indicator_dismissed(&self) {
        self.announcer.on_dismissed();
    }

    /// External teardown of the process image (OS kill).
    pub fn teardown(&self) {
        self.announcer.retire();
        self.runtime.force_terminated();
    }

    pub fn runtime(&self) -> &Arc<WorkerRuntime> {
        &self.runtime
    }

    /// Facade for code running inside this process.
    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::worker(Arc::clone(&self.runtime))
    }
}
