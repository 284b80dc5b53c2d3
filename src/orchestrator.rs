//! # Orchestrator facade.
//!
//! [`Orchestrator`] is the public API application code talks to. It composes
//! the bus endpoint, the lifecycle controller and the permission prompt, and
//! adds no business logic of its own beyond the permission step in
//! [`start_task`](Orchestrator::start_task).
//!
//! Two flavors exist, one per process role:
//!
//! | operation            | controller                         | worker                         |
//! |----------------------|------------------------------------|--------------------------------|
//! | `start_task`         | permission, then lifecycle start   | no-op                          |
//! | `stop_task`          | lifecycle stop (`STOP` + fallback) | stops the local session        |
//! | `is_task_running`    | shadow state is `Running`          | active instance flag           |
//! | `check_task`         | `CHECK` / `CHECK_OK` probe         | active instance flag           |
//! | `update_status`      | `STATUS_UPDATE` to the worker      | `HostError::WrongRole`         |
//! | `on` / `emit`        | role-tagged bus                    | role-tagged bus                |
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use taskhost::{
//!     Config, LocalServiceHost, LocalTransport, MemoryIndicator, Orchestrator,
//!     StaticPermission, StatusOverrides, Transport,
//! };
//!
//! # async fn demo(host: Arc<LocalServiceHost>) -> Result<(), taskhost::HostError> {
//! let transport: Arc<dyn Transport> = Arc::new(LocalTransport::new(1024));
//! let orch = Orchestrator::builder(Config::default())
//!     .with_permission(Arc::new(StaticPermission::granted()))
//!     .build(transport, host);
//!
//! let _running = orch.on_running_changed(|state| println!("state: {state}"));
//! let task = orch.descriptor("sync").with_data("every_ms", 500);
//! orch.start_task(task, Some(StatusOverrides::default().title("Syncing").sticky(true)))
//!     .await?;
//! orch.emit("ping", taskhost::Payload::map([("seq", 1)]));
//! orch.stop_task();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::HostError;
use crate::events::{Bus, Event, EventKind};
use crate::host::{PermissionPrompt, ServiceHost};
use crate::ipc::{EventBus, Payload, Role, STATUS_UPDATE, is_control_event};
use crate::lifecycle::{
    LifecycleController, RunningState, StatusOverrides, TaskDescriptor, probe,
};
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::subscription::Subscription;
use crate::transport::Transport;
use crate::worker::WorkerRuntime;

enum Side {
    Controller {
        lifecycle: LifecycleController,
        permission: Option<Arc<dyn PermissionPrompt>>,
    },
    Worker {
        runtime: Arc<WorkerRuntime>,
    },
}

/// Public facade for one process role.
pub struct Orchestrator {
    cfg: Config,
    bus: Arc<EventBus>,
    diag: Bus,
    side: Side,
    listener: Option<JoinHandle<()>>,
}

impl Orchestrator {
    /// Starts building a controller-side orchestrator.
    pub fn builder(cfg: Config) -> OrchestratorBuilder {
        OrchestratorBuilder::new(cfg)
    }

    /// Worker-side facade over a runtime.
    pub(crate) fn worker(runtime: Arc<WorkerRuntime>) -> Self {
        Self {
            cfg: runtime.config().clone(),
            bus: Arc::clone(runtime.bus()),
            diag: runtime.diag().clone(),
            side: Side::Worker { runtime },
            listener: None,
        }
    }

    pub fn role(&self) -> Role {
        self.bus.role()
    }

    /// A descriptor for `name` carrying the configured default status spec.
    pub fn descriptor(&self, name: impl Into<Arc<str>>) -> TaskDescriptor {
        TaskDescriptor::new(name).with_status(self.cfg.status.clone())
    }

    /// Starts the worker for `descriptor`, merging `overrides` into its status spec.
    ///
    /// If the host needs the indicator permission and it is refused, a
    /// [`EventKind::PermissionDenied`] warning is published and the task starts
    /// anyway. Resolves once the launch is acknowledged; idempotent while a
    /// session is active. In the worker process this is a no-op.
    pub async fn start_task(
        &self,
        descriptor: TaskDescriptor,
        overrides: Option<StatusOverrides>,
    ) -> Result<(), HostError> {
        let Side::Controller {
            lifecycle,
            permission,
        } = &self.side
        else {
            tracing::debug!(task = descriptor.name(), "start_task ignored inside the worker");
            return Ok(());
        };

        if let Some(prompt) = permission {
            self.ensure_permission(prompt.as_ref(), descriptor.name()).await;
        }
        let descriptor = match overrides {
            Some(o) => descriptor.with_status_overrides(&o),
            None => descriptor,
        };
        lifecycle.start(descriptor).await
    }

    /// Asks the worker to stop. No-op when idle.
    pub fn stop_task(&self) {
        match &self.side {
            Side::Controller { lifecycle, .. } => lifecycle.stop(),
            Side::Worker { runtime } => runtime.request_stop(),
        }
    }

    /// Controller: last-known projection is `Running`. Worker: the local flag.
    pub fn is_task_running(&self) -> bool {
        match &self.side {
            Side::Controller { lifecycle, .. } => lifecycle.is_running(),
            Side::Worker { runtime } => runtime.is_active(),
        }
    }

    pub fn state(&self) -> RunningState {
        match &self.side {
            Side::Controller { lifecycle, .. } => lifecycle.state(),
            Side::Worker { runtime } => runtime.running_state(),
        }
    }

    /// Listens for running-state changes; the current state is delivered first.
    pub fn on_running_changed<F>(&self, listener: F) -> Subscription
    where
        F: Fn(RunningState) + Send + Sync + 'static,
    {
        let listener = Arc::new(listener);
        match &self.side {
            Side::Controller { lifecycle, .. } => lifecycle.subscribe(listener),
            Side::Worker { runtime } => runtime.state_cell().subscribe(listener),
        }
    }

    /// Registers a handler for events from the other process.
    pub fn on<F>(&self, event: impl Into<Arc<str>>, handler: F) -> Subscription
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        self.bus.on(event, handler)
    }

    /// Sends an event to the other process.
    pub fn emit(&self, event: &str, payload: impl Into<Payload>) {
        if is_control_event(event) {
            tracing::warn!(event, "application code emitted a reserved control event");
        }
        self.bus.emit(event, payload);
    }

    /// Probes worker liveness; `timeout` defaults to `Config::check_timeout`.
    pub async fn check_task(&self, timeout: Option<Duration>) -> bool {
        match &self.side {
            Side::Controller { .. } => {
                probe(&self.bus, timeout.unwrap_or(self.cfg.check_timeout)).await
            }
            Side::Worker { runtime } => runtime.is_active(),
        }
    }

    /// Changes the content of the worker's status indicator.
    pub fn update_status(&self, overrides: &StatusOverrides) -> Result<(), HostError> {
        match &self.side {
            Side::Controller { .. } => {
                self.bus.emit(STATUS_UPDATE, overrides.to_payload());
                Ok(())
            }
            Side::Worker { .. } => Err(HostError::WrongRole {
                op: "update_status",
            }),
        }
    }

    /// Diagnostic bus of this process.
    pub fn diag(&self) -> &Bus {
        &self.diag
    }

    async fn ensure_permission(&self, prompt: &dyn PermissionPrompt, task: &str) {
        if !prompt.required() {
            return;
        }
        if prompt.check().await.is_granted() || prompt.request().await.is_granted() {
            return;
        }
        tracing::warn!(task, "status indicator permission denied; starting without it");
        self.diag
            .publish(Event::new(EventKind::PermissionDenied).with_task(task));
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

/// Builder for a controller-side [`Orchestrator`].
pub struct OrchestratorBuilder {
    cfg: Config,
    permission: Option<Arc<dyn PermissionPrompt>>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl OrchestratorBuilder {
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            permission: None,
            subscribers: Vec::new(),
        }
    }

    /// Permission facility consulted by `start_task`. Without one, no prompt is shown.
    pub fn with_permission(mut self, permission: Arc<dyn PermissionPrompt>) -> Self {
        self.permission = Some(permission);
        self
    }

    /// Sets diagnostic event subscribers.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Opens the controller bus endpoint and spawns the lifecycle actor.
    ///
    /// Must be called inside a tokio runtime.
    pub fn build(self, transport: Arc<dyn Transport>, host: Arc<dyn ServiceHost>) -> Orchestrator {
        let diag = Bus::new(self.cfg.bus_capacity_clamped());
        let listener = (!self.subscribers.is_empty()).then(|| {
            let set = Arc::new(SubscriberSet::new(self.subscribers, diag.clone()));
            set.spawn_listener(&diag)
        });

        let bus = EventBus::start(Role::Controller, transport);
        let lifecycle =
            LifecycleController::spawn(self.cfg.clone(), Arc::clone(&bus), host, diag.clone());

        Orchestrator {
            cfg: self.cfg,
            bus,
            diag,
            side: Side::Controller {
                lifecycle,
                permission: self.permission,
            },
            listener,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{LocalServiceHost, MemoryIndicator, StaticPermission};
    use crate::transport::LocalTransport;
    use crate::error::TaskError;
    use crate::worker::{BodyFn, TaskContext};

    fn setup(permission: StaticPermission) -> (Orchestrator, Arc<LocalServiceHost>) {
        let transport: Arc<dyn Transport> = Arc::new(LocalTransport::new(64));
        let host = Arc::new(LocalServiceHost::new(
            Config::default(),
            Arc::clone(&transport),
            Arc::new(MemoryIndicator::new()),
            Arc::new(|rt: &WorkerRuntime| {
                rt.register(BodyFn::arc("wait", |ctx: TaskContext| async move {
                    ctx.stopped().await;
                    Ok::<_, TaskError>(())
                }));
            }),
        ));
        let orch = Orchestrator::builder(Config::default())
            .with_permission(Arc::new(permission))
            .build(transport, host.clone());
        (orch, host)
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_permission_warns_and_still_starts() {
        let (orch, host) = setup(StaticPermission::denied());
        let mut diag = orch.diag().subscribe();

        orch.start_task(orch.descriptor("x"), None).await.unwrap();
        assert!(orch.is_task_running());
        assert_eq!(host.launch_requests(), 1);

        let mut kinds = Vec::new();
        while let Ok(ev) = diag.try_recv() {
            kinds.push(ev.kind);
        }
        assert_eq!(kinds.first(), Some(&EventKind::PermissionDenied));
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_facade_reads_local_flag() {
        let (orch, host) = setup(StaticPermission::not_required());
        orch.start_task(orch.descriptor("x"), None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        let worker = host.worker().unwrap().orchestrator();
        assert_eq!(worker.role(), Role::Worker);
        assert!(worker.is_task_running());
        assert!(worker.check_task(None).await);
        assert_eq!(
            worker.update_status(&StatusOverrides::default().text("x")),
            Err(HostError::WrongRole {
                op: "update_status"
            })
        );

        worker.stop_task();
        tokio::time::timeout(Duration::from_secs(10), async {
            while orch.state() != RunningState::Idle {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(!worker.is_task_running());
    }
}
