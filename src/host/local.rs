//! # LocalServiceHost: in-process model of the OS service facility.
//!
//! Each launched "process image" is a fresh [`WorkerRuntime`] + [`WorkerService`]
//! with its own bus endpoint, instance flag and diagnostic bus, driven by a
//! spawned tokio task. Images share only the [`Transport`] with the controller,
//! so they communicate exactly as separate processes would.
//!
//! ## Behavior
//! - One image at a time. `launch` while an image is alive re-delivers the
//!   start command to it (the OS re-invocation pattern); the duplicate-entry
//!   guard makes that a no-op.
//! - `terminate` tears the image down preemptively: the session future is
//!   dropped, bodies are aborted, the indicator is removed.
//! - The returned [`ProcessHandle`] reports `Completed` when the session ends
//!   on its own and `Killed` after `terminate`.
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use taskhost::{BodyFn, Config, LocalServiceHost, LocalTransport, MemoryIndicator, TaskContext};
//!
//! let transport = Arc::new(LocalTransport::new(1024));
//! let host = LocalServiceHost::new(
//!     Config::default(),
//!     transport,
//!     Arc::new(MemoryIndicator::new()),
//!     Arc::new(|rt: &taskhost::WorkerRuntime| {
//!         rt.register(BodyFn::arc("idle", |ctx: TaskContext| async move {
//!             ctx.stopped().await;
//!             Ok::<_, taskhost::TaskError>(())
//!         }));
//!     }),
//! );
//! # let _ = host;
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::HostError;
use crate::events::Bus;
use crate::lifecycle::TaskDescriptor;
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::transport::Transport;
use crate::worker::{SessionOutcome, WorkerRuntime, WorkerService};

use super::{ProcessHandle, ServiceHost, StatusIndicator, WorkerExit};

/// Worker "program": registers task bodies on a fresh runtime.
pub type WorkerImage = Arc<dyn Fn(&WorkerRuntime) + Send + Sync + 'static>;

struct LocalProcess {
    service: Arc<WorkerService>,
    kill: CancellationToken,
    exit: watch::Receiver<Option<WorkerExit>>,
}

impl LocalProcess {
    fn is_alive(&self) -> bool {
        self.exit.borrow().is_none()
    }
}

/// Service facility that hosts worker images as tokio tasks.
pub struct LocalServiceHost {
    cfg: Config,
    transport: Arc<dyn Transport>,
    indicator: Arc<dyn StatusIndicator>,
    image: WorkerImage,
    subscribers: Vec<Arc<dyn Subscribe>>,
    process: Mutex<Option<LocalProcess>>,
    launches: AtomicUsize,
    images: AtomicUsize,
}

impl LocalServiceHost {
    pub fn new(
        cfg: Config,
        transport: Arc<dyn Transport>,
        indicator: Arc<dyn StatusIndicator>,
        image: WorkerImage,
    ) -> Self {
        Self {
            cfg,
            transport,
            indicator,
            image,
            subscribers: Vec::new(),
            process: Mutex::new(None),
            launches: AtomicUsize::new(0),
            images: AtomicUsize::new(0),
        }
    }

    /// Diagnostic subscribers attached to every image's local bus.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Launch requests received so far.
    pub fn launch_requests(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Process images created so far.
    pub fn images_created(&self) -> usize {
        self.images.load(Ordering::SeqCst)
    }

    /// Worker service of the live image, if any.
    pub fn worker(&self) -> Option<Arc<WorkerService>> {
        self.lock()
            .as_ref()
            .filter(|p| p.is_alive())
            .map(|p| Arc::clone(&p.service))
    }

    /// Delivers the user's dismissal of the status indicator to the worker.
    pub fn dismiss_indicator(&self) {
        if let Some(service) = self.worker() {
            service.on_indicator_dismissed();
        }
    }

    fn spawn_image(&self, descriptor: &TaskDescriptor) -> LocalProcess {
        self.images.fetch_add(1, Ordering::SeqCst);
        let diag = Bus::new(self.cfg.bus_capacity_clamped());
        let listener = (!self.subscribers.is_empty()).then(|| {
            let set = Arc::new(SubscriberSet::new(self.subscribers.clone(), diag.clone()));
            set.spawn_listener(&diag)
        });

        let runtime = WorkerRuntime::new(self.cfg.clone(), Arc::clone(&self.transport), diag);
        (self.image)(runtime.as_ref());
        let service = WorkerService::new(runtime, Arc::clone(&self.indicator));

        let kill = CancellationToken::new();
        let (exit_tx, exit) = watch::channel(None);
        let task = Arc::clone(&service);
        let token = kill.clone();
        let start = descriptor.clone();
        tokio::spawn(async move {
            let exit = tokio::select! {
                outcome = task.on_start_command(start) => {
                    tracing::debug!(?outcome, "local host: worker image finished");
                    WorkerExit::Completed
                }
                _ = token.cancelled() => {
                    task.teardown();
                    WorkerExit::Killed
                }
            };
            if let Some(listener) = listener {
                listener.abort();
            }
            let _ = exit_tx.send(Some(exit));
        });

        LocalProcess {
            service,
            kill,
            exit,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<LocalProcess>> {
        self.process.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ServiceHost for LocalServiceHost {
    async fn launch(&self, descriptor: &TaskDescriptor) -> Result<ProcessHandle, HostError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let mut slot = self.lock();

        if let Some(live) = slot.as_ref().filter(|p| p.is_alive()) {
            tracing::info!(task = descriptor.name(), "local host: start re-delivered to live image");
            let service = Arc::clone(&live.service);
            let again = descriptor.clone();
            tokio::spawn(async move {
                if service.on_start_command(again).await == SessionOutcome::Duplicate {
                    tracing::debug!("local host: re-delivery absorbed by instance guard");
                }
            });
            return Ok(ProcessHandle::new(live.exit.clone()));
        }

        tracing::info!(task = descriptor.name(), "local host: launching worker image");
        let process = self.spawn_image(descriptor);
        let handle = ProcessHandle::new(process.exit.clone());
        *slot = Some(process);
        Ok(handle)
    }

    async fn terminate(&self, descriptor: &TaskDescriptor) {
        let Some(process) = self.lock().take() else {
            return;
        };
        tracing::info!(task = descriptor.name(), "local host: terminating worker image");
        process.kill.cancel();
        let mut exit = process.exit;
        let _ = exit.wait_for(Option::is_some).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryIndicator;
    use crate::ipc::{EventBus, Payload, Role, STOP};
    use crate::transport::LocalTransport;
    use crate::error::TaskError;
    use crate::worker::{BodyFn, TaskContext};
    use std::time::Duration;

    fn host(indicator: Arc<MemoryIndicator>) -> (LocalServiceHost, Arc<dyn Transport>) {
        let transport: Arc<dyn Transport> = Arc::new(LocalTransport::new(64));
        let host = LocalServiceHost::new(
            Config::default(),
            Arc::clone(&transport),
            indicator,
            Arc::new(|rt: &WorkerRuntime| {
                rt.register(BodyFn::arc("wait", |ctx: TaskContext| async move {
                    ctx.stopped().await;
                    Ok::<_, TaskError>(())
                }));
            }),
        );
        (host, transport)
    }

    #[tokio::test(start_paused = true)]
    async fn test_relaunch_reuses_live_image() {
        let ind = Arc::new(MemoryIndicator::new());
        let (host, _t) = host(Arc::clone(&ind));
        let d = TaskDescriptor::new("x");

        let _h1 = host.launch(&d).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        let _h2 = host.launch(&d).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(host.launch_requests(), 2);
        assert_eq!(host.images_created(), 1);
        assert_eq!(ind.shows(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_completes_image_and_dismisses_indicator() {
        let ind = Arc::new(MemoryIndicator::new());
        let (host, t) = host(Arc::clone(&ind));
        let ctl = EventBus::start(Role::Controller, t);

        let mut handle = host.launch(&TaskDescriptor::new("x")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(ind.current().is_some());

        ctl.emit(STOP, Payload::empty());
        assert_eq!(handle.exited().await, WorkerExit::Completed);
        assert_eq!(ind.current(), None);
        assert!(host.worker().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminate_kills_image() {
        let ind = Arc::new(MemoryIndicator::new());
        let (host, _t) = host(Arc::clone(&ind));
        let d = TaskDescriptor::new("x");

        let handle = host.launch(&d).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        let service = host.worker().unwrap();

        host.terminate(&d).await;
        assert_eq!(handle.try_exit(), Some(WorkerExit::Killed));
        assert_eq!(ind.current(), None);
        assert!(!service.runtime().is_active());
    }
}
