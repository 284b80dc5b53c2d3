//! # Lifecycle controller: the controller-side state machine.
//!
//! [`LifecycleController`] is a handle to an actor task that owns the shadow
//! [`RunningState`] and talks to the [`ServiceHost`]. All entry points are
//! messages on an unbounded channel, so callers never touch the state directly.
//!
//! ## Architecture
//! ```text
//! start(descriptor) ──┐                      ┌─► ServiceHost::launch   (spawned)
//! stop() ─────────────┼─► Command ─► actor ──┼─► EventBus::emit(STOP)
//! launch ack / exit ──┘   (mpsc)             ├─► ServiceHost::terminate (after stop_grace)
//! grace timer ────────┘                      └─► StateCell::transition ─► listeners
//! ```
//!
//! ## Rules
//! - `start` outside `Idle` returns at once with no side effects.
//! - Launch failure: `Starting → Idle`, the caller gets [`HostError::LaunchFailed`].
//! - `stop` during `Starting` is remembered and applied after the launch ack.
//! - `stop` sends `STOP`; if the worker has not exited after `stop_grace`, the
//!   facility is asked to terminate it. The first of worker exit or terminate
//!   ack moves `Stopping → Idle`.
//! - A worker that completes on its own goes `Running → Stopping → Idle`; a
//!   hard kill goes `Running → Idle`.
//! - Every async result is tagged with a launch generation; stale ones are dropped.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::HostError;
use crate::events::{Bus, Event, EventKind};
use crate::host::{ProcessHandle, ServiceHost, WorkerExit};
use crate::ipc::{CHECK, CHECK_OK, EventBus, Payload, Role, STOP};
use crate::subscription::Subscription;

use super::descriptor::TaskDescriptor;
use super::state::{RunningState, StateCell, StateListener};

enum Command {
    Start {
        descriptor: TaskDescriptor,
        reply: oneshot::Sender<Result<(), HostError>>,
    },
    Stop,
    Launched {
        generation: u64,
        result: Result<ProcessHandle, HostError>,
    },
    Exited {
        generation: u64,
        exit: WorkerExit,
    },
    StopGraceElapsed {
        generation: u64,
    },
    Terminated {
        generation: u64,
    },
}

/// Handle to the controller-side lifecycle actor.
///
/// Dropping the handle stops the actor.
pub struct LifecycleController {
    tx: mpsc::UnboundedSender<Command>,
    state: Arc<StateCell>,
    bus: Arc<EventBus>,
    shutdown: CancellationToken,
}

impl LifecycleController {
    /// Spawns the actor. Must be called inside a tokio runtime.
    pub fn spawn(cfg: Config, bus: Arc<EventBus>, host: Arc<dyn ServiceHost>, diag: Bus) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = StateCell::new();
        let shutdown = CancellationToken::new();

        let actor = Actor {
            cfg,
            host,
            bus: Arc::clone(&bus),
            diag,
            state: Arc::clone(&state),
            tx: tx.clone(),
            generation: 0,
            active: None,
        };
        tokio::spawn(actor.run(rx, shutdown.clone()));

        Self {
            tx,
            state,
            bus,
            shutdown,
        }
    }

    /// Starts the worker unless a session is already active.
    ///
    /// Resolves once the facility acknowledged or declined the launch; a call
    /// made outside `Idle` resolves immediately with `Ok(())`.
    pub async fn start(&self, descriptor: TaskDescriptor) -> Result<(), HostError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Start { descriptor, reply })
            .map_err(|_| HostError::Closed)?;
        rx.await.map_err(|_| HostError::Closed)?
    }

    /// Requests a stop. No-op in `Idle`.
    pub fn stop(&self) {
        if self.tx.send(Command::Stop).is_err() {
            tracing::debug!("lifecycle: stop after actor shutdown");
        }
    }

    /// Last-known projection; never ground truth.
    pub fn state(&self) -> RunningState {
        self.state.get()
    }

    pub fn is_running(&self) -> bool {
        self.state.get().is_running()
    }

    /// Registers a running-state listener; it sees the current state first.
    pub fn subscribe(&self, listener: StateListener) -> Subscription {
        self.state.subscribe(listener)
    }

    /// Liveness probe: `true` iff a worker answers `CHECK` within `timeout`.
    ///
    /// Advisory only; the shadow state is left untouched.
    pub async fn check_task(&self, timeout: Duration) -> bool {
        probe(&self.bus, timeout).await
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Emits `CHECK` on `bus` and waits for the first `CHECK_OK`.
pub(crate) async fn probe(bus: &EventBus, timeout: Duration) -> bool {
    let (tx, rx) = oneshot::channel::<()>();
    let slot = Mutex::new(Some(tx));
    let sub = bus.on(CHECK_OK, move |_| {
        if let Some(tx) = slot.lock().unwrap_or_else(PoisonError::into_inner).take() {
            let _ = tx.send(());
        }
    });
    bus.emit(CHECK, Payload::empty());
    let alive = matches!(tokio::time::timeout(timeout, rx).await, Ok(Ok(())));
    sub.remove();
    tracing::debug!(alive, ?timeout, "lifecycle: check_task");
    alive
}

struct Active {
    descriptor: TaskDescriptor,
    generation: u64,
    reply: Option<oneshot::Sender<Result<(), HostError>>>,
    pending_stop: bool,
}

struct Actor {
    cfg: Config,
    host: Arc<dyn ServiceHost>,
    bus: Arc<EventBus>,
    diag: Bus,
    state: Arc<StateCell>,
    tx: mpsc::UnboundedSender<Command>,
    generation: u64,
    active: Option<Active>,
}

impl Actor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                cmd = rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
            }
        }
        tracing::debug!("lifecycle: actor stopped");
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Start { descriptor, reply } => self.on_start(descriptor, reply),
            Command::Stop => self.on_stop(),
            Command::Launched { generation, result } => self.on_launched(generation, result),
            Command::Exited { generation, exit } => self.on_exited(generation, exit),
            Command::StopGraceElapsed { generation } => self.on_stop_grace(generation),
            Command::Terminated { generation } => self.on_terminated(generation),
        }
    }

    fn on_start(&mut self, descriptor: TaskDescriptor, reply: oneshot::Sender<Result<(), HostError>>) {
        let current = self.state.get();
        if current != RunningState::Idle {
            tracing::debug!(task = descriptor.name(), state = %current, "lifecycle: start ignored");
            self.diag.publish(
                Event::new(EventKind::StartIgnored)
                    .with_task(descriptor.name())
                    .with_state(current),
            );
            let _ = reply.send(Ok(()));
            return;
        }

        self.generation += 1;
        let generation = self.generation;
        tracing::info!(task = descriptor.name(), "lifecycle: starting");
        self.diag
            .publish(Event::new(EventKind::StartRequested).with_task(descriptor.name()));
        self.set_state(RunningState::Starting);

        let host = Arc::clone(&self.host);
        let tx = self.tx.clone();
        let launch = descriptor.clone();
        tokio::spawn(async move {
            let result = host.launch(&launch).await;
            let _ = tx.send(Command::Launched { generation, result });
        });

        self.active = Some(Active {
            descriptor,
            generation,
            reply: Some(reply),
            pending_stop: false,
        });
    }

    fn on_launched(&mut self, generation: u64, result: Result<ProcessHandle, HostError>) {
        let Some(active) = self.active.as_mut().filter(|a| a.generation == generation) else {
            return;
        };
        let task = active.descriptor.name().to_string();
        let reply = active.reply.take();

        match result {
            Ok(mut handle) => {
                tracing::info!(task = %task, "lifecycle: worker launched");
                self.diag
                    .publish(Event::new(EventKind::Launched).with_task(task.as_str()));
                let pending_stop = active.pending_stop;
                self.set_state(RunningState::Running);
                if let Some(reply) = reply {
                    let _ = reply.send(Ok(()));
                }

                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let exit = handle.exited().await;
                    let _ = tx.send(Command::Exited { generation, exit });
                });

                if pending_stop {
                    self.begin_stop();
                }
            }
            Err(e) => {
                tracing::warn!(task = %task, error = %e, "lifecycle: launch failed");
                self.diag.publish(
                    Event::new(EventKind::LaunchFailed)
                        .with_task(task.as_str())
                        .with_reason(e.to_string()),
                );
                self.active = None;
                self.set_state(RunningState::Idle);
                if let Some(reply) = reply {
                    let _ = reply.send(Err(e));
                }
            }
        }
    }

    fn on_stop(&mut self) {
        match self.state.get() {
            RunningState::Idle => tracing::debug!("lifecycle: stop ignored while idle"),
            RunningState::Starting => {
                if let Some(active) = self.active.as_mut() {
                    tracing::debug!("lifecycle: stop deferred until launch ack");
                    active.pending_stop = true;
                }
            }
            RunningState::Running => self.begin_stop(),
            RunningState::Stopping => tracing::debug!("lifecycle: already stopping"),
        }
    }

    fn begin_stop(&mut self) {
        let Some(active) = self.active.as_ref() else {
            return;
        };
        let generation = active.generation;
        let task = active.descriptor.name().to_string();

        self.set_state(RunningState::Stopping);
        self.bus.emit(STOP, Payload::empty());
        tracing::info!(task = %task, "lifecycle: STOP sent");
        self.diag
            .publish(Event::new(EventKind::StopRequested).with_task(task));

        let tx = self.tx.clone();
        let grace = self.cfg.stop_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = tx.send(Command::StopGraceElapsed { generation });
        });
    }

    fn on_stop_grace(&mut self, generation: u64) {
        let Some(active) = self.current(generation) else {
            return;
        };
        if self.state.get() != RunningState::Stopping {
            return;
        }
        let descriptor = active.descriptor.clone();
        tracing::warn!(task = descriptor.name(), "lifecycle: worker still alive after stop grace; terminating");
        self.diag
            .publish(Event::new(EventKind::TerminateIssued).with_task(descriptor.name()));

        let host = Arc::clone(&self.host);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            host.terminate(&descriptor).await;
            let _ = tx.send(Command::Terminated { generation });
        });
    }

    fn on_terminated(&mut self, generation: u64) {
        if self.current(generation).is_none() {
            return;
        }
        self.finish(generation, "terminated");
    }

    fn on_exited(&mut self, generation: u64, exit: WorkerExit) {
        if self.current(generation).is_none() {
            return;
        }
        match (self.state.get(), exit) {
            (RunningState::Running, WorkerExit::Completed) => {
                self.set_state(RunningState::Stopping);
                self.finish(generation, "completed");
            }
            (_, WorkerExit::Completed) => self.finish(generation, "completed"),
            (_, WorkerExit::Killed) => self.finish(generation, "killed"),
        }
    }

    fn finish(&mut self, generation: u64, how: &'static str) {
        let Some(active) = self.active.take() else {
            return;
        };
        tracing::info!(task = active.descriptor.name(), how, generation, "lifecycle: worker gone");
        self.diag.publish(
            Event::new(EventKind::WorkerExited)
                .with_task(active.descriptor.name())
                .with_reason(how),
        );
        self.set_state(RunningState::Idle);
    }

    fn current(&self, generation: u64) -> Option<&Active> {
        self.active.as_ref().filter(|a| a.generation == generation)
    }

    fn set_state(&self, next: RunningState) {
        if self.state.transition(next) {
            self.diag.publish(
                Event::new(EventKind::StateChanged)
                    .with_state(next)
                    .with_role(Role::Controller),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::WorkerExit;
    use crate::transport::{LocalTransport, Transport};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::watch;

    /// Facility whose worker never exits until terminated.
    #[derive(Default)]
    struct FakeHost {
        launches: AtomicUsize,
        terminates: AtomicUsize,
        exit: Mutex<Option<watch::Sender<Option<WorkerExit>>>>,
        refuse: bool,
    }

    #[async_trait]
    impl ServiceHost for FakeHost {
        async fn launch(&self, descriptor: &TaskDescriptor) -> Result<ProcessHandle, HostError> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            if self.refuse {
                return Err(HostError::LaunchFailed {
                    task: descriptor.name().to_string(),
                    reason: "no slot".into(),
                });
            }
            let (tx, rx) = watch::channel(None);
            *self.exit.lock().unwrap() = Some(tx);
            Ok(ProcessHandle::new(rx))
        }

        async fn terminate(&self, _descriptor: &TaskDescriptor) {
            self.terminates.fetch_add(1, Ordering::SeqCst);
            if let Some(tx) = self.exit.lock().unwrap().take() {
                let _ = tx.send(Some(WorkerExit::Killed));
            }
        }
    }

    impl FakeHost {
        fn complete(&self) {
            self.exit_with(WorkerExit::Completed);
        }

        fn kill(&self) {
            self.exit_with(WorkerExit::Killed);
        }

        fn exit_with(&self, exit: WorkerExit) {
            if let Some(tx) = self.exit.lock().unwrap().take() {
                let _ = tx.send(Some(exit));
            }
        }
    }

    fn controller(host: Arc<FakeHost>) -> (LifecycleController, Arc<Mutex<Vec<RunningState>>>) {
        let transport: Arc<dyn Transport> = Arc::new(LocalTransport::new(64));
        let bus = EventBus::start(Role::Controller, transport);
        let ctl = LifecycleController::spawn(Config::default(), bus, host, Bus::new(64));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let _sub = ctl.subscribe(Arc::new(move |st| s.lock().unwrap().push(st)));
        (ctl, seen)
    }

    async fn wait_for(ctl: &LifecycleController, want: RunningState) {
        tokio::time::timeout(Duration::from_secs(30), async {
            while ctl.state() != want {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent_while_active() {
        let host = Arc::new(FakeHost::default());
        let (ctl, seen) = controller(Arc::clone(&host));

        ctl.start(TaskDescriptor::new("x")).await.unwrap();
        ctl.start(TaskDescriptor::new("x")).await.unwrap();
        assert_eq!(host.launches.load(Ordering::SeqCst), 1);
        assert!(ctl.is_running());
        assert_eq!(
            *seen.lock().unwrap(),
            vec![RunningState::Idle, RunningState::Starting, RunningState::Running]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_during_starting_does_not_relaunch() {
        let host = Arc::new(FakeHost::default());
        let (ctl, _seen) = controller(Arc::clone(&host));

        let (a, b) = tokio::join!(
            ctl.start(TaskDescriptor::new("x")),
            ctl.start(TaskDescriptor::new("x"))
        );
        assert!(a.is_ok() && b.is_ok());
        wait_for(&ctl, RunningState::Running).await;
        assert_eq!(host.launches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_failure_returns_to_idle() {
        let host = Arc::new(FakeHost {
            refuse: true,
            ..FakeHost::default()
        });
        let (ctl, seen) = controller(Arc::clone(&host));

        let err = ctl.start(TaskDescriptor::new("x")).await.unwrap_err();
        assert_eq!(err.as_label(), "host_launch_failed");
        assert_eq!(ctl.state(), RunningState::Idle);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![RunningState::Idle, RunningState::Starting, RunningState::Idle]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresponsive_worker_is_terminated_after_grace() {
        let host = Arc::new(FakeHost::default());
        let (ctl, seen) = controller(Arc::clone(&host));

        ctl.start(TaskDescriptor::new("x")).await.unwrap();
        ctl.stop();
        wait_for(&ctl, RunningState::Idle).await;

        assert_eq!(host.terminates.load(Ordering::SeqCst), 1);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                RunningState::Idle,
                RunningState::Starting,
                RunningState::Running,
                RunningState::Stopping,
                RunningState::Idle,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_self_completion_passes_through_stopping() {
        let host = Arc::new(FakeHost::default());
        let (ctl, seen) = controller(Arc::clone(&host));

        ctl.start(TaskDescriptor::new("x")).await.unwrap();
        host.complete();
        wait_for(&ctl, RunningState::Idle).await;

        assert_eq!(host.terminates.load(Ordering::SeqCst), 0);
        assert_eq!(seen.lock().unwrap().last(), Some(&RunningState::Idle));
        assert!(seen.lock().unwrap().contains(&RunningState::Stopping));
    }

    #[tokio::test(start_paused = true)]
    async fn test_os_kill_while_running_skips_stopping() {
        let host = Arc::new(FakeHost::default());
        let (ctl, seen) = controller(Arc::clone(&host));

        ctl.start(TaskDescriptor::new("x")).await.unwrap();
        host.kill();
        wait_for(&ctl, RunningState::Idle).await;

        assert_eq!(host.terminates.load(Ordering::SeqCst), 0);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                RunningState::Idle,
                RunningState::Starting,
                RunningState::Running,
                RunningState::Idle,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_starting_is_deferred() {
        let host = Arc::new(FakeHost::default());
        let (ctl, _seen) = controller(Arc::clone(&host));

        let start = ctl.start(TaskDescriptor::new("x"));
        tokio::pin!(start);
        // Let the actor move to Starting before stopping.
        tokio::select! {
            _ = &mut start => panic!("launch should still be pending"),
            _ = tokio::time::sleep(Duration::from_millis(1)) => {}
        }
        assert_eq!(ctl.state(), RunningState::Starting);
        ctl.stop();
        start.await.unwrap();
        wait_for(&ctl, RunningState::Idle).await;
        assert_eq!(host.terminates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_task_false_without_worker() {
        let host = Arc::new(FakeHost::default());
        let (ctl, _seen) = controller(host);
        assert!(!ctl.check_task(Duration::from_millis(1000)).await);
    }
}
