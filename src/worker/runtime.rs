//! # Worker runtime: one session per process image.
//!
//! [`WorkerRuntime`] lives inside the worker process. It owns the registered
//! task bodies, the [`ActiveInstanceFlag`], the authoritative running state and
//! the worker's bus endpoint.
//!
//! ## Session flow
//! ```text
//! enter(task)
//!   ├─ image already retired ─────────────► Err(SessionOutcome::Retired)
//!   ├─ flag taken (concurrent entry) ─────► Err(SessionOutcome::Duplicate)
//!   └─ flag acquired ─► Starting ─► Session
//!
//! Session::run(data)
//!   ├─► settle_grace (cancellable)           STOP here ─► Starting → Idle
//!   ├─► Running: spawn every body in a JoinSet with a child token
//!   ├─► wait for all bodies OR STOP
//!   ├─► Stopping
//!   │     └─ STOP with bodies left ─► Draining: wait up to drain_grace,
//!   │                                 abort the rest (DrainExceeded)
//!   └─► Idle, flag cleared, image Terminated
//! ```
//!
//! ## Rules
//! - A failing or panicking body never cancels its siblings.
//! - `STOP` is a signal: bodies observe it through their token.
//! - `CHECK` is answered with `CHECK_OK` while the flag is held.
//! - `Terminated` is absorbing; a new session needs a new process image.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use futures::FutureExt;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::TaskError;
use crate::events::{Bus, Event, EventKind};
use crate::ipc::{CHECK, CHECK_OK, EventBus, Role, STOP};
use crate::lifecycle::{RunningState, StateCell, TaskData};
use crate::subscribers::panic_info;
use crate::subscription::Subscription;
use crate::transport::Transport;

use super::body::{BodyRef, TaskContext};
use super::guard::{ActiveInstanceFlag, InstanceGuard};

/// Phase of the single session a process image may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    NotStarted,
    Running,
    /// `STOP` observed; bodies may still be finishing.
    Draining,
    Terminated,
}

/// Body outcome counts for one finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionReport {
    pub completed: usize,
    pub failed: usize,
    /// Bodies still running when the drain grace ran out.
    pub abandoned: usize,
    pub stop_observed: bool,
}

/// Result of handing a start command to a worker process image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Another session holds the active instance flag; nothing ran.
    Duplicate,
    /// This image already ran its session.
    Retired,
    Completed(SessionReport),
}

struct Slot {
    phase: SessionState,
    stop: Option<CancellationToken>,
    // STOP seen before any session opened; the next entry starts cancelled.
    stop_pending: bool,
}

impl Slot {
    fn signal_stop(&mut self) {
        match &self.stop {
            Some(token) => token.cancel(),
            None if self.phase == SessionState::NotStarted => self.stop_pending = true,
            None => {}
        }
    }
}

type BodyResult = (Arc<str>, Result<Result<(), TaskError>, Box<dyn Any + Send>>);

/// Worker-side runtime for one process image.
pub struct WorkerRuntime {
    cfg: Config,
    bus: Arc<EventBus>,
    diag: Bus,
    bodies: RwLock<Vec<BodyRef>>,
    flag: Arc<ActiveInstanceFlag>,
    state: Arc<StateCell>,
    slot: Arc<Mutex<Slot>>,
    control: Vec<Subscription>,
}

impl WorkerRuntime {
    /// Opens the worker bus endpoint and installs the `STOP`/`CHECK` handlers.
    pub fn new(cfg: Config, transport: Arc<dyn Transport>, diag: Bus) -> Arc<Self> {
        let bus = EventBus::start(Role::Worker, transport);
        let flag = ActiveInstanceFlag::new();
        let slot = Arc::new(Mutex::new(Slot {
            phase: SessionState::NotStarted,
            stop: None,
            stop_pending: false,
        }));

        let stop_slot = Arc::clone(&slot);
        let on_stop = bus.on(STOP, move |_| {
            tracing::debug!("worker: STOP received");
            stop_slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .signal_stop();
        });

        let check_flag = Arc::clone(&flag);
        let reply_bus: Weak<EventBus> = Arc::downgrade(&bus);
        let on_check = bus.on(CHECK, move |_| {
            if !check_flag.is_set() {
                return;
            }
            if let Some(bus) = reply_bus.upgrade() {
                bus.emit(CHECK_OK, true);
            }
        });

        Arc::new(Self {
            cfg,
            bus,
            diag,
            bodies: RwLock::new(Vec::new()),
            flag,
            state: StateCell::new(),
            slot,
            control: vec![on_stop, on_check],
        })
    }

    /// Appends a body; every registered body runs concurrently per session.
    pub fn register(&self, body: BodyRef) {
        tracing::debug!(body = body.name(), "worker: body registered");
        self.bodies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(body);
    }

    pub fn body_count(&self) -> usize {
        self.bodies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Claims the active instance flag and opens a session.
    ///
    /// A refused entry leaves the running session (if any) untouched.
    pub fn enter(self: &Arc<Self>, task: impl Into<Arc<str>>) -> Result<Session, SessionOutcome> {
        let task: Arc<str> = task.into();
        let mut slot = self.lock_slot();
        if slot.phase == SessionState::Terminated {
            tracing::info!(task = %task, "worker: image already retired; start ignored");
            return Err(SessionOutcome::Retired);
        }
        let Some(guard) = self.flag.try_acquire() else {
            tracing::info!(task = %task, "worker: duplicate entry; exiting without running bodies");
            self.diag
                .publish(Event::new(EventKind::DuplicateEntry).with_task(Arc::clone(&task)));
            return Err(SessionOutcome::Duplicate);
        };

        let token = CancellationToken::new();
        if std::mem::take(&mut slot.stop_pending) {
            tracing::debug!(task = %task, "worker: STOP arrived before entry; session opens stopped");
            token.cancel();
        }
        slot.phase = SessionState::Running;
        slot.stop = Some(token.clone());
        drop(slot);

        self.set_state(RunningState::Starting);
        self.diag
            .publish(Event::new(EventKind::SessionStarted).with_task(Arc::clone(&task)));
        Ok(Session {
            runtime: Arc::clone(self),
            guard,
            token,
            task,
        })
    }

    /// Asks the current session to stop, as if `STOP` had arrived.
    ///
    /// Before the first entry the request is latched and the session opens
    /// already stopped.
    pub fn request_stop(&self) {
        self.lock_slot().signal_stop();
    }

    /// True while a session holds the active instance flag.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.flag.is_set()
    }

    pub fn session_state(&self) -> SessionState {
        self.lock_slot().phase
    }

    /// Authoritative running state of this process image.
    pub fn running_state(&self) -> RunningState {
        self.state.get()
    }

    pub fn state_cell(&self) -> &Arc<StateCell> {
        &self.state
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn diag(&self) -> &Bus {
        &self.diag
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Marks the image dead after an external teardown.
    pub(crate) fn force_terminated(&self) {
        {
            let mut slot = self.lock_slot();
            if let Some(token) = slot.stop.take() {
                token.cancel();
            }
            slot.phase = SessionState::Terminated;
        }
        self.set_state(RunningState::Idle);
        for sub in &self.control {
            sub.remove();
        }
    }

    fn bodies(&self) -> Vec<BodyRef> {
        self.bodies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_state(&self, next: RunningState) {
        if self.state.transition(next) {
            self.diag.publish(
                Event::new(EventKind::StateChanged)
                    .with_state(next)
                    .with_role(Role::Worker),
            );
        }
    }

    fn set_phase(&self, phase: SessionState) {
        self.lock_slot().phase = phase;
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, report: &mut SessionReport, joined: Result<BodyResult, JoinError>) {
        let (name, reason) = match joined {
            Ok((_, Ok(Ok(())))) => {
                report.completed += 1;
                return;
            }
            Ok((_, Ok(Err(e)))) if e.is_cancellation() => {
                report.completed += 1;
                return;
            }
            Ok((name, Ok(Err(e)))) => (name, e.to_string()),
            Ok((name, Err(panic))) => (name, format!("panicked: {}", panic_info(panic.as_ref()))),
            Err(e) => (Arc::from("unknown"), e.to_string()),
        };
        report.failed += 1;
        tracing::warn!(body = %name, error = %reason, "worker: body failed");
        self.diag.publish(
            Event::new(EventKind::BodyFailed)
                .with_task(name)
                .with_reason(reason),
        );
    }
}

/// An admitted session; holds the active instance flag until it ends.
pub struct Session {
    runtime: Arc<WorkerRuntime>,
    guard: InstanceGuard,
    token: CancellationToken,
    task: Arc<str>,
}

impl Session {
    pub fn task(&self) -> &str {
        &self.task
    }

    /// Runs every registered body to completion or until `STOP`.
    pub async fn run(self, data: Arc<TaskData>) -> SessionReport {
        let Session {
            runtime: rt,
            guard,
            token,
            task,
        } = self;
        let mut report = SessionReport::default();

        let settled = tokio::select! {
            biased;
            _ = token.cancelled() => false,
            _ = tokio::time::sleep(rt.cfg.settle_grace) => true,
        };

        if settled {
            rt.set_state(RunningState::Running);
            let mut set: JoinSet<BodyResult> = JoinSet::new();
            for body in rt.bodies() {
                let ctx = TaskContext::new(Arc::clone(&data), token.child_token(), Arc::clone(&rt.bus));
                let name: Arc<str> = Arc::from(body.name());
                set.spawn(async move {
                    let res = AssertUnwindSafe(body.spawn(ctx)).catch_unwind().await;
                    (name, res)
                });
            }

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    joined = set.join_next() => match joined {
                        Some(j) => rt.record(&mut report, j),
                        None => break,
                    },
                }
            }

            rt.set_state(RunningState::Stopping);
            if !set.is_empty() {
                rt.set_phase(SessionState::Draining);
                rt.diag.publish(Event::new(EventKind::StopObserved).with_task(Arc::clone(&task)));
                tracing::info!(task = %task, pending = set.len(), "worker: draining");

                if let Some(limit) = rt.cfg.drain_limit() {
                    let drain = async {
                        while let Some(j) = set.join_next().await {
                            rt.record(&mut report, j);
                        }
                    };
                    let _ = tokio::time::timeout(limit, drain).await;
                }

                report.abandoned = set.len();
                if report.abandoned > 0 {
                    tracing::warn!(task = %task, abandoned = report.abandoned, "worker: drain grace exceeded");
                    rt.diag.publish(
                        Event::new(EventKind::DrainExceeded)
                            .with_task(Arc::clone(&task))
                            .with_reason(format!("abandoned={}", report.abandoned)),
                    );
                    set.abort_all();
                }
            }
        }

        report.stop_observed = token.is_cancelled();
        rt.set_state(RunningState::Idle);
        {
            let mut slot = rt.lock_slot();
            slot.phase = SessionState::Terminated;
            slot.stop = None;
        }
        drop(guard);

        tracing::info!(
            task = %task,
            completed = report.completed,
            failed = report.failed,
            abandoned = report.abandoned,
            stop_observed = report.stop_observed,
            "worker: session ended"
        );
        rt.diag.publish(
            Event::new(EventKind::SessionEnded)
                .with_task(task)
                .with_reason(format!(
                    "completed={} failed={} abandoned={}",
                    report.completed, report.failed, report.abandoned
                )),
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::Payload;
    use crate::transport::LocalTransport;
    use crate::worker::BodyFn;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn setup(cfg: Config) -> (Arc<WorkerRuntime>, Arc<EventBus>) {
        let transport: Arc<dyn Transport> = Arc::new(LocalTransport::new(64));
        let ctl = EventBus::start(Role::Controller, Arc::clone(&transport));
        let rt = WorkerRuntime::new(cfg, transport, Bus::new(64));
        (rt, ctl)
    }

    fn record_states(rt: &WorkerRuntime) -> Arc<Mutex<Vec<RunningState>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let _sub = rt
            .state_cell()
            .subscribe(Arc::new(move |st| s.lock().unwrap().push(st)));
        seen
    }

    #[tokio::test(start_paused = true)]
    async fn test_bodies_run_concurrently_and_failures_are_isolated() {
        let (rt, _ctl) = setup(Config::default());
        let finished = Arc::new(AtomicUsize::new(0));

        let f = Arc::clone(&finished);
        rt.register(BodyFn::arc("slow", move |_ctx: TaskContext| {
            let f = Arc::clone(&f);
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                f.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TaskError>(())
            }
        }));
        rt.register(BodyFn::arc("failing", |_ctx: TaskContext| async {
            Err(TaskError::fail("nope"))
        }));
        rt.register(BodyFn::arc("panicking", |_ctx: TaskContext| async {
            panic!("body exploded");
        }));

        let states = record_states(&rt);
        let session = rt.enter("job").ok().unwrap();
        let report = session.run(Arc::new(TaskData::new())).await;

        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(
            report,
            SessionReport {
                completed: 1,
                failed: 2,
                abandoned: 0,
                stop_observed: false,
            }
        );
        assert_eq!(
            *states.lock().unwrap(),
            vec![
                RunningState::Idle,
                RunningState::Starting,
                RunningState::Running,
                RunningState::Stopping,
                RunningState::Idle,
            ]
        );
        assert!(!rt.is_active());
        assert_eq!(rt.session_state(), SessionState::Terminated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_bodies_and_drains() {
        let (rt, ctl) = setup(Config::default());
        rt.register(BodyFn::arc("loop", |ctx: TaskContext| async move {
            ctx.stopped().await;
            Err(TaskError::Canceled)
        }));

        let session = rt.enter("job").ok().unwrap();
        let run = tokio::spawn(session.run(Arc::new(TaskData::new())));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(rt.running_state(), RunningState::Running);

        ctl.emit(STOP, Payload::empty());
        let report = run.await.unwrap();

        assert!(report.stop_observed);
        assert_eq!(report.completed, 1);
        assert_eq!(report.abandoned, 0);
        assert_eq!(rt.running_state(), RunningState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stubborn_body_is_abandoned_after_drain_grace() {
        let mut cfg = Config::default();
        cfg.drain_grace = Duration::from_millis(200);
        let (rt, _ctl) = setup(cfg);
        rt.register(BodyFn::arc("stubborn", |_ctx: TaskContext| async {
            std::future::pending::<()>().await;
            Ok::<_, TaskError>(())
        }));

        let session = rt.enter("job").ok().unwrap();
        let run = tokio::spawn(session.run(Arc::new(TaskData::new())));
        tokio::time::sleep(Duration::from_millis(150)).await;
        rt.request_stop();
        let report = run.await.unwrap();

        assert_eq!(report.abandoned, 1);
        assert!(report.stop_observed);
        assert!(!rt.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_entry_is_latched() {
        let (rt, ctl) = setup(Config::default());
        let ran = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&ran);
        rt.register(BodyFn::arc("never", move |_ctx: TaskContext| {
            let r = Arc::clone(&r);
            async move {
                r.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TaskError>(())
            }
        }));

        ctl.emit(STOP, Payload::empty());
        tokio::time::sleep(Duration::from_millis(30)).await;

        let states = record_states(&rt);
        let session = rt.enter("job").ok().unwrap();
        let report = session.run(Arc::new(TaskData::new())).await;

        assert!(report.stop_observed);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(
            *states.lock().unwrap(),
            vec![RunningState::Idle, RunningState::Starting, RunningState::Idle]
        );
        assert_eq!(rt.session_state(), SessionState::Terminated);
    }

    #[tokio::test]
    async fn test_second_entry_is_refused_and_image_retires() {
        let (rt, _ctl) = setup(Config {
            settle_grace: Duration::ZERO,
            ..Config::default()
        });

        let session = rt.enter("job").ok().unwrap();
        assert_eq!(rt.enter("job").err(), Some(SessionOutcome::Duplicate));
        assert_eq!(session.task(), "job");

        session.run(Arc::new(TaskData::new())).await;
        assert_eq!(rt.enter("job").err(), Some(SessionOutcome::Retired));
    }

    #[tokio::test]
    async fn test_check_answered_only_while_active() {
        let (rt, ctl) = setup(Config::default());
        let replies = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&replies);
        let _sub = ctl.on(CHECK_OK, move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        });

        ctl.emit(CHECK, Payload::empty());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(replies.load(Ordering::SeqCst), 0);

        let _session = rt.enter("job").ok().unwrap();
        ctl.emit(CHECK, Payload::empty());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(replies.load(Ordering::SeqCst), 1);
    }
}
