//! # taskhost
//!
//! **taskhost** runs one long-lived background task in an isolated worker
//! process and keeps the controlling application in sync with it.
//!
//! The two processes share no memory. Everything crosses a best-effort,
//! broadcast [`Transport`]; each side talks through a role-tagged [`EventBus`]
//! that never delivers a process its own messages. The controller keeps a
//! shadow of the worker's running state, the worker owns the truth.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!            controller process                              worker process
//! ┌─────────────────────────────────────┐        ┌─────────────────────────────────────┐
//! │  Orchestrator (facade)              │        │  WorkerService (process entry)      │
//! │   ├─ PermissionPrompt               │        │   ├─ Announcer ─► StatusIndicator   │
//! │   └─ LifecycleController (actor)    │        │   └─ WorkerRuntime                  │
//! │        ├─ StateCell (shadow)        │ launch │        ├─ ActiveInstanceFlag        │
//! │        └─ ServiceHost ──────────────┼───────►│        ├─ StateCell (authoritative) │
//! │                                     │        │        └─ Session ─► TaskBody × N   │
//! │  EventBus (Role::Controller)        │        │  EventBus (Role::Worker)            │
//! └──────────────┬──────────────────────┘        └──────────────┬──────────────────────┘
//!                │  MessageEnvelope{event, json, originIsWorker} │
//!                └──────────────► Transport (broadcast) ◄────────┘
//! ```
//!
//! ### Lifecycle
//! ```text
//! start_task ─► Idle → Starting ─► ServiceHost::launch ─┬─ ack  ─► Running
//!                                                       └─ fail ─► Idle (Err)
//! stop_task  ─► Running → Stopping ─► STOP ─► worker drains ─► exit ─► Idle
//!                                  └─ stop_grace ─► ServiceHost::terminate ─► Idle
//! ```
//!
//! Control events reserved by the core: [`STOP`], [`CHECK`], [`CHECK_OK`],
//! [`STATUS_UPDATE`].
//!
//! ## Features
//! | Area              | Description                                                 | Key types / traits                              |
//! |-------------------|-------------------------------------------------------------|-------------------------------------------------|
//! | **Facade**        | Start/stop/probe the task, exchange events.                 | [`Orchestrator`]                                |
//! | **Messaging**     | Role-tagged pub/sub over a pluggable transport.             | [`EventBus`], [`Transport`], [`Payload`]        |
//! | **Lifecycle**     | Controller state machine and running-state listeners.       | [`LifecycleController`], [`RunningState`]       |
//! | **Worker**        | Task bodies, instance guard, sessions.                      | [`WorkerRuntime`], [`TaskBody`], [`BodyFn`]     |
//! | **Host**          | OS collaborators and in-process reference implementations.  | [`ServiceHost`], [`LocalServiceHost`]           |
//! | **Diagnostics**   | Typed local events fanned out to subscribers.               | [`Event`], [`Subscribe`], [`SubscriberSet`]     |
//! | **Errors**        | Typed errors for hosting, bodies and the codec.             | [`HostError`], [`TaskError`], [`CodecError`]    |
//! | **Configuration** | Timings, capacities, indicator defaults.                    | [`Config`]                                      |
//!
//! ## Optional features
//! - `logging`: exports [`LogWriter`], a subscriber that renders diagnostic events through `tracing`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use taskhost::{
//!     BodyFn, Config, LocalServiceHost, LocalTransport, MemoryIndicator, Orchestrator,
//!     TaskContext, Transport, WorkerRuntime,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config::default();
//!     let transport: Arc<dyn Transport> = Arc::new(LocalTransport::new(cfg.bus_capacity));
//!
//!     let host = Arc::new(LocalServiceHost::new(
//!         cfg.clone(),
//!         Arc::clone(&transport),
//!         Arc::new(MemoryIndicator::new()),
//!         Arc::new(|rt: &WorkerRuntime| {
//!             rt.register(BodyFn::arc("hello", |ctx: TaskContext| async move {
//!                 ctx.emit("hello", "from worker");
//!                 ctx.stopped().await;
//!                 Ok::<_, taskhost::TaskError>(())
//!             }));
//!         }),
//!     ));
//!
//!     let orch = Orchestrator::builder(cfg).build(transport, host);
//!     orch.start_task(orch.descriptor("hello"), None).await?;
//!     assert!(orch.is_task_running());
//!     orch.stop_task();
//!     Ok(())
//! }
//! ```
mod config;
mod error;
mod events;
mod host;
mod ipc;
mod lifecycle;
mod orchestrator;
mod subscribers;
mod subscription;
mod transport;
mod worker;

// ---- Public re-exports ----

pub use config::Config;
pub use error::{CodecError, HostError, TaskError};
pub use events::{Bus, Event, EventKind};
pub use host::{
    IndicatorOp, LocalServiceHost, MemoryIndicator, PermissionPrompt, PermissionStatus,
    ProcessHandle, ServiceHost, StaticPermission, StatusIndicator, WorkerExit, WorkerImage,
};
pub use ipc::codec;
pub use ipc::{
    CHECK, CHECK_OK, EventBus, Handler, MessageEnvelope, Payload, Primitive, Role, STATUS_UPDATE,
    STOP, is_control_event,
};
pub use lifecycle::{
    Announcer, Importance, LifecycleController, RunningState, StateCell, StateListener,
    StatusOverrides, StatusSpec, TaskData, TaskDescriptor,
};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use subscribers::{Subscribe, SubscriberSet};
pub use subscription::Subscription;
pub use transport::{Frame, LocalTransport, RawSubscription, Transport};
pub use worker::{
    ActiveInstanceFlag, BodyFn, BodyRef, BoxBodyFuture, InstanceGuard, Session, SessionOutcome,
    SessionReport, SessionState, TaskBody, TaskContext, WorkerRuntime, WorkerService,
};

// Optional: a built-in subscriber that logs diagnostic events.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
