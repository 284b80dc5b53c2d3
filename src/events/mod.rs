//! Diagnostic events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `LifecycleController` actor, `Orchestrator::start_task`
//!   (permission warnings), worker `Session`, `Announcer`, `SubscriberSet` workers.
//! - **Consumers**: the per-endpoint fan-out listener spawned by
//!   [`SubscriberSet::spawn_listener`](crate::SubscriberSet::spawn_listener).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
