//! # Diagnostic event subscribers.
//!
//! This module provides the [`Subscribe`] trait and the [`SubscriberSet`]
//! fan-out used to observe diagnostic [`Event`](crate::Event)s published on a
//! local [`Bus`](crate::events::Bus).
//!
//! ## Architecture
//! ```text
//! LifecycleController ─┐
//! Session / Announcer ─┼── publish(Event) ──► Bus ──► spawn_listener
//! Orchestrator ────────┘                                   │
//!                                                   SubscriberSet::emit
//!                                                ┌─────────┼─────────┐
//!                                                ▼         ▼         ▼
//!                                            LogWriter  Metrics   Custom
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use taskhost::{Event, EventKind, Subscribe};
//! use async_trait::async_trait;
//!
//! struct LaunchCounter;
//!
//! #[async_trait]
//! impl Subscribe for LaunchCounter {
//!     async fn on_event(&self, event: &Event) {
//!         if event.kind == EventKind::Launched {
//!             // increment counter
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "launch_counter"
//!     }
//! }
//! ```

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub(crate) use set::panic_info;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
