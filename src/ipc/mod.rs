//! Inter-process messaging: payloads, envelopes, the wire codec and the event bus.
//!
//! ## Contents
//! - [`Payload`], [`Primitive`] the closed value union carried by messages
//! - [`MessageEnvelope`], [`Role`] and the reserved control event names
//! - [`codec`] frame encode/decode
//! - [`EventBus`] role-tagged publish/subscribe endpoint with echo suppression

pub mod codec;
mod envelope;
mod event_bus;
mod handlers;
mod payload;

pub use envelope::{CHECK, CHECK_OK, MessageEnvelope, Role, STATUS_UPDATE, STOP, is_control_event};
pub use event_bus::EventBus;
pub use handlers::Handler;
pub use payload::{Payload, Primitive};
