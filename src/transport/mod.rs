//! # Cross-process delivery channel.
//!
//! A [`Transport`] moves encoded frames between the controller and worker
//! processes of one application. It is a broadcast: every frame sent reaches
//! every live subscription, **including the sender's own process**, which is
//! why echo suppression lives in [`EventBus`](crate::EventBus) and not here.
//!
//! ## Contract
//! - `send` is fire-and-forget: no return value, no delivery guarantee, never panics.
//! - Frames sent while nobody is subscribed are lost.
//! - Ordering is usually FIFO but callers must not rely on it.
//! - Dropping a [`RawSubscription`] stops delivery to it.
//!
//! ## Contents
//! - [`Transport`] the capability trait
//! - [`RawSubscription`] a stream of frames for one subscriber
//! - [`LocalTransport`] in-memory hub shared by the process images of one app

mod local;

pub use local::LocalTransport;

use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;

/// One encoded envelope as carried on the wire.
pub type Frame = Arc<str>;

/// Best-effort broadcast channel between processes of one application.
pub trait Transport: Send + Sync + 'static {
    /// Broadcasts a frame to all current subscribers. Errors are swallowed.
    fn send(&self, frame: Frame);

    /// Opens a new subscription that observes frames sent after this call.
    fn subscribe_raw(&self) -> RawSubscription;
}

/// Receiving side of a transport subscription.
///
/// Delivery stops when this value is dropped.
pub struct RawSubscription {
    frames: BoxStream<'static, Frame>,
}

impl RawSubscription {
    /// Wraps any frame stream.
    pub fn new(frames: BoxStream<'static, Frame>) -> Self {
        Self { frames }
    }

    /// Waits for the next frame; `None` once the transport is gone.
    pub async fn next(&mut self) -> Option<Frame> {
        self.frames.next().await
    }
}
