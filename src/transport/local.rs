//! # In-memory broadcast transport.
//!
//! [`LocalTransport`] is a thin wrapper around [`tokio::sync::broadcast`] that
//! stands in for the OS broadcast facility. One hub is shared by all process
//! images of one application; it is never visible to another application.
//!
//! ## Rules
//! - **Non-blocking send**: `send()` never blocks; it calls `broadcast::Sender::send`.
//! - **Bounded capacity**: a single ring buffer stores recent frames for all receivers.
//! - **Lag handling**: slow receivers skip the oldest frames (logged at `trace`).
//! - **No persistence**: frames are lost if there are no subscribers at send time.

use futures::stream;
use tokio::sync::broadcast::{self, error::RecvError};

use super::{Frame, RawSubscription, Transport};

/// Broadcast hub for the processes of one application.
///
/// Cheap to clone; clones share the same channel.
#[derive(Clone, Debug)]
pub struct LocalTransport {
    tx: broadcast::Sender<Frame>,
}

impl LocalTransport {
    /// Creates a hub with the given ring capacity (clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Frame>(capacity.max(1));
        Self { tx }
    }

    /// Number of live subscriptions, across all processes.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Transport for LocalTransport {
    fn send(&self, frame: Frame) {
        if self.tx.send(frame).is_err() {
            tracing::trace!("transport: frame dropped, no subscribers");
        }
    }

    fn subscribe_raw(&self) -> RawSubscription {
        let rx = self.tx.subscribe();
        let frames = stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(frame) => return Some((frame, rx)),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::trace!(skipped, "transport: subscriber lagged");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        });
        RawSubscription::new(Box::pin(frames))
    }
}
