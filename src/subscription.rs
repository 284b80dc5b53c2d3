//! # Subscription handles.
//!
//! Returned by [`EventBus::on`](crate::EventBus::on) and by running-state
//! listener registration. Removal is explicit and idempotent; dropping a
//! handle does **not** unsubscribe, so fire-and-forget registrations stay alive.

use std::sync::Weak;
use std::sync::atomic::{AtomicBool, Ordering};

/// Something a subscription can detach itself from.
pub(crate) trait Detach: Send + Sync {
    fn detach(&self, id: u64);
}

/// Handle to a registered handler or listener.
pub struct Subscription {
    target: Option<Weak<dyn Detach>>,
    id: u64,
    removed: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(target: Weak<dyn Detach>, id: u64) -> Self {
        Self {
            target: Some(target),
            id,
            removed: AtomicBool::new(false),
        }
    }

    /// A handle that is already detached.
    pub fn noop() -> Self {
        Self {
            target: None,
            id: 0,
            removed: AtomicBool::new(true),
        }
    }

    /// Stops future delivery. Safe to call any number of times.
    pub fn remove(&self) {
        if self.removed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(target) = self.target.as_ref().and_then(Weak::upgrade) {
            target.detach(self.id);
        }
    }

    /// True once [`remove`](Self::remove) has been called.
    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("removed", &self.is_removed())
            .finish()
    }
}
