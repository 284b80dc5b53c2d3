//! Handler registry: event name → handlers.
//!
//! Uniqueness is per registration, not per name: the same closure registered
//! twice fires twice. Delivery order within a name is unspecified.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::subscription::Detach;

use super::payload::Payload;

/// Callback invoked on the delivery path for one event name.
pub type Handler = Arc<dyn Fn(&Payload) + Send + Sync + 'static>;

#[derive(Default)]
pub(crate) struct HandlerRegistry {
    next_id: AtomicU64,
    by_event: RwLock<HashMap<Arc<str>, Vec<(u64, Handler)>>>,
}

impl HandlerRegistry {
    pub(crate) fn insert(&self, event: Arc<str>, handler: Handler) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.by_event
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event)
            .or_default()
            .push((id, handler));
        id
    }

    /// Invokes every handler for `event`; returns how many were called.
    ///
    /// Handlers run outside the lock so they may (un)subscribe re-entrantly.
    /// A panicking handler is logged and skipped.
    pub(crate) fn dispatch(&self, event: &str, payload: &Payload) -> usize {
        let handlers: Vec<Handler> = {
            let map = self.by_event.read().unwrap_or_else(PoisonError::into_inner);
            match map.get(event) {
                Some(list) => list.iter().map(|(_, h)| Arc::clone(h)).collect(),
                None => return 0,
            }
        };
        for h in &handlers {
            if catch_unwind(AssertUnwindSafe(|| h(payload))).is_err() {
                tracing::debug!(event, "bus handler panicked; discarded");
            }
        }
        handlers.len()
    }

    pub(crate) fn len(&self, event: &str) -> usize {
        self.by_event
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .map_or(0, Vec::len)
    }
}

impl Detach for HandlerRegistry {
    fn detach(&self, id: u64) {
        let mut map = self.by_event.write().unwrap_or_else(PoisonError::into_inner);
        map.retain(|_, list| {
            list.retain(|(hid, _)| *hid != id);
            !list.is_empty()
        });
    }
}
