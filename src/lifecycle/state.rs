//! # Running state and its projection.
//!
//! [`RunningState`] is the four-state lifecycle of a task session.
//! [`StateCell`] holds one copy of it together with its listeners. The worker
//! process owns the authoritative copy; the controller's copy is a shadow fed
//! only by lifecycle notifications and must never be treated as ground truth.
//!
//! ## Transitions
//! ```text
//! Idle ──► Starting ──► Running ──► Stopping ──► Idle
//!             │             │
//!             └─(launch     └─(hard kill by the OS)──► Idle
//!                failed)──► Idle
//! ```
//! Normal completion always passes through `Stopping`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::subscription::{Detach, Subscription};

/// Lifecycle state of a task session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RunningState {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
}

impl RunningState {
    /// True only in [`RunningState::Running`].
    #[inline]
    pub fn is_running(self) -> bool {
        matches!(self, RunningState::Running)
    }

    /// Allowed edges, including the two failure edges back to `Idle`.
    pub fn can_transition_to(self, next: RunningState) -> bool {
        use RunningState::*;
        matches!(
            (self, next),
            (Idle, Starting)
                | (Starting, Running)
                | (Running, Stopping)
                | (Stopping, Idle)
                | (Starting, Idle)
                | (Running, Idle)
        )
    }

    #[inline]
    pub fn as_label(self) -> &'static str {
        match self {
            RunningState::Idle => "idle",
            RunningState::Starting => "starting",
            RunningState::Running => "running",
            RunningState::Stopping => "stopping",
        }
    }
}

impl fmt::Display for RunningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Listener for running-state changes.
pub type StateListener = Arc<dyn Fn(RunningState) + Send + Sync + 'static>;

struct Inner {
    state: RunningState,
    // Bumped on every accepted transition; starts at 1.
    version: u64,
    listeners: Vec<Arc<Entry>>,
}

struct Entry {
    id: u64,
    listener: StateListener,
    // Highest version handed to `listener`.
    seen: AtomicU64,
}

impl Entry {
    /// Delivers `state` unless a newer version already reached this listener.
    fn deliver(&self, state: RunningState, version: u64) {
        if self.seen.fetch_max(version, Ordering::AcqRel) >= version {
            return;
        }
        let l = &self.listener;
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| l(state))).is_err() {
            tracing::debug!(%state, "running-state listener panicked; discarded");
        }
    }
}

/// A running-state value plus its change listeners.
pub struct StateCell {
    next_id: AtomicU64,
    inner: Mutex<Inner>,
}

impl Default for StateCell {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            inner: Mutex::new(Inner {
                state: RunningState::Idle,
                version: 1,
                listeners: Vec::new(),
            }),
        }
    }
}

impl StateCell {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Current projection.
    pub fn get(&self) -> RunningState {
        self.lock().state
    }

    /// Moves to `next` and notifies listeners.
    ///
    /// Returns `false` (and changes nothing) for a disallowed edge or a no-op.
    /// Listeners run outside the lock.
    pub fn transition(&self, next: RunningState) -> bool {
        let (prev, version, listeners) = {
            let mut inner = self.lock();
            let prev = inner.state;
            if !prev.can_transition_to(next) {
                return false;
            }
            inner.state = next;
            inner.version += 1;
            (prev, inner.version, inner.listeners.clone())
        };
        tracing::debug!(from = %prev, to = %next, "running state changed");
        for entry in &listeners {
            entry.deliver(next, version);
        }
        true
    }

    /// Registers `listener`, delivering the current state immediately.
    ///
    /// The snapshot is delivered outside the lock. If a concurrent transition
    /// reaches the listener first, the older snapshot is skipped, so a
    /// listener never sees a state older than one it has already seen.
    pub fn subscribe(self: &Arc<Self>, listener: StateListener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let entry = Arc::new(Entry {
            id,
            listener,
            seen: AtomicU64::new(0),
        });
        let (current, version) = {
            let mut inner = self.lock();
            inner.listeners.push(Arc::clone(&entry));
            (inner.state, inner.version)
        };
        entry.deliver(current, version);
        let target: Weak<StateCell> = Arc::downgrade(self);
        Subscription::new(target, id)
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Detach for StateCell {
    fn detach(&self, id: u64) {
        self.lock().listeners.retain(|e| e.id != id);
    }
}
