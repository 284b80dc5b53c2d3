//! # MemoryIndicator — in-memory status indicator
//!
//! Keeps the currently shown [`StatusSpec`] and an operation history, and logs
//! each operation. Use it for tests, demos, or hosts without a visible surface.
//!
//! ## Example output
//! ```text
//! INFO indicator shown title="Syncing" sticky=true
//! INFO indicator dismissed
//! ```

use std::sync::{Mutex, PoisonError};

use crate::lifecycle::StatusSpec;

use super::StatusIndicator;

/// One renderer call, as recorded by [`MemoryIndicator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndicatorOp {
    Show(StatusSpec),
    Update(StatusSpec),
    Dismiss,
}

#[derive(Default)]
struct State {
    current: Option<StatusSpec>,
    history: Vec<IndicatorOp>,
}

/// Status indicator that lives in memory.
#[derive(Default)]
pub struct MemoryIndicator {
    state: Mutex<State>,
}

impl MemoryIndicator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spec currently on screen, if any.
    pub fn current(&self) -> Option<StatusSpec> {
        self.lock().current.clone()
    }

    /// Every operation so far, oldest first.
    pub fn history(&self) -> Vec<IndicatorOp> {
        self.lock().history.clone()
    }

    /// Number of `show` calls so far.
    pub fn shows(&self) -> usize {
        self.lock()
            .history
            .iter()
            .filter(|op| matches!(op, IndicatorOp::Show(_)))
            .count()
    }

    /// Simulates the user swiping the indicator away.
    ///
    /// Only clears what is on screen; the host is responsible for telling the
    /// worker (see [`LocalServiceHost::dismiss_indicator`](super::LocalServiceHost::dismiss_indicator)).
    pub fn user_dismiss(&self) {
        self.lock().current = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StatusIndicator for MemoryIndicator {
    fn show(&self, spec: &StatusSpec) {
        tracing::info!(title = %spec.title, sticky = spec.sticky, "indicator shown");
        let mut s = self.lock();
        s.current = Some(spec.clone());
        s.history.push(IndicatorOp::Show(spec.clone()));
    }

    fn update(&self, spec: &StatusSpec) {
        tracing::info!(title = %spec.title, text = %spec.text, "indicator updated");
        let mut s = self.lock();
        s.current = Some(spec.clone());
        s.history.push(IndicatorOp::Update(spec.clone()));
    }

    fn dismiss(&self) {
        tracing::info!("indicator dismissed");
        let mut s = self.lock();
        s.current = None;
        s.history.push(IndicatorOp::Dismiss);
    }
}
