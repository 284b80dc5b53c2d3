//! # Status indicator ownership on the worker side.
//!
//! [`Announcer`] is the only caller of the [`StatusIndicator`] renderer. It
//! remembers the spec on screen so a dismissed sticky indicator can be rebuilt
//! identically without re-running task setup.
//!
//! ```text
//! announce(spec) ─► show            (session start)
//! update(overrides) ─► update       (STATUS_UPDATE)
//! on_dismissed()
//!   ├─ sticky     ─► show(same spec) (re-announce, no state change)
//!   └─ not sticky ─► nothing
//! retire() ─► dismiss               (session end)
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use crate::events::{Bus, Event, EventKind};
use crate::host::StatusIndicator;

use super::status::{StatusOverrides, StatusSpec};

pub struct Announcer {
    indicator: Arc<dyn StatusIndicator>,
    current: Mutex<Option<StatusSpec>>,
    diag: Bus,
}

impl Announcer {
    pub fn new(indicator: Arc<dyn StatusIndicator>, diag: Bus) -> Self {
        Self {
            indicator,
            current: Mutex::new(None),
            diag,
        }
    }

    pub fn announce(&self, spec: StatusSpec) {
        self.indicator.show(&spec);
        self.diag
            .publish(Event::new(EventKind::IndicatorShown).with_task(spec.title.as_str()));
        *self.lock() = Some(spec);
    }

    /// Merges `overrides` into the spec on screen. No-op when nothing is shown.
    pub fn update(&self, overrides: &StatusOverrides) {
        let mut current = self.lock();
        let Some(spec) = current.as_ref() else {
            tracing::debug!("indicator update ignored: nothing shown");
            return;
        };
        let next = spec.merged(overrides);
        self.indicator.update(&next);
        self.diag
            .publish(Event::new(EventKind::IndicatorUpdated).with_task(next.title.as_str()));
        *current = Some(next);
    }

    /// User dismissed the indicator.
    pub fn on_dismissed(&self) {
        let current = self.lock();
        match current.as_ref() {
            Some(spec) if spec.sticky => {
                tracing::info!(title = %spec.title, "sticky indicator dismissed; re-announcing");
                self.indicator.show(spec);
                self.diag.publish(
                    Event::new(EventKind::IndicatorReannounced).with_task(spec.title.as_str()),
                );
            }
            Some(spec) => {
                tracing::debug!(title = %spec.title, "non-sticky indicator dismissed; worker keeps running");
            }
            None => {}
        }
    }

    /// Dismisses the indicator for good.
    pub fn retire(&self) {
        if let Some(spec) = self.lock().take() {
            self.indicator.dismiss();
            self.diag
                .publish(Event::new(EventKind::IndicatorDismissed).with_task(spec.title.as_str()));
        }
    }

    pub fn current(&self) -> Option<StatusSpec> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<StatusSpec>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{IndicatorOp, MemoryIndicator};

    fn setup() -> (Arc<MemoryIndicator>, Announcer) {
        let ind = Arc::new(MemoryIndicator::new());
        let ann = Announcer::new(ind.clone(), Bus::new(8));
        (ind, ann)
    }

    #[test]
    fn test_sticky_dismissal_reshows_identical_spec() {
        let (ind, ann) = setup();
        let spec = StatusSpec {
            sticky: true,
            title: "Syncing".into(),
            ..StatusSpec::default()
        };
        ann.announce(spec.clone());
        ind.user_dismiss();
        ann.on_dismissed();

        assert_eq!(ind.current(), Some(spec.clone()));
        assert_eq!(
            ind.history(),
            vec![IndicatorOp::Show(spec.clone()), IndicatorOp::Show(spec)]
        );
    }

    #[test]
    fn test_non_sticky_dismissal_is_inert() {
        let (ind, ann) = setup();
        ann.announce(StatusSpec::default());
        ind.user_dismiss();
        ann.on_dismissed();

        assert_eq!(ind.current(), None);
        assert_eq!(ind.shows(), 1);
        assert!(ann.current().is_some());
    }

    #[test]
    fn test_update_merges_and_retire_dismisses_once() {
        let (ind, ann) = setup();
        ann.update(&StatusOverrides::default().text("early"));
        assert!(ind.history().is_empty());

        ann.announce(StatusSpec::default());
        ann.update(&StatusOverrides::default().text("50%"));
        assert_eq!(ind.current().map(|s| s.text), Some("50%".to_string()));

        ann.retire();
        ann.retire();
        let dismissals = ind
            .history()
            .iter()
            .filter(|op| matches!(op, IndicatorOp::Dismiss))
            .count();
        assert_eq!(dismissals, 1);
    }
}
