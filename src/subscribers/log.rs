//! # Logging subscriber.
//!
//! [`LogWriter`] forwards diagnostic events to [`tracing`], one line per event.
//! Enabled via the `logging` feature.
//!
//! ## Output format
//! ```text
//! INFO  [start-requested] task=sync
//! INFO  [state] role=controller state=running
//! WARN  [permission-denied] task=sync
//! WARN  [launch-failed] task=sync reason="launch declined: no slot"
//! INFO  [stop-observed] role=worker
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Subscriber that writes events through `tracing`.
pub struct LogWriter;

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let task = e.task.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::StartRequested => tracing::info!("[start-requested] task={task}"),
            EventKind::StartIgnored => {
                tracing::info!("[start-ignored] task={task} state={:?}", e.state)
            }
            EventKind::PermissionDenied => tracing::warn!("[permission-denied] task={task}"),
            EventKind::Launched => tracing::info!("[launched] task={task}"),
            EventKind::LaunchFailed => {
                tracing::warn!("[launch-failed] task={task} reason={reason:?}")
            }
            EventKind::StopRequested => tracing::info!("[stop-requested] task={task}"),
            EventKind::TerminateIssued => tracing::warn!("[terminate-issued] task={task}"),
            EventKind::WorkerExited => tracing::info!("[worker-exited] task={task} how={reason}"),
            EventKind::StateChanged => {
                let role = e.role.map(|r| r.to_string()).unwrap_or_default();
                let state = e.state.map(|s| s.as_label()).unwrap_or("-");
                tracing::info!("[state] role={role} state={state}")
            }
            EventKind::SessionStarted => tracing::info!("[session-started] task={task}"),
            EventKind::DuplicateEntry => tracing::info!("[duplicate-entry] task={task}"),
            EventKind::BodyFailed => tracing::warn!("[body-failed] body={task} err={reason:?}"),
            EventKind::StopObserved => tracing::info!("[stop-observed] role=worker"),
            EventKind::DrainExceeded => tracing::warn!("[drain-exceeded] {reason}"),
            EventKind::SessionEnded => tracing::info!("[session-ended] task={task} {reason}"),
            EventKind::IndicatorShown => tracing::debug!("[indicator-shown] task={task}"),
            EventKind::IndicatorReannounced => {
                tracing::debug!("[indicator-reannounced] task={task}")
            }
            EventKind::IndicatorUpdated => tracing::debug!("[indicator-updated] task={task}"),
            EventKind::IndicatorDismissed => tracing::debug!("[indicator-dismissed] task={task}"),
            EventKind::SubscriberPanicked => {
                tracing::warn!("[subscriber-panicked] name={task} info={reason:?}")
            }
            EventKind::SubscriberOverflow => tracing::warn!("[subscriber-overflow] {reason}"),
        }
    }

    fn name(&self) -> &'static str {
        "log_writer"
    }
}
