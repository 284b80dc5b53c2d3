//! # Role-tagged event bus.
//!
//! [`EventBus`] is one process's endpoint on the [`Transport`]. It tags
//! everything it emits with its own [`Role`] and drops everything it receives
//! that carries the same role, so a process never hears its own messages.
//!
//! ## Architecture
//! ```text
//! emit(name, payload)
//!   └─► MessageEnvelope{name, payload, origin=role} ─► codec::encode ─► Transport::send
//!                                                                          │
//!           (every process, including this one)                            ▼
//! pump task: RawSubscription::next() ─► codec::decode ─┬─ Err         → drop (trace)
//!                                                      ├─ origin==role → drop (echo)
//!                                                      └─ otherwise    → HandlerRegistry::dispatch
//! ```
//!
//! ## Rules
//! - Handlers run synchronously on the pump task; keep them short.
//! - A panicking handler is discarded without affecting the others.
//! - Malformed frames are dropped silently; nothing is surfaced to callers.
//! - `emit` never fails from the caller's point of view.

use std::sync::{Arc, Weak};

use tokio::task::JoinHandle;

use crate::subscription::Subscription;
use crate::transport::{Frame, Transport};

use super::codec;
use super::envelope::{MessageEnvelope, Role};
use super::handlers::{Handler, HandlerRegistry};
use super::payload::Payload;

/// One process's publish/subscribe endpoint.
pub struct EventBus {
    role: Role,
    transport: Arc<dyn Transport>,
    handlers: Arc<HandlerRegistry>,
    pump: JoinHandle<()>,
}

impl EventBus {
    /// Subscribes to `transport` and starts the delivery pump.
    ///
    /// Must be called inside a tokio runtime. Frames sent after this call
    /// returns are observed.
    pub fn start(role: Role, transport: Arc<dyn Transport>) -> Arc<Self> {
        let handlers = Arc::new(HandlerRegistry::default());
        let mut sub = transport.subscribe_raw();
        let pump_handlers = Arc::clone(&handlers);

        let pump = tokio::spawn(async move {
            while let Some(frame) = sub.next().await {
                deliver(role, &pump_handlers, &frame);
            }
            tracing::debug!(%role, "bus pump stopped: transport closed");
        });

        Arc::new(Self {
            role,
            transport,
            handlers,
            pump,
        })
    }

    /// Role this endpoint tags its messages with.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Registers `handler` for `event`.
    pub fn on<F>(&self, event: impl Into<Arc<str>>, handler: F) -> Subscription
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        let id = self.handlers.insert(event.into(), handler);
        let target: Weak<HandlerRegistry> = Arc::downgrade(&self.handlers);
        Subscription::new(target, id)
    }

    /// Broadcasts `payload` under `event` to the other role.
    pub fn emit(&self, event: &str, payload: impl Into<Payload>) {
        let envelope = MessageEnvelope::new(event, payload.into(), self.role);
        match codec::encode(&envelope) {
            Ok(frame) => self.transport.send(frame),
            Err(e) => {
                tracing::warn!(event, role = %self.role, error = %e, "bus: payload not encodable; dropped");
            }
        }
    }

    /// Number of handlers currently registered for `event`.
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.len(event)
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Decodes one frame and dispatches it unless it is malformed or an echo.
fn deliver(role: Role, handlers: &HandlerRegistry, frame: &Frame) {
    let envelope = match codec::decode(frame) {
        Ok(env) => env,
        Err(e) => {
            tracing::trace!(%role, error = %e, "bus: malformed frame dropped");
            return;
        }
    };
    if envelope.is_echo_for(role) {
        return;
    }
    let n = handlers.dispatch(&envelope.event, &envelope.payload);
    tracing::trace!(%role, event = %envelope.event, handlers = n, "bus: delivered");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LocalTransport;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn pair() -> (Arc<EventBus>, Arc<EventBus>, Arc<dyn Transport>) {
        let t: Arc<dyn Transport> = Arc::new(LocalTransport::new(64));
        let ctl = EventBus::start(Role::Controller, Arc::clone(&t));
        let wrk = EventBus::start(Role::Worker, Arc::clone(&t));
        (ctl, wrk, t)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_other_role_receives_once_sender_never() {
        let (ctl, wrk, _t) = pair();
        let own = Arc::new(AtomicUsize::new(0));
        let other = Arc::new(Mutex::new(Vec::new()));

        let own_c = Arc::clone(&own);
        let _s1 = ctl.on("ping", move |_| {
            own_c.fetch_add(1, Ordering::SeqCst);
        });
        let other_c = Arc::clone(&other);
        let _s2 = wrk.on("ping", move |p| other_c.lock().unwrap().push(p.clone()));

        ctl.emit("ping", Payload::map([("seq", 1)]));
        settle().await;

        assert_eq!(own.load(Ordering::SeqCst), 0);
        assert_eq!(*other.lock().unwrap(), vec![Payload::map([("seq", 1)])]);
    }

    #[tokio::test]
    async fn test_all_handlers_fire_and_panics_are_isolated() {
        let (ctl, wrk, _t) = pair();
        let hits = Arc::new(AtomicUsize::new(0));

        let _bad = wrk.on("evt", |_| panic!("boom"));
        for _ in 0..2 {
            let h = Arc::clone(&hits);
            let _ = wrk.on("evt", move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            });
        }

        ctl.emit("evt", Payload::empty());
        ctl.emit("evt", Payload::empty());
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_removed_handler_stops_receiving() {
        let (ctl, wrk, _t) = pair();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let sub = wrk.on("evt", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        ctl.emit("evt", 1);
        settle().await;
        sub.remove();
        sub.remove();
        ctl.emit("evt", 2);
        settle().await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(wrk.handler_count("evt"), 0);
    }

    #[tokio::test]
    async fn test_malformed_frames_are_dropped() {
        let (_ctl, wrk, t) = pair();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let _s = wrk.on("evt", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        t.send("garbage".into());
        t.send(r#"{"event":"evt","json":"{bad","originIsWorker":false}"#.into());
        t.send(r#"{"event":"evt","json":"{}","originIsWorker":false}"#.into());
        settle().await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
