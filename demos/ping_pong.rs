//! # Demo: ping/pong between controller and worker
//!
//! Starts a sticky background task, trades a few messages with it, simulates
//! the user swiping the indicator away, then stops it.
//!
//! ```text
//! RUST_LOG=info cargo run --example ping_pong --features logging
//! ```

use std::sync::Arc;
use std::time::Duration;

use taskhost::{
    BodyFn, Config, LocalServiceHost, LocalTransport, LogWriter, MemoryIndicator, Orchestrator,
    Payload, StaticPermission, StatusOverrides, Subscribe, TaskContext, TaskError, Transport,
    WorkerRuntime,
};
use tracing_subscriber::EnvFilter;

/// Worker program: answers every `ping` with a `pong` until stopped.
fn worker_image(rt: &WorkerRuntime) {
    rt.register(BodyFn::arc("pong", |ctx: TaskContext| async move {
        let replies = ctx.clone();
        let sub = ctx.on("ping", move |p| {
            let seq = p.get("seq").and_then(Payload::as_i64).unwrap_or(0);
            replies.emit("pong", Payload::map([("seq", seq)]));
        });
        ctx.stopped().await;
        sub.remove();
        Ok::<(), TaskError>(())
    }));
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = Config::default();
    let transport: Arc<dyn Transport> = Arc::new(LocalTransport::new(cfg.bus_capacity));
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter)];

    let indicator = Arc::new(MemoryIndicator::new());
    let host = Arc::new(
        LocalServiceHost::new(
            cfg.clone(),
            Arc::clone(&transport),
            indicator.clone(),
            Arc::new(worker_image),
        )
        .with_subscribers(subs.clone()),
    );

    let orch = Orchestrator::builder(cfg)
        .with_permission(Arc::new(StaticPermission::granted()))
        .with_subscribers(subs)
        .build(transport, host.clone());

    let _state = orch.on_running_changed(|s| println!("[controller] state={s}"));
    let _pong = orch.on("pong", |p| println!("[controller] pong {p:?}"));

    let task = orch.descriptor("ping_pong").with_data("origin", "demo");
    orch.start_task(task, Some(StatusOverrides::default().title("Ping pong").sticky(true)))
        .await?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    for seq in 1..=3 {
        orch.emit("ping", Payload::map([("seq", seq)]));
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    indicator.user_dismiss();
    host.dismiss_indicator();
    println!("[demo] indicator after dismissal: {:?}", indicator.current().map(|s| s.title));

    orch.update_status(&StatusOverrides::default().text("Almost done"))?;
    println!("[demo] alive: {}", orch.check_task(None).await);

    orch.stop_task();
    tokio::time::sleep(Duration::from_millis(300)).await;
    println!("[demo] running after stop: {}", orch.is_task_running());
    Ok(())
}
