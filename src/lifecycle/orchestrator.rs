//! Lifecycle orchestrator: the coordinator loop and shutdown state machine.
//!
//! ```text
//! Starting ──both tasks ready, pid saved──▶ Running
//! Running  ──sink end-of-stream──────────▶ Draining
//! Draining ──grace period / no wait──────▶ Stopped
//! ```
//!
//! The coordinator only ever blocks on its ticker or on the sink. Everything
//! that can fail or panic inside the loop or during cleanup is supervised so
//! the shutdown sequence always runs to the end.

use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::config::LifecycleConfig;
use crate::lifecycle::context::{LifecycleState, ProcessContext};
use crate::lifecycle::events::LifecycleEvent;
use crate::lifecycle::exit_mode::ExitMode;
use crate::lifecycle::pid::{PidError, PidGuard};
use crate::lifecycle::poller::TimePoller;
use crate::lifecycle::shutdown::ShutdownHandle;
use crate::lifecycle::signals::spawn_signal_watcher;
use crate::lifecycle::sink::{EventSink, SinkItem, SinkReceiver, SinkSender, SinkSource};
use crate::lifecycle::supervise::{panic_message, supervise};
use crate::net::ListenerError;
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A startup task ended before reporting readiness.
    #[error("{0} failed before becoming ready")]
    NotReady(&'static str),

    #[error(transparent)]
    Pid(#[from] PidError),
}

/// One-shot readiness report from a startup task.
pub struct Readiness(oneshot::Sender<()>);

impl Readiness {
    pub fn channel() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self(tx), rx)
    }

    pub fn ready(self) {
        let _ = self.0.send(());
    }
}

/// Everything the listener task receives from the orchestrator.
pub struct ListenerContext {
    /// Report once the socket is bound.
    pub ready: Readiness,
    /// Fires when the process stops on purpose.
    pub stop: broadcast::Receiver<()>,
}

pub struct Orchestrator {
    config: LifecycleConfig,
    ctx: Arc<ProcessContext>,
    pid: PidGuard,
    sink_tx: SinkSender<LifecycleEvent>,
    sink_rx: SinkReceiver<LifecycleEvent>,
}

impl Orchestrator {
    pub fn new(config: LifecycleConfig, ctx: Arc<ProcessContext>, pid: PidGuard) -> Self {
        let (sink_tx, sink_rx) = EventSink::bounded(config.sink_capacity);
        Self {
            config,
            ctx,
            pid,
            sink_tx,
            sink_rx,
        }
    }

    /// Producer handle for the event sink.
    pub fn sender(&self) -> SinkSender<LifecycleEvent> {
        self.sink_tx.clone()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle::new(Arc::clone(&self.ctx), self.sink_tx.clone())
    }

    pub fn context(&self) -> &Arc<ProcessContext> {
        &self.ctx
    }

    /// Drive the process from Starting to Stopped.
    ///
    /// `serve` builds the listener future: it must bind, call
    /// `ready.ready()`, then serve until `stop` fires. Returning (with or
    /// without an error) before that is treated as a fatal listener failure.
    pub async fn run<F, Fut>(self, serve: F) -> Result<ExitMode, LifecycleError>
    where
        F: FnOnce(ListenerContext) -> Fut,
        Fut: Future<Output = Result<(), ListenerError>> + Send + 'static,
    {
        let Orchestrator {
            config,
            ctx,
            mut pid,
            sink_tx,
            mut sink_rx,
        } = self;
        let handle = ShutdownHandle::new(Arc::clone(&ctx), sink_tx.clone());
        ctx.set_state(LifecycleState::Starting);

        let (listener_ready, listener_rx) = Readiness::channel();
        let (signals_ready, signals_rx) = Readiness::channel();

        let listener = spawn_listener(&ctx, handle.clone(), serve, listener_ready);
        let signals = spawn_signal_watcher(signals_ready, handle, ctx.subscribe_shutdown());
        drop(sink_tx);

        let startup = async {
            tokio::try_join!(
                async { listener_rx.await.map_err(|_| LifecycleError::NotReady("listener")) },
                async { signals_rx.await.map_err(|_| LifecycleError::NotReady("signal watcher")) },
            )?;
            pid.persist(std::process::id())?;
            Ok::<(), LifecycleError>(())
        };
        if let Err(err) = startup.await {
            tracing::error!(error = %err, "bootstrap failed");
            stop(&config, &ctx, pid, listener, signals, ExitMode::PanicNoWait).await;
            return Err(err);
        }

        tracing::info!(pid = std::process::id(), "bootstrap success...");
        flush_logs(&ctx);
        ctx.set_state(LifecycleState::Running);

        let mode = run_loop(&config, &ctx, &mut sink_rx).await;

        ctx.set_state(LifecycleState::Draining);
        let mode = drain(&config, &ctx, mode).await;

        stop(&config, &ctx, pid, listener, signals, mode).await;
        Ok(mode)
    }
}

fn spawn_listener<F, Fut>(
    ctx: &Arc<ProcessContext>,
    handle: ShutdownHandle,
    serve: F,
    ready: Readiness,
) -> JoinHandle<()>
where
    F: FnOnce(ListenerContext) -> Fut,
    Fut: Future<Output = Result<(), ListenerError>> + Send + 'static,
{
    let fut = serve(ListenerContext {
        ready,
        stop: ctx.subscribe_shutdown(),
    });
    let ctx = Arc::clone(ctx);
    tokio::spawn(async move {
        let result = AssertUnwindSafe(fut).catch_unwind().await;
        if ctx.shutdown().is_triggered() {
            if let Ok(Err(e)) = result {
                tracing::warn!(error = %e, "http server error during shutdown");
            }
            return;
        }
        match result {
            Ok(Ok(())) => tracing::error!("http server stopped unexpectedly"),
            Ok(Err(e)) => tracing::error!(error = %e, "http server stopped"),
            Err(payload) => {
                tracing::error!(panic = %panic_message(payload.as_ref()), "http server panicked")
            }
        }
        handle.request(SinkSource::Listener, ExitMode::PanicNoWait).await;
    })
}

/// Running state: tick-driven maintenance interleaved with sink events.
async fn run_loop(
    config: &LifecycleConfig,
    ctx: &ProcessContext,
    sink: &mut SinkReceiver<LifecycleEvent>,
) -> ExitMode {
    let mut poller = TimePoller::new(ctx.clock().seconds());
    let flush_period = i64::try_from(config.flush_interval_secs).unwrap_or(i64::MAX);
    let mut ticker = time::interval(config.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => maintenance(ctx, &mut poller, flush_period),
            item = sink.recv() => match item {
                Some(item) => consume(ctx, item),
                None => break,
            },
        }
    }
    ctx.exit_mode().load_or_default()
}

fn maintenance(ctx: &ProcessContext, poller: &mut TimePoller, flush_period: i64) {
    let _ = supervise("maintenance", || {
        if poller.passed_time(ctx.clock().seconds(), flush_period) {
            flush_logs(ctx);
        }
    });
}

fn consume(ctx: &ProcessContext, item: SinkItem<LifecycleEvent>) {
    let SinkItem { source, payload } = item;
    metrics::record_sink_event(source, payload.name());
    tracing::trace!(source = %source, event = ?payload, "consume sink event");
    let _ = supervise("sink_event", || match payload {
        LifecycleEvent::FlushLogs => flush_logs(ctx),
        LifecycleEvent::SetTimeOffset(secs) => {
            ctx.clock().set_offset(secs);
            tracing::warn!(offset_secs = secs, "time offset changed");
        }
        LifecycleEvent::Job { run, .. } => run(ctx),
    });
}

/// Draining state. Returns the mode the stop phase should apply, which an
/// escalation during the grace period may have hardened.
async fn drain(config: &LifecycleConfig, ctx: &ProcessContext, mode: ExitMode) -> ExitMode {
    if !mode.waits() {
        tracing::info!(mode = %mode, "main progress shutdown now");
        return mode;
    }

    ctx.mark_exiting();
    tracing::info!(
        mode = %mode,
        wait_ms = config.shutdown_wait_ms,
        "main progress shutdown after grace period"
    );
    tokio::select! {
        _ = time::sleep(config.shutdown_wait()) => {}
        _ = ctx.escalated() => {
            tracing::warn!("shutdown escalated, skipping remaining grace period");
        }
    }
    ctx.exit_mode().load_or_default()
}

/// Stopped state. Unconditional: every step runs even if an earlier one
/// failed or panicked.
async fn stop(
    config: &LifecycleConfig,
    ctx: &ProcessContext,
    pid: PidGuard,
    mut listener: JoinHandle<()>,
    signals: JoinHandle<()>,
    mode: ExitMode,
) {
    ctx.set_state(LifecycleState::Stopped);
    ctx.shutdown().trigger();

    if mode.waits() {
        if time::timeout(config.stop_timeout(), &mut listener).await.is_err() {
            tracing::warn!(
                timeout_ms = config.stop_timeout_ms,
                "http server did not stop in time, aborting"
            );
            listener.abort();
        }
    } else {
        listener.abort();
    }

    join_task("signal watcher", signals, config.stop_timeout()).await;
    for task in ctx.take_tasks() {
        join_task(task.name, task.handle, config.stop_timeout()).await;
    }

    match supervise("pre_exit", || pid.release()) {
        Ok(Err(e)) => tracing::error!(error = %e, "failed to drop pid file"),
        Ok(Ok(())) | Err(_) => {}
    }

    tracing::info!(mode = %mode, "main progress exit...");
    flush_logs(ctx);
}

async fn join_task(name: &'static str, mut handle: JoinHandle<()>, limit: Duration) {
    match time::timeout(limit, &mut handle).await {
        Ok(Ok(())) => tracing::debug!(task = name, "background task joined"),
        Ok(Err(e)) if e.is_panic() => tracing::error!(task = name, "background task panicked"),
        Ok(Err(_)) => {}
        Err(_) => {
            tracing::warn!(task = name, "background task did not stop in time, aborting");
            handle.abort();
        }
    }
}

fn flush_logs(ctx: &ProcessContext) {
    for err in ctx.flushers().flush_all() {
        tracing::warn!(error = %err, "log flush failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Instant;

    fn test_config(wait_ms: u64) -> LifecycleConfig {
        LifecycleConfig {
            shutdown_wait_ms: wait_ms,
            stop_timeout_ms: 1_000,
            tick_interval_ms: 5,
            ..LifecycleConfig::default()
        }
    }

    fn setup(wait_ms: u64) -> (tempfile::TempDir, std::path::PathBuf, Orchestrator) {
        let dir = tempfile::tempdir().unwrap();
        let pid_path = dir.path().join("test.pid");
        let pid = PidGuard::acquire(&pid_path).unwrap();
        let ctx = Arc::new(ProcessContext::default());
        let orchestrator = Orchestrator::new(test_config(wait_ms), ctx, pid);
        (dir, pid_path, orchestrator)
    }

    async fn idle_listener(lc: ListenerContext) -> Result<(), ListenerError> {
        lc.ready.ready();
        let mut stop = lc.stop;
        let _ = stop.recv().await;
        Ok(())
    }

    async fn wait_for_state(ctx: &ProcessContext, state: LifecycleState) {
        let mut rx = ctx.subscribe_state();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == state))
            .await
            .expect("state not reached in time")
            .expect("state channel closed");
    }

    #[tokio::test]
    async fn graceful_exit_waits_with_exiting_flag_set() {
        let (_dir, pid_path, orchestrator) = setup(300);
        let ctx = Arc::clone(orchestrator.context());
        let handle = orchestrator.shutdown_handle();
        let run = tokio::spawn(orchestrator.run(idle_listener));

        wait_for_state(&ctx, LifecycleState::Running).await;
        assert_eq!(
            std::fs::read_to_string(&pid_path).unwrap(),
            std::process::id().to_string()
        );
        assert!(!ctx.is_exiting());

        let started = Instant::now();
        handle.request(SinkSource::External, ExitMode::SaveAndExit).await;
        wait_for_state(&ctx, LifecycleState::Draining).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(ctx.is_exiting());
        assert_eq!(ctx.state(), LifecycleState::Draining);

        let mode = run.await.unwrap().unwrap();
        assert_eq!(mode, ExitMode::SaveAndExit);
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert_eq!(ctx.state(), LifecycleState::Stopped);
        assert!(!pid_path.exists());
    }

    #[tokio::test]
    async fn kill_exit_skips_the_wait() {
        let (_dir, pid_path, orchestrator) = setup(10_000);
        let ctx = Arc::clone(orchestrator.context());
        let handle = orchestrator.shutdown_handle();
        let run = tokio::spawn(orchestrator.run(idle_listener));

        wait_for_state(&ctx, LifecycleState::Running).await;
        let started = Instant::now();
        handle.request(SinkSource::External, ExitMode::KillNoWait).await;

        let mode = run.await.unwrap().unwrap();
        assert_eq!(mode, ExitMode::KillNoWait);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!ctx.is_exiting());
        assert!(!pid_path.exists());
    }

    #[tokio::test]
    async fn second_request_escalates_drain() {
        let (_dir, _pid_path, orchestrator) = setup(10_000);
        let ctx = Arc::clone(orchestrator.context());
        let handle = orchestrator.shutdown_handle();
        let run = tokio::spawn(orchestrator.run(idle_listener));

        wait_for_state(&ctx, LifecycleState::Running).await;
        let started = Instant::now();
        handle.request(SinkSource::External, ExitMode::SaveAndExit).await;
        wait_for_state(&ctx, LifecycleState::Draining).await;
        handle.request(SinkSource::External, ExitMode::KillNoWait).await;

        let mode = run.await.unwrap().unwrap();
        assert_eq!(mode, ExitMode::KillNoWait);
        assert!(ctx.is_exiting());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn listener_failure_before_ready_fails_startup() {
        let (_dir, pid_path, orchestrator) = setup(10_000);
        let ctx = Arc::clone(orchestrator.context());

        let result = orchestrator
            .run(|_lc: ListenerContext| async {
                Err(ListenerError::Bind {
                    addr: "127.0.0.1:1".into(),
                    source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "taken"),
                })
            })
            .await;

        assert!(matches!(result, Err(LifecycleError::NotReady("listener"))));
        assert_eq!(ctx.state(), LifecycleState::Stopped);
        assert!(!pid_path.exists());
    }

    #[tokio::test]
    async fn listener_dying_after_ready_panics_no_wait() {
        let (_dir, _pid_path, orchestrator) = setup(10_000);
        let ctx = Arc::clone(orchestrator.context());

        let started = Instant::now();
        let mode = orchestrator
            .run(|lc: ListenerContext| async move {
                lc.ready.ready();
                tokio::time::sleep(Duration::from_millis(50)).await;
                Err(ListenerError::Serve(std::io::Error::other("socket died")))
            })
            .await
            .unwrap();

        assert_eq!(mode, ExitMode::PanicNoWait);
        assert!(!ctx.is_exiting());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn events_run_in_order_and_survive_panics() {
        let (_dir, _pid_path, orchestrator) = setup(0);
        let ctx = Arc::clone(orchestrator.context());
        let sink = orchestrator.sender();
        let handle = orchestrator.shutdown_handle();
        let run = tokio::spawn(orchestrator.run(idle_listener));

        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..10 {
            let seen = Arc::clone(&seen);
            sink.send(
                SinkSource::External,
                LifecycleEvent::job("record", move |_| seen.lock().unwrap().push(i)),
            )
            .await
            .unwrap();
            if i == 4 {
                sink.send(
                    SinkSource::External,
                    LifecycleEvent::job("explode", |_| panic!("job failure")),
                )
                .await
                .unwrap();
            }
        }
        sink.send(SinkSource::External, LifecycleEvent::SetTimeOffset(120))
            .await
            .unwrap();
        handle.request(SinkSource::External, ExitMode::SaveAndExit).await;

        assert_eq!(run.await.unwrap().unwrap(), ExitMode::SaveAndExit);
        assert_eq!(*seen.lock().unwrap(), (0..10).collect::<Vec<_>>());
        assert_eq!(ctx.clock().offset(), 120);
    }

    #[tokio::test]
    async fn background_tasks_are_joined_on_stop() {
        let (_dir, _pid_path, orchestrator) = setup(0);
        let ctx = Arc::clone(orchestrator.context());
        let handle = orchestrator.shutdown_handle();

        let finished = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let mut stop_rx = ctx.subscribe_shutdown();
        ctx.register_task(
            "waiter",
            tokio::spawn(async move {
                let _ = stop_rx.recv().await;
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
            }),
        );

        let run = tokio::spawn(orchestrator.run(idle_listener));
        wait_for_state(&ctx, LifecycleState::Running).await;
        handle.request(SinkSource::External, ExitMode::KillNoWait).await;
        run.await.unwrap().unwrap();

        assert!(finished.load(std::sync::atomic::Ordering::SeqCst));
    }
}
