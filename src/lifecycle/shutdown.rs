//! Shutdown coordination.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::lifecycle::context::ProcessContext;
use crate::lifecycle::events::LifecycleEvent;
use crate::lifecycle::exit_mode::ExitMode;
use crate::lifecycle::sink::{SinkSender, SinkSource};
use crate::observability::metrics;

/// Stop broadcast for long-running tasks (listener, signal watcher,
/// retention sweepers). Fired once, during the Stopped transition.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    triggered: AtomicBool,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            triggered: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        let _ = self.tx.send(());
    }

    /// True once the coordinator started stopping tasks on purpose.
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Number of tasks still subscribed.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle a producer uses to ask the process to exit.
///
/// The first request closes the sink, which ends the coordinator's running
/// loop. Requests arriving after the sink is closed escalate: they overwrite
/// the exit mode and cut any grace period short.
#[derive(Clone)]
pub struct ShutdownHandle {
    ctx: Arc<ProcessContext>,
    sink: SinkSender<LifecycleEvent>,
}

impl ShutdownHandle {
    pub fn new(ctx: Arc<ProcessContext>, sink: SinkSender<LifecycleEvent>) -> Self {
        Self { ctx, sink }
    }

    pub async fn request(&self, source: SinkSource, mode: ExitMode) {
        self.ctx.exit_mode().store(mode);
        metrics::record_shutdown_request(source, mode);
        if self.sink.close().await {
            tracing::info!(source = %source, mode = %mode, "shutdown requested");
        } else {
            tracing::warn!(source = %source, mode = %mode, "shutdown already in progress, escalating");
            self.ctx.escalate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_reaches_subscribers() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        assert_eq!(shutdown.receiver_count(), 1);
        assert!(!shutdown.is_triggered());

        shutdown.trigger();
        assert!(shutdown.is_triggered());
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn second_request_escalates_and_overrides_mode() {
        use crate::lifecycle::sink::EventSink;

        let ctx = Arc::new(ProcessContext::default());
        let (tx, mut rx) = EventSink::bounded::<LifecycleEvent>(4);
        let handle = ShutdownHandle::new(Arc::clone(&ctx), tx);

        handle.request(SinkSource::Signal, ExitMode::SaveAndExit).await;
        assert!(rx.recv().await.is_none());
        assert_eq!(ctx.exit_mode().load(), Some(ExitMode::SaveAndExit));

        handle.request(SinkSource::Listener, ExitMode::KillNoWait).await;
        assert_eq!(ctx.exit_mode().load(), Some(ExitMode::KillNoWait));
        tokio::time::timeout(std::time::Duration::from_secs(1), ctx.escalated())
            .await
            .unwrap();
    }
}
