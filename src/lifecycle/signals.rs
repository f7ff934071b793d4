//! OS signal watcher.
//!
//! # Responsibilities
//! - Subscribe to SIGINT and SIGTERM, then report readiness
//! - First terminal signal requests a graceful drain (SaveAndExit)
//! - Any further terminal signal escalates to KillNoWait
//!
//! SIGKILL cannot be observed by the process, so KillNoWait is only
//! reachable through escalation or an internal request.

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::lifecycle::exit_mode::ExitMode;
use crate::lifecycle::orchestrator::Readiness;
use crate::lifecycle::shutdown::ShutdownHandle;
use crate::lifecycle::sink::SinkSource;

/// Mode requested by the `nth` terminal signal (1-based).
pub fn mode_for_signal(nth: u32) -> ExitMode {
    if nth <= 1 {
        ExitMode::SaveAndExit
    } else {
        ExitMode::KillNoWait
    }
}

/// Spawn the watcher. Dropping `ready` without signalling (subscription
/// failure) fails startup.
pub fn spawn_signal_watcher(
    ready: Readiness,
    handle: ShutdownHandle,
    stop: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(watch(ready, handle, stop))
}

#[cfg(unix)]
async fn watch(ready: Readiness, handle: ShutdownHandle, mut stop: broadcast::Receiver<()>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGINT handler");
            return;
        }
    };
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGTERM handler");
            return;
        }
    };

    tracing::info!("start listen system signal");
    ready.ready();

    let mut received = 0u32;
    loop {
        let name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
            _ = stop.recv() => break,
        };
        received += 1;
        let mode = mode_for_signal(received);
        tracing::info!(signal = name, mode = %mode, "recv system exit signal");
        handle.request(SinkSource::Signal, mode).await;
    }
    tracing::debug!("signal watcher stopped");
}

#[cfg(not(unix))]
async fn watch(ready: Readiness, handle: ShutdownHandle, mut stop: broadcast::Receiver<()>) {
    tracing::info!("start listen system signal");
    ready.ready();

    let mut received = 0u32;
    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    tracing::error!(error = %e, "ctrl-c listener failed");
                    break;
                }
            }
            _ = stop.recv() => break,
        }
        received += 1;
        let mode = mode_for_signal(received);
        tracing::info!(signal = "ctrl-c", mode = %mode, "recv system exit signal");
        handle.request(SinkSource::Signal, mode).await;
    }
}
