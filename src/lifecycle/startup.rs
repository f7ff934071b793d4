//! Startup orchestration.
//!
//! # Responsibilities
//! - Claim the PID file before anything else touches disk or network
//! - Build the process context and logging
//! - Install the metrics exporter when enabled
//! - Hand the HTTP server to the orchestrator and run until exit
//!
//! # Design Decisions
//! - Fail fast: a PID conflict leaves no log segment and binds no port
//! - Subsystems initialize in order, not concurrently
//! - The listener starts last (traffic only when ready)

use std::sync::Arc;
use thiserror::Error;

use crate::config::GatewayConfig;
use crate::http::relay::UpstreamError;
use crate::http::HttpServer;
use crate::lifecycle::clock::Clock;
use crate::lifecycle::context::ProcessContext;
use crate::lifecycle::exit_mode::ExitMode;
use crate::lifecycle::orchestrator::{LifecycleError, Orchestrator};
use crate::lifecycle::pid::{PidError, PidGuard};
use crate::observability::logging::{self, LoggingError};
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Pid(#[from] PidError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Run the gateway to completion and return how it exited.
pub async fn launch(config: GatewayConfig) -> Result<ExitMode, StartupError> {
    let pid = PidGuard::acquire(&config.lifecycle.pid_file)?;

    let ctx = Arc::new(ProcessContext::new(Clock::with_offset(
        config.lifecycle.time_offset_secs,
    )));
    logging::init(&config.logger, &config.observability, config.debug, &ctx)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.endpoint,
        pid_file = %pid.path().display(),
        "prompt-gateway starting"
    );
    if config.lifecycle.time_offset_secs != 0 {
        tracing::warn!(offset_secs = config.lifecycle.time_offset_secs, "debug time offset active");
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "failed to install metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "failed to parse metrics address"
            ),
        }
    }

    let server = match HttpServer::new(&config, Arc::clone(&ctx)) {
        Ok(server) => server,
        Err(e) => {
            ctx.shutdown().trigger();
            flush(&ctx);
            return Err(e.into());
        }
    };

    let orchestrator = Orchestrator::new(config.lifecycle.clone(), ctx, pid);
    let mode = orchestrator.run(|lc| server.serve(lc)).await?;
    Ok(mode)
}

fn flush(ctx: &ProcessContext) {
    for err in ctx.flushers().flush_all() {
        eprintln!("log flush failed: {err}");
    }
}
