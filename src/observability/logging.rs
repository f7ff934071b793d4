//! Structured logging.
//!
//! # Responsibilities
//! - Build the rotating file writer and register it for flushing
//! - Install the global `tracing` subscriber (JSON to file, optional console)
//! - Start the retention sweeper when `max_hold_days > 0`
//! - Log panics with location and backtrace
//!
//! `RUST_LOG` overrides the configured level.

use std::backtrace::Backtrace;
use std::path::PathBuf;
use std::sync::{Arc, Once};

use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogConfig, ObservabilityConfig};
use crate::lifecycle::context::ProcessContext;
use crate::observability::retention::{RetentionPolicy, RetentionSweeper};
use crate::observability::writer::{LogSink, RotatingFileWriter};

static PANIC_HOOK_INSTALLED: Once = Once::new();

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log directory {path}: {source}")]
    Dir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Filter directive for the integer `log_level` setting.
pub fn level_directive(log_level: i32) -> &'static str {
    match log_level {
        i32::MIN..=-1 => "trace",
        0 => "debug",
        1 => "info",
        2 => "warn",
        _ => "error",
    }
}

/// Initialize logging for the process and return the file writer.
///
/// A second call in the same process (tests) keeps the first subscriber;
/// the new writer is still created, registered and swept.
pub fn init(
    config: &LogConfig,
    observability: &ObservabilityConfig,
    debug: bool,
    ctx: &ProcessContext,
) -> Result<Arc<RotatingFileWriter>, LoggingError> {
    let writer = RotatingFileWriter::new(config, ctx.clock().clone())
        .map(Arc::new)
        .map_err(|source| LoggingError::Dir {
            path: PathBuf::from(&config.log_path),
            source,
        })?;
    ctx.flushers().register(Arc::clone(&writer));

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(config.log_level)));
    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_ansi(false)
        .with_current_span(false)
        .with_writer(LogSink::new(Arc::clone(&writer)));
    let console_layer = (observability.console || debug)
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    if let Err(e) = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
    {
        eprintln!("tracing subscriber already installed: {e}");
    }
    install_panic_hook();

    tracing::info!(
        dir = %writer.dir().display(),
        mode = ?writer.mode(),
        level = level_directive(config.log_level),
        "logger initialized"
    );

    let policy = RetentionPolicy::from_config(config);
    if policy.enabled() {
        let sweeper = RetentionSweeper::new(Arc::clone(&writer), policy);
        ctx.register_task("log retention", sweeper.spawn(ctx.subscribe_shutdown()));
    }

    Ok(writer)
}

/// Log panics through `tracing` before the default hook runs. Installed once.
pub fn install_panic_hook() {
    PANIC_HOOK_INSTALLED.call_once(|| {
        let default_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let location = info
                .location()
                .map(|l| format!("{}:{}", l.file(), l.line()))
                .unwrap_or_else(|| "unknown".to_string());
            tracing::error!(
                location = %location,
                backtrace = %Backtrace::force_capture(),
                "panic: {info}"
            );
            default_hook(info);
        }));
    });
}
