//! Panic supervision for task boundaries that must not take the
//! coordinator down.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;

use crate::observability::metrics;

/// A supervised closure panicked.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{task} panicked: {message}")]
pub struct TaskPanic {
    pub task: &'static str,
    pub message: String,
}

/// Run `f`, converting a panic into a logged [`TaskPanic`].
///
/// The installed panic hook has already logged location and backtrace by
/// the time this returns.
pub fn supervise<T, F>(task: &'static str, f: F) -> Result<T, TaskPanic>
where
    F: FnOnce() -> T,
{
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let message = panic_message(payload.as_ref());
        tracing::error!(task, panic = %message, "supervised task panicked, continuing");
        metrics::record_supervised_panic(task);
        TaskPanic { task, message }
    })
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
