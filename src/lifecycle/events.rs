//! Events routed through the sink to the coordinator.

use std::fmt;

use crate::lifecycle::context::ProcessContext;

type Job = Box<dyn FnOnce(&ProcessContext) + Send>;

/// Work handed to the coordinator loop. Handled strictly in arrival order.
pub enum LifecycleEvent {
    /// Flush every registered log writer now.
    FlushLogs,
    /// Replace the debug time offset (seconds).
    SetTimeOffset(i64),
    /// Run arbitrary work on the coordinator.
    Job { name: &'static str, run: Job },
}

impl LifecycleEvent {
    pub fn job<F>(name: &'static str, run: F) -> Self
    where
        F: FnOnce(&ProcessContext) + Send + 'static,
    {
        LifecycleEvent::Job {
            name,
            run: Box::new(run),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::FlushLogs => "flush_logs",
            LifecycleEvent::SetTimeOffset(_) => "set_time_offset",
            LifecycleEvent::Job { name, .. } => name,
        }
    }
}

impl fmt::Debug for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleEvent::FlushLogs => f.write_str("FlushLogs"),
            LifecycleEvent::SetTimeOffset(secs) => f.debug_tuple("SetTimeOffset").field(secs).finish(),
            LifecycleEvent::Job { name, .. } => f.debug_struct("Job").field("name", name).finish(),
        }
    }
}
