//! Process context: the state every component shares, built once at startup
//! and passed by reference instead of living in globals.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;

use crate::lifecycle::clock::Clock;
use crate::lifecycle::exit_mode::ExitModeRegister;
use crate::lifecycle::shutdown::Shutdown;
use crate::observability::flush::FlushRegistry;
use crate::observability::metrics;

/// Coordinator state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Running,
    Draining,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Draining => "draining",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// A background task owned by the process, joined when it stops.
pub struct BackgroundTask {
    pub name: &'static str,
    pub handle: JoinHandle<()>,
}

pub struct ProcessContext {
    exit_mode: ExitModeRegister,
    exiting: AtomicBool,
    clock: Clock,
    flushers: FlushRegistry,
    shutdown: Shutdown,
    escalation: Notify,
    state: watch::Sender<LifecycleState>,
    tasks: Mutex<Vec<BackgroundTask>>,
}

impl ProcessContext {
    pub fn new(clock: Clock) -> Self {
        let (state, _) = watch::channel(LifecycleState::Starting);
        Self {
            exit_mode: ExitModeRegister::new(),
            exiting: AtomicBool::new(false),
            clock,
            flushers: FlushRegistry::new(),
            shutdown: Shutdown::new(),
            escalation: Notify::new(),
            state,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn exit_mode(&self) -> &ExitModeRegister {
        &self.exit_mode
    }

    /// Consulted by inbound-request middleware; once set, new work is
    /// refused with 503.
    pub fn is_exiting(&self) -> bool {
        self.exiting.load(Ordering::SeqCst)
    }

    pub fn mark_exiting(&self) {
        self.exiting.store(true, Ordering::SeqCst);
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn flushers(&self) -> &FlushRegistry {
        &self.flushers
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }

    /// Ask an ongoing drain to stop waiting.
    pub fn escalate(&self) {
        self.escalation.notify_one();
    }

    /// Resolves once [`escalate`](Self::escalate) has been called.
    pub async fn escalated(&self) {
        self.escalation.notified().await;
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    pub(crate) fn set_state(&self, next: LifecycleState) {
        let prev = self.state.send_replace(next);
        metrics::record_lifecycle_state(next);
        if prev != next {
            tracing::info!(from = %prev, to = %next, "lifecycle transition");
        }
    }

    /// Hand ownership of a background task to the process.
    pub fn register_task(&self, name: &'static str, handle: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(BackgroundTask { name, handle });
    }

    pub(crate) fn take_tasks(&self) -> Vec<BackgroundTask> {
        std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Default for ProcessContext {
    fn default() -> Self {
        Self::new(Clock::new())
    }
}
