//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Claim PID file → Process context → Logging → Metrics → Orchestrator
//!
//! Orchestrator (orchestrator.rs):
//!     Starting: listener + signal watcher report ready → persist PID
//!     Running:  ticker (poller-gated flush) | sink events, in arrival order
//!     Draining: SaveAndExit → exiting flag, grace sleep; others skip
//!     Stopped:  stop broadcast → join tasks → drop PID → final flush
//!
//! Producers (any task holding a SinkSender):
//!     signals.rs   SIGINT/SIGTERM → ShutdownHandle::request
//!     listener     unrecoverable failure → PanicNoWait
//!     collaborators → LifecycleEvent (flush, time offset, jobs)
//! ```
//!
//! # Design Decisions
//! - One consumer: the coordinator owns the only SinkReceiver
//! - Exit mode and exiting flag are atomics, no lock around the state machine
//! - Shared state lives in an explicit ProcessContext, not globals
//! - Shutdown steps are supervised so a panic cannot skip cleanup

pub mod clock;
pub mod context;
pub mod events;
pub mod exit_mode;
pub mod orchestrator;
pub mod pid;
pub mod poller;
pub mod shutdown;
pub mod signals;
pub mod sink;
pub mod startup;
pub mod supervise;

pub use context::{LifecycleState, ProcessContext};
pub use exit_mode::ExitMode;
pub use orchestrator::{ListenerContext, Orchestrator};
pub use shutdown::{Shutdown, ShutdownHandle};
pub use sink::SinkSource;
pub use startup::{launch, StartupError};
