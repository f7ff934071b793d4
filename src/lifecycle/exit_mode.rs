//! Exit-mode register.
//!
//! Written by whichever producer decides the process must stop, read once by
//! the coordinator when the event sink reports end-of-stream.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Shutdown policy applied by the drain phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitMode {
    /// Stop accepting work, wait the grace period, then stop.
    SaveAndExit,
    /// Stop immediately, no grace period.
    KillNoWait,
    /// The listener died; stop immediately.
    PanicNoWait,
}

impl ExitMode {
    /// Whether the drain phase waits for in-flight requests.
    pub fn waits(&self) -> bool {
        matches!(self, ExitMode::SaveAndExit)
    }

    fn as_raw(self) -> u8 {
        match self {
            ExitMode::SaveAndExit => 1,
            ExitMode::KillNoWait => 2,
            ExitMode::PanicNoWait => 3,
        }
    }

    fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(ExitMode::SaveAndExit),
            2 => Some(ExitMode::KillNoWait),
            3 => Some(ExitMode::PanicNoWait),
            _ => None,
        }
    }
}

impl fmt::Display for ExitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExitMode::SaveAndExit => "save_and_exit",
            ExitMode::KillNoWait => "kill_no_wait",
            ExitMode::PanicNoWait => "panic_no_wait",
        };
        f.write_str(name)
    }
}

/// Lock-free holder for the process exit mode. Last writer wins.
#[derive(Debug, Default)]
pub struct ExitModeRegister {
    raw: AtomicU8,
}

impl ExitModeRegister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, mode: ExitMode) {
        self.raw.store(mode.as_raw(), Ordering::SeqCst);
    }

    /// Current mode, `None` if no producer has set one yet.
    pub fn load(&self) -> Option<ExitMode> {
        ExitMode::from_raw(self.raw.load(Ordering::SeqCst))
    }

    /// Current mode; an unset register means every producer went away
    /// without asking for anything harsher, so drain gracefully.
    pub fn load_or_default(&self) -> ExitMode {
        self.load().unwrap_or(ExitMode::SaveAndExit)
    }
}
