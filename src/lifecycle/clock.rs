//! Process wall clock with a debug time offset.

use chrono::{DateTime, Local, TimeDelta};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Largest offset accepted from configuration: one hundred years.
pub const MAX_OFFSET_SECS: i64 = 100 * 365 * 86_400;

/// Wall clock shared by the poller, log naming and retention.
///
/// Cloning is cheap; all clones observe the same offset. Production configs
/// keep the offset at zero.
#[derive(Debug, Clone, Default)]
pub struct Clock {
    offset_secs: Arc<AtomicI64>,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_offset(offset_secs: i64) -> Self {
        let clock = Self::new();
        clock.set_offset(offset_secs);
        clock
    }

    pub fn set_offset(&self, offset_secs: i64) {
        self.offset_secs.store(offset_secs, Ordering::SeqCst);
    }

    pub fn offset(&self) -> i64 {
        self.offset_secs.load(Ordering::SeqCst)
    }

    /// Local time shifted by the offset. An offset chrono cannot represent
    /// leaves the time unshifted.
    pub fn now(&self) -> DateTime<Local> {
        let now = Local::now();
        TimeDelta::try_seconds(self.offset())
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(now)
    }

    /// Unix seconds shifted by the offset.
    pub fn seconds(&self) -> i64 {
        self.now().timestamp()
    }
}
