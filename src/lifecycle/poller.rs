//! Elapsed-period throttle for periodic maintenance.

use std::fmt;

/// Answers "has `period` elapsed since the last mark".
///
/// The distance is taken as an absolute value so a clock moved backwards
/// (or a debug time offset being reset) cannot leave the poller stuck.
/// Only the coordinator calls it, so it carries no synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimePoller {
    last_ts: i64,
}

impl TimePoller {
    pub fn new(now: i64) -> Self {
        Self { last_ts: now }
    }

    /// Reset the mark to `now`.
    pub fn init(&mut self, now: i64) {
        self.last_ts = now;
    }

    /// Returns true and advances the mark when `|now - mark| >= period`.
    pub fn passed_time(&mut self, now: i64, period: i64) -> bool {
        let delta = now.saturating_sub(self.last_ts).saturating_abs();
        if delta < period {
            return false;
        }
        self.last_ts = now;
        true
    }

    pub fn last_mark(&self) -> i64 {
        self.last_ts
    }
}

impl fmt::Display for TimePoller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "time poller last_ts:{}", self.last_ts)
    }
}
