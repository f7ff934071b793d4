//! Log segment naming.
//!
//! Hour mode: `{YYYYMMDDHH}.log`. Size mode: `{YYYYMMDDHH}_{unix_millis}.log`.
//! [`parse_segment_time`] is the exact inverse of [`segment_name`] and is what
//! the retention sweep uses to age files.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use thiserror::Error;

use crate::config::LogConfig;

pub const SEGMENT_EXT: &str = "log";
pub const COMPRESSED_EXT: &str = "gz";

/// Side file for retention errors, kept in the log directory.
pub const ERR_LOG_NAME: &str = "clean_err.log";

/// Used when `max_size` is 0 and hour rotation is off.
pub const DEFAULT_MAX_SIZE_MB: u32 = 20;

const HOUR_FORMAT: &str = "%Y%m%d%H";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationMode {
    /// Rotate every `every` local hours.
    Hourly { every: u32 },
    /// Rotate before a write would reach `max_bytes`.
    Size { max_bytes: u64 },
}

impl RotationMode {
    /// Hour rotation wins when configured.
    pub fn from_config(config: &LogConfig) -> Self {
        if config.hour_rotate > 0 {
            return RotationMode::Hourly {
                every: config.hour_rotate,
            };
        }
        let mb = if config.max_size == 0 {
            DEFAULT_MAX_SIZE_MB
        } else {
            config.max_size
        };
        RotationMode::Size {
            max_bytes: u64::from(mb) * 1024 * 1024,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SegmentNameError {
    #[error("not a segment file: {0}")]
    NotSegment(String),

    #[error("malformed segment name {name}: {reason}")]
    Malformed { name: String, reason: String },
}

/// File name for a segment opened at `now`.
pub fn segment_name(mode: RotationMode, now: &DateTime<Local>) -> String {
    let hour = now.format(HOUR_FORMAT);
    match mode {
        RotationMode::Hourly { .. } => format!("{hour}.{SEGMENT_EXT}"),
        RotationMode::Size { .. } => {
            format!("{hour}_{}.{SEGMENT_EXT}", now.timestamp_millis())
        }
    }
}

/// Recover the creation time embedded in a segment file name.
pub fn parse_segment_time(
    mode: RotationMode,
    file_name: &str,
) -> Result<DateTime<Local>, SegmentNameError> {
    let stem = file_name
        .strip_suffix(".log")
        .filter(|stem| !stem.is_empty())
        .ok_or_else(|| SegmentNameError::NotSegment(file_name.to_string()))?;

    let malformed = |reason: String| SegmentNameError::Malformed {
        name: file_name.to_string(),
        reason,
    };

    match mode {
        RotationMode::Hourly { .. } => {
            if !is_hour_stamp(stem) {
                return Err(malformed(format!("bad hour stamp {stem:?}")));
            }
            // chrono needs a minute field to build a full datetime
            let naive = NaiveDateTime::parse_from_str(&format!("{stem}00"), "%Y%m%d%H%M")
                .map_err(|e| malformed(e.to_string()))?;
            Local
                .from_local_datetime(&naive)
                .earliest()
                .ok_or_else(|| malformed("nonexistent local time".to_string()))
        }
        RotationMode::Size { .. } => {
            let parts: Vec<&str> = stem.split('_').collect();
            let [prefix, millis] = parts.as_slice() else {
                return Err(malformed(format!("expected 2 parts, got {}", parts.len())));
            };
            if !is_hour_stamp(prefix) {
                return Err(malformed(format!("bad hour prefix {prefix:?}")));
            }
            if millis.is_empty() || !millis.bytes().all(|b| b.is_ascii_digit()) {
                return Err(malformed(format!("bad millis {millis:?}")));
            }
            let millis: i64 = millis.parse().map_err(|e| malformed(format!("{e}")))?;
            Local
                .timestamp_millis_opt(millis)
                .single()
                .ok_or_else(|| malformed(format!("timestamp out of range: {millis}")))
        }
    }
}

/// `YYYYMMDDHH`: exactly ten ASCII digits, nothing chrono would skip over.
fn is_hour_stamp(s: &str) -> bool {
    s.len() == 10 && s.bytes().all(|b| b.is_ascii_digit())
}

/// Absolute local-hour index, monotonic across day boundaries.
pub fn hour_index(now: &DateTime<Local>) -> i64 {
    now.naive_local().and_utc().timestamp().div_euclid(3600)
}
