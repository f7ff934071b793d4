//! Daily retention sweep: compress aged segments and cap the backup count.
//!
//! Per-file failures never abort a sweep. They are appended to
//! `clean_err.log` in the log directory and counted in the report.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, Local, TimeDelta};
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::LogConfig;
use crate::observability::metrics;
use crate::observability::segment::{parse_segment_time, COMPRESSED_EXT, ERR_LOG_NAME, SEGMENT_EXT};
use crate::observability::writer::RotatingFileWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_hold_days: u32,
    /// 0 keeps every backup.
    pub max_backups: usize,
    pub compress: bool,
}

impl RetentionPolicy {
    pub fn from_config(config: &LogConfig) -> Self {
        Self {
            max_hold_days: config.max_hold_days,
            max_backups: config.max_backups as usize,
            compress: config.enable_compress,
        }
    }

    pub fn enabled(&self) -> bool {
        self.max_hold_days > 0
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub compressed: usize,
    pub removed: usize,
    pub errors: usize,
}

pub struct RetentionSweeper {
    writer: Arc<RotatingFileWriter>,
    policy: RetentionPolicy,
}

struct Candidate {
    path: PathBuf,
    time: DateTime<Local>,
}

impl RetentionSweeper {
    pub fn new(writer: Arc<RotatingFileWriter>, policy: RetentionPolicy) -> Self {
        Self { writer, policy }
    }

    pub fn err_log_path(&self) -> PathBuf {
        self.writer.dir().join(ERR_LOG_NAME)
    }

    /// One pass over the log directory as of `now`.
    pub fn sweep_once(&self, now: DateTime<Local>) -> SweepReport {
        let mut report = SweepReport::default();
        let cutoff = now - TimeDelta::days(i64::from(self.policy.max_hold_days));

        let aged = match self.aged_segments(now, cutoff, &mut report) {
            Ok(aged) => aged,
            Err(e) => {
                self.log_err(now, &format!("read log dir {}: {e}", self.writer.dir().display()));
                report.errors += 1;
                return report;
            }
        };

        let mut remaining = Vec::with_capacity(aged.len());
        for candidate in aged {
            if !self.policy.compress {
                remaining.push(candidate);
                continue;
            }
            match compress_file(&candidate.path) {
                Ok(_) => report.compressed += 1,
                Err(e) => {
                    self.log_err(now, &format!("compress {}: {e}", candidate.path.display()));
                    report.errors += 1;
                    remaining.push(candidate);
                }
            }
        }

        if self.policy.max_backups > 0 && remaining.len() > self.policy.max_backups {
            remaining.sort_by(|a, b| b.time.cmp(&a.time));
            for candidate in remaining.drain(self.policy.max_backups..) {
                match fs::remove_file(&candidate.path) {
                    Ok(()) => report.removed += 1,
                    Err(e) => {
                        self.log_err(now, &format!("remove {}: {e}", candidate.path.display()));
                        report.errors += 1;
                    }
                }
            }
        }

        metrics::record_sweep(&report);
        report
    }

    /// Uncompressed segments whose embedded time is not after `cutoff`.
    ///
    /// Only an unreadable directory fails the sweep; a bad entry is logged
    /// and skipped.
    fn aged_segments(
        &self,
        now: DateTime<Local>,
        cutoff: DateTime<Local>,
        report: &mut SweepReport,
    ) -> io::Result<Vec<Candidate>> {
        let files = fs::read_dir(self.writer.dir())?.map(|entry| -> io::Result<Option<PathBuf>> {
            let entry = entry?;
            Ok(entry.file_type()?.is_file().then(|| entry.path()))
        });
        Ok(self.select_aged(now, cutoff, files, report))
    }

    fn select_aged(
        &self,
        now: DateTime<Local>,
        cutoff: DateTime<Local>,
        files: impl IntoIterator<Item = io::Result<Option<PathBuf>>>,
        report: &mut SweepReport,
    ) -> Vec<Candidate> {
        let live = self.writer.current_path();
        let mut aged = Vec::new();

        for file in files {
            let path = match file {
                Ok(Some(path)) => path,
                Ok(None) => continue,
                Err(e) => {
                    self.log_err(now, &format!("read {}: {e}", self.writer.dir().display()));
                    report.errors += 1;
                    continue;
                }
            };
            if path.extension().and_then(|ext| ext.to_str()) != Some(SEGMENT_EXT) {
                continue;
            }
            if live.as_deref() == Some(path.as_path()) {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name == ERR_LOG_NAME {
                continue;
            }

            match parse_segment_time(self.writer.mode(), name) {
                Ok(time) if time <= cutoff => aged.push(Candidate { path, time }),
                Ok(_) => {}
                Err(e) => {
                    self.log_err(now, &e.to_string());
                    report.errors += 1;
                }
            }
        }
        aged
    }

    fn log_err(&self, now: DateTime<Local>, msg: &str) {
        tracing::warn!(error = msg, "log retention error");
        let line = format!("{} {msg}\n", now.format("%Y-%m-%d %H:%M:%S"));
        let res = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.err_log_path())
            .and_then(|mut f| f.write_all(line.as_bytes()));
        if let Err(e) = res {
            tracing::error!(error = %e, "failed to append retention error log");
        }
    }

    /// Run the sweep every local midnight until `shutdown` fires.
    pub fn spawn(self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let sweeper = Arc::new(self);
        tokio::spawn(async move {
            tracing::info!(
                dir = %sweeper.writer.dir().display(),
                max_hold_days = sweeper.policy.max_hold_days,
                max_backups = sweeper.policy.max_backups,
                compress = sweeper.policy.compress,
                "log retention enabled"
            );
            loop {
                let wait = until_next_midnight(sweeper.writer.clock().now());
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = shutdown.recv() => break,
                }

                let job = Arc::clone(&sweeper);
                let result = tokio::task::spawn_blocking(move || {
                    let now = job.writer.clock().now();
                    job.sweep_once(now)
                })
                .await;
                match result {
                    Ok(report) => tracing::info!(
                        compressed = report.compressed,
                        removed = report.removed,
                        errors = report.errors,
                        "log retention sweep finished"
                    ),
                    Err(e) => tracing::error!(error = %e, "log retention sweep failed"),
                }
            }
            tracing::debug!("log retention stopped");
        })
    }
}

/// Gzip `path` to `<path>.gz` and remove the original. A partial archive is
/// removed on failure and the original kept.
pub fn compress_file(path: &Path) -> io::Result<PathBuf> {
    let mut target = path.as_os_str().to_owned();
    target.push(".");
    target.push(COMPRESSED_EXT);
    let target = PathBuf::from(target);

    let result = (|| {
        let mut input = BufReader::new(File::open(path)?);
        let output = File::create(&target)?;
        let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::default());
        io::copy(&mut input, &mut encoder)?;
        encoder.finish()?.flush()
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&target);
        return Err(e);
    }
    fs::remove_file(path)?;
    Ok(target)
}

/// Time left until the next local midnight.
pub fn until_next_midnight(now: DateTime<Local>) -> Duration {
    let next = now
        .date_naive()
        .checked_add_days(Days::new(1))
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(|t| t.and_local_timezone(Local).earliest());
    match next {
        Some(next) => (next - now).to_std().unwrap_or(Duration::from_secs(1)),
        None => Duration::from_secs(24 * 3600),
    }
}
