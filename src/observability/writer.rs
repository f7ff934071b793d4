//! Rotating log writer.
//!
//! One mutex guards the open segment and its byte counter. A write either
//! lands entirely in the current segment or triggers rotation first, so a
//! formatted event never straddles two files.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local, TimeDelta};
use tracing_subscriber::fmt::MakeWriter;

use crate::config::LogConfig;
use crate::lifecycle::clock::Clock;
use crate::observability::metrics;
use crate::observability::segment::{hour_index, segment_name, RotationMode};

/// How many consecutive millisecond names a size rotation may skip.
const MAX_NAME_ATTEMPTS: i64 = 1000;

struct Segment {
    path: PathBuf,
    out: BufWriter<File>,
    size: u64,
}

#[derive(Default)]
struct Inner {
    segment: Option<Segment>,
    last_rotate_hour: Option<i64>,
}

pub struct RotatingFileWriter {
    dir: PathBuf,
    mode: RotationMode,
    clock: Clock,
    inner: Mutex<Inner>,
}

impl RotatingFileWriter {
    /// Resolve `log_path` against the working directory and create it.
    pub fn new(config: &LogConfig, clock: Clock) -> io::Result<Self> {
        let dir = std::env::current_dir()?.join(&config.log_path);
        Self::with_dir(dir, RotationMode::from_config(config), clock)
    }

    pub fn with_dir(dir: impl Into<PathBuf>, mode: RotationMode, clock: Clock) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            mode,
            clock,
            inner: Mutex::new(Inner::default()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn mode(&self) -> RotationMode {
        self.mode
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Path of the segment currently open, if any.
    pub fn current_path(&self) -> Option<PathBuf> {
        self.lock().segment.as_ref().map(|s| s.path.clone())
    }

    /// Append `buf` to the current segment, rotating first when due.
    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let now = self.clock.now();
        let mut inner = self.lock();

        if self.should_rotate(&inner, buf.len() as u64, &now) {
            self.rotate(&mut inner, &now)?;
        }
        let segment = match inner.segment.as_mut() {
            Some(segment) => segment,
            None => return Err(io::Error::other("no open log segment")),
        };
        segment.out.write_all(buf)?;
        segment.size += buf.len() as u64;
        Ok(buf.len())
    }

    pub fn flush(&self) -> io::Result<()> {
        match self.lock().segment.as_mut() {
            Some(segment) => segment.out.flush(),
            None => Ok(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn should_rotate(&self, inner: &Inner, len: u64, now: &DateTime<Local>) -> bool {
        let Some(segment) = inner.segment.as_ref() else {
            return true;
        };
        match self.mode {
            RotationMode::Size { max_bytes } => {
                segment.size > 0 && segment.size.saturating_add(len) >= max_bytes
            }
            RotationMode::Hourly { every } => match inner.last_rotate_hour {
                Some(last) => hour_index(now) - last >= i64::from(every),
                None => true,
            },
        }
    }

    fn rotate(&self, inner: &mut Inner, now: &DateTime<Local>) -> io::Result<()> {
        if let Some(mut old) = inner.segment.take() {
            if let Err(e) = old.out.flush() {
                eprintln!("flush log segment {} failed: {e}", old.path.display());
            }
        }

        let (path, file) = match self.mode {
            RotationMode::Hourly { .. } => {
                let path = self.dir.join(segment_name(self.mode, now));
                let file = OpenOptions::new().create(true).append(true).open(&path)?;
                (path, file)
            }
            RotationMode::Size { .. } => self.create_fresh(now)?,
        };
        let size = file.metadata().map(|m| m.len()).unwrap_or(0);

        inner.segment = Some(Segment {
            path,
            out: BufWriter::new(file),
            size,
        });
        inner.last_rotate_hour = Some(hour_index(now));
        metrics::record_segment_opened();
        Ok(())
    }

    /// Size segments never reopen an existing file. Two rotations inside the
    /// same millisecond take the next unused millisecond name instead.
    fn create_fresh(&self, now: &DateTime<Local>) -> io::Result<(PathBuf, File)> {
        for bump in 0..MAX_NAME_ATTEMPTS {
            let at = *now + TimeDelta::milliseconds(bump);
            let path = self.dir.join(segment_name(self.mode, &at));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free segment name within {MAX_NAME_ATTEMPTS}ms of {now}"),
        ))
    }
}

impl Drop for RotatingFileWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// Shared handle that plugs the writer into `tracing-subscriber`.
#[derive(Clone)]
pub struct LogSink(Arc<RotatingFileWriter>);

impl LogSink {
    pub fn new(writer: Arc<RotatingFileWriter>) -> Self {
        Self(writer)
    }
}

pub struct SegmentWriter<'a>(&'a RotatingFileWriter);

impl Write for SegmentWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = SegmentWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        SegmentWriter(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::segment::parse_segment_time;
    use chrono::Timelike;

    /// Clock shifted so that it reads `minute` past the current hour.
    fn clock_at_minute(minute: i64) -> Clock {
        let now = Local::now();
        let into_hour = i64::from(now.minute()) * 60 + i64::from(now.second());
        Clock::with_offset(minute * 60 - into_hour)
    }

    fn log_files(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.extension().is_some_and(|e| e == "log"))
            .collect();
        files.sort();
        files
    }

    #[test]
    fn opens_lazily_on_first_write() {
        let dir = tempfile::tempdir().unwrap();
        let writer =
            RotatingFileWriter::with_dir(dir.path(), RotationMode::Size { max_bytes: 1024 }, Clock::new())
                .unwrap();
        assert!(writer.current_path().is_none());
        assert!(log_files(dir.path()).is_empty());

        writer.write(b"hello\n").unwrap();
        writer.flush().unwrap();
        let path = writer.current_path().unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "hello\n");
    }

    #[test]
    fn size_mode_rotates_before_reaching_limit() {
        let dir = tempfile::tempdir().unwrap();
        let writer =
            RotatingFileWriter::with_dir(dir.path(), RotationMode::Size { max_bytes: 100 }, Clock::new())
                .unwrap();

        let line = [b'x'; 40];
        writer.write(&line).unwrap();
        writer.write(&line).unwrap();
        let first = writer.current_path().unwrap();
        // 80 + 40 >= 100
        writer.write(&line).unwrap();
        writer.flush().unwrap();
        let second = writer.current_path().unwrap();

        assert_ne!(first, second);
        assert_eq!(fs::metadata(&first).unwrap().len(), 80);
        assert_eq!(fs::metadata(&second).unwrap().len(), 40);
        for path in log_files(dir.path()) {
            let name = path.file_name().unwrap().to_str().unwrap();
            assert!(parse_segment_time(writer.mode(), name).is_ok(), "{name}");
        }
    }

    #[test]
    fn crossing_one_megabyte_rotates_once() {
        let dir = tempfile::tempdir().unwrap();
        let writer = RotatingFileWriter::with_dir(
            dir.path(),
            RotationMode::Size { max_bytes: 1024 * 1024 },
            Clock::new(),
        )
        .unwrap();

        let chunk = vec![b'z'; 64 * 1024];
        for _ in 0..15 {
            writer.write(&chunk).unwrap();
        }
        let first = writer.current_path().unwrap();
        writer.write(&chunk).unwrap();
        writer.write(&chunk).unwrap();
        writer.flush().unwrap();

        assert_eq!(log_files(dir.path()).len(), 2);
        assert_eq!(fs::metadata(&first).unwrap().len(), 15 * 64 * 1024);
        let second = writer.current_path().unwrap();
        assert_eq!(fs::metadata(&second).unwrap().len(), 2 * 64 * 1024);
    }

    #[test]
    fn back_to_back_rotations_never_exceed_the_cap() {
        let dir = tempfile::tempdir().unwrap();
        let writer =
            RotatingFileWriter::with_dir(dir.path(), RotationMode::Size { max_bytes: 100 }, Clock::new())
                .unwrap();

        let line = [b'q'; 40];
        for _ in 0..30 {
            writer.write(&line).unwrap();
        }
        writer.flush().unwrap();

        let files = log_files(dir.path());
        assert_eq!(files.len(), 15);
        for path in &files {
            assert_eq!(fs::metadata(path).unwrap().len(), 80, "{}", path.display());
            let name = path.file_name().unwrap().to_str().unwrap();
            assert!(parse_segment_time(writer.mode(), name).is_ok(), "{name}");
        }
    }

    #[test]
    fn size_rotation_skips_an_existing_name() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Clock::new();
        let mode = RotationMode::Size { max_bytes: 100 };
        // Occupy the next few milliseconds worth of names up front.
        let now = clock.now();
        for bump in 0..50 {
            let name = segment_name(mode, &(now + TimeDelta::milliseconds(bump)));
            fs::write(dir.path().join(name), b"old").unwrap();
        }

        let writer = RotatingFileWriter::with_dir(dir.path(), mode, clock).unwrap();
        writer.write(b"new\n").unwrap();
        writer.flush().unwrap();

        let path = writer.current_path().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
        assert_eq!(log_files(dir.path()).len(), 51);
    }

    #[test]
    fn oversized_write_goes_to_empty_segment() {
        let dir = tempfile::tempdir().unwrap();
        let writer =
            RotatingFileWriter::with_dir(dir.path(), RotationMode::Size { max_bytes: 10 }, Clock::new())
                .unwrap();
        writer.write(&[b'y'; 64]).unwrap();
        writer.flush().unwrap();
        assert_eq!(log_files(dir.path()).len(), 1);
    }

    #[test]
    fn hourly_mode_rotates_when_clock_advances() {
        let dir = tempfile::tempdir().unwrap();
        let clock = clock_at_minute(30);
        let base = clock.offset();
        let writer =
            RotatingFileWriter::with_dir(dir.path(), RotationMode::Hourly { every: 2 }, clock.clone())
                .unwrap();

        writer.write(b"a\n").unwrap();
        let first = writer.current_path().unwrap();

        clock.set_offset(base + 3600);
        writer.write(b"b\n").unwrap();
        assert_eq!(writer.current_path().unwrap(), first);

        clock.set_offset(base + 2 * 3600);
        writer.write(b"c\n").unwrap();
        writer.flush().unwrap();
        let second = writer.current_path().unwrap();

        assert_ne!(first, second);
        assert_eq!(fs::read_to_string(&first).unwrap(), "a\nb\n");
        assert_eq!(fs::read_to_string(&second).unwrap(), "c\n");
    }

    #[test]
    fn every_hour_splits_on_the_wall_clock_hour() {
        let dir = tempfile::tempdir().unwrap();
        let clock = clock_at_minute(30);
        let writer =
            RotatingFileWriter::with_dir(dir.path(), RotationMode::Hourly { every: 1 }, clock.clone())
                .unwrap();

        writer.write(b"a\n").unwrap();
        writer.write(b"b\n").unwrap();
        let first = writer.current_path().unwrap();

        clock.set_offset(clock.offset() + 3600);
        writer.write(b"c\n").unwrap();
        writer.flush().unwrap();
        let second = writer.current_path().unwrap();

        assert_ne!(first, second);
        assert_eq!(log_files(dir.path()).len(), 2);
        assert_eq!(fs::read_to_string(&first).unwrap(), "a\nb\n");
        assert_eq!(fs::read_to_string(&second).unwrap(), "c\n");
    }

    #[test]
    fn reopened_hour_segment_appends() {
        let dir = tempfile::tempdir().unwrap();
        let mode = RotationMode::Hourly { every: 1 };
        let clock = clock_at_minute(30);
        {
            let writer = RotatingFileWriter::with_dir(dir.path(), mode, clock.clone()).unwrap();
            writer.write(b"first\n").unwrap();
        }
        let writer = RotatingFileWriter::with_dir(dir.path(), mode, clock).unwrap();
        writer.write(b"second\n").unwrap();
        writer.flush().unwrap();

        let files = log_files(dir.path());
        assert_eq!(files.len(), 1);
        assert_eq!(fs::read_to_string(&files[0]).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn flush_without_segment_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let writer =
            RotatingFileWriter::with_dir(dir.path(), RotationMode::Hourly { every: 1 }, Clock::new())
                .unwrap();
        writer.flush().unwrap();
    }
}
