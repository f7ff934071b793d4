//! Single-instance guard backed by a pid file.
//!
//! Non-empty content means another instance is running. The guard is
//! acquired before anything else touches the system (no log segment, no
//! bound port), the pid is written once startup is ready, and the file is
//! removed on exit. Dropping an unreleased guard removes it too, which
//! covers unwinding out of startup.

use std::fs::{self, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PidError {
    #[error("process already running in pid:{0}")]
    AlreadyRunning(String),

    #[error("pid file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug)]
pub struct PidGuard {
    path: PathBuf,
    /// Cleared when the file turns out to belong to someone else.
    owned: bool,
    released: bool,
}

impl PidGuard {
    /// Create the pid file if missing; fail if it holds a pid.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self, PidError> {
        let path = path.as_ref().to_path_buf();
        let content = read_or_create(&path)?;
        if !content.is_empty() {
            return Err(PidError::AlreadyRunning(content));
        }
        Ok(Self {
            path,
            owned: true,
            released: false,
        })
    }

    /// Record `pid` in the guard file.
    pub fn persist(&mut self, pid: u32) -> Result<(), PidError> {
        let content = read_or_create(&self.path)?;
        let ours = pid.to_string();
        if !content.is_empty() && content != ours {
            self.owned = false;
            return Err(PidError::AlreadyRunning(content));
        }
        fs::write(&self.path, ours.as_bytes()).map_err(|source| PidError::Io {
            path: self.path.clone(),
            source,
        })?;
        tracing::info!(pid, path = %self.path.display(), "save pid file");
        Ok(())
    }

    /// Remove the guard file. A file that is already gone is not an error.
    pub fn release(mut self) -> Result<(), PidError> {
        self.released = true;
        if !self.owned {
            return Ok(());
        }
        let result = match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PidError::Io {
                path: self.path.clone(),
                source,
            }),
        };
        tracing::info!(path = %self.path.display(), ok = result.is_ok(), "drop pid file");
        result
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidGuard {
    fn drop(&mut self) {
        if !self.released && self.owned {
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn read_or_create(path: &Path) -> Result<String, PidError> {
    let io_err = |source| PidError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(io_err)?;
    let mut content = String::new();
    file.read_to_string(&mut content).map_err(io_err)?;
    Ok(content.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_persist_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gw.pid");

        let mut guard = PidGuard::acquire(&path).unwrap();
        assert!(path.exists());
        guard.persist(4242).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "4242");

        guard.release().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn empty_file_is_not_an_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gw.pid");
        fs::write(&path, "  \n").unwrap();
        assert!(PidGuard::acquire(&path).is_ok());
    }

    #[test]
    fn second_instance_is_refused_and_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gw.pid");
        fs::write(&path, "1234").unwrap();

        match PidGuard::acquire(&path) {
            Err(PidError::AlreadyRunning(pid)) => assert_eq!(pid, "1234"),
            other => panic!("expected AlreadyRunning, got {other:?}"),
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), "1234");
    }

    #[test]
    fn persist_refuses_foreign_pid_and_keeps_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gw.pid");
        let mut guard = PidGuard::acquire(&path).unwrap();
        fs::write(&path, "999").unwrap();

        assert!(matches!(guard.persist(1), Err(PidError::AlreadyRunning(_))));
        guard.release().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "999");
    }

    #[test]
    fn drop_removes_unreleased_guard() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gw.pid");
        {
            let mut guard = PidGuard::acquire(&path).unwrap();
            guard.persist(7).unwrap();
        }
        assert!(!path.exists());
    }

    #[test]
    fn release_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gw.pid");
        let guard = PidGuard::acquire(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert!(guard.release().is_ok());
    }
}
