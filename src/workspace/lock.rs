// src/workspace/lock.rs

//! Per-session exclusive lock
//!
//! A session is locked while an install/validate invocation runs in it and
//! while it is being deleted or swept. The lock has two layers:
//!
//! - **In-process**: an owned `tokio::sync::Mutex` guard, so the lock can move
//!   into the worker task that owns the child process
//! - **Advisory file lock**: `flock(LOCK_EX)` on `<session>/.session.lock`,
//!   visible to other processes sharing the sessions root
//!
//! Acquisition never blocks. Contention is reported as `SessionBusy`.

use crate::{Error, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Name of the lock file inside each session root
pub const LOCK_FILE: &str = ".session.lock";

/// Exclusive hold on one session, released on drop
pub struct SessionLock {
    session_id: String,
    _guard: OwnedMutexGuard<()>,
    /// Kept open to maintain the flock
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
}

impl SessionLock {
    /// Try to take both lock layers without blocking
    pub(crate) fn try_acquire(
        session_id: &str,
        mutex: Arc<Mutex<()>>,
        session_root: &Path,
    ) -> Result<Self> {
        let guard = mutex
            .try_lock_owned()
            .map_err(|_| Error::SessionBusy(session_id.to_string()))?;

        let path = session_root.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| Error::IoError(format!("Failed to open session lock {:?}: {}", path, e)))?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                tracing::debug!(session_id, "Acquired session lock");
                Ok(Self {
                    session_id: session_id.to_string(),
                    _guard: guard,
                    file,
                    path,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                tracing::debug!(session_id, "Session lock held by another process");
                Err(Error::SessionBusy(session_id.to_string()))
            }
            Err(e) => Err(Error::IoError(format!(
                "Failed to try-acquire session lock: {}",
                e
            ))),
        }
    }

    /// Session this lock belongs to
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Get the path to the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for SessionLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLock")
            .field("session_id", &self.session_id)
            .field("path", &self.path)
            .finish()
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        // flock is released when the file is closed
        tracing::debug!(session_id = %self.session_id, "Released session lock");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_is_busy() {
        let temp_dir = TempDir::new().unwrap();
        let mutex = Arc::new(Mutex::new(()));

        let lock = SessionLock::try_acquire("s1", mutex.clone(), temp_dir.path()).unwrap();
        assert!(lock.path().exists());
        assert_eq!(lock.session_id(), "s1");

        let err = SessionLock::try_acquire("s1", mutex.clone(), temp_dir.path()).unwrap_err();
        assert!(matches!(err, Error::SessionBusy(ref id) if id == "s1"));

        drop(lock);
        assert!(SessionLock::try_acquire("s1", mutex, temp_dir.path()).is_ok());
    }

    #[test]
    fn test_file_lock_blocks_independent_mutex() {
        let temp_dir = TempDir::new().unwrap();
        let _held = SessionLock::try_acquire("s1", Arc::new(Mutex::new(())), temp_dir.path())
            .unwrap();

        // A second registry (another process sharing the root) sees the flock
        let err = SessionLock::try_acquire("s1", Arc::new(Mutex::new(())), temp_dir.path())
            .unwrap_err();
        assert!(matches!(err, Error::SessionBusy(_)));
    }
}
