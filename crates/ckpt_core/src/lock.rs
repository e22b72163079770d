//! Per-repository exclusive lock and operation deadlines.

use crate::error::{CkptError, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Interval between lock attempts.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// RAII guard for a repository lock.
///
/// Holds an exclusive advisory lock on the repository's `LOCK` file, so
/// mutating operations serialize across threads and processes. The lock is
/// released when the guard drops. The file itself stays in place: removing
/// it would let a waiter lock an unlinked inode.
#[derive(Debug)]
pub struct RepoLock {
    file: File,
    path: PathBuf,
}

impl RepoLock {
    /// Acquires the lock at `path`, retrying until `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryLocked` if another holder keeps the lock for the
    /// whole timeout.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let started = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => break,
                Err(_) if started.elapsed() < timeout => thread::sleep(POLL_INTERVAL),
                Err(_) => {
                    return Err(CkptError::RepositoryLocked {
                        waited_ms: started.elapsed().as_millis() as u64,
                    })
                }
            }
        }

        // Owner pid is informational only
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;

        debug!(path = %path.display(), waited_ms = started.elapsed().as_millis() as u64, "Acquired repository lock");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Point in time after which a long operation gives up.
///
/// A timeout too large to represent as an `Instant` means no deadline.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// A deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(timeout),
        }
    }

    /// True once the deadline has passed.
    pub fn expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Time left, zero once expired and `Duration::MAX` without a deadline.
    pub fn remaining(&self) -> Duration {
        match self.at {
            Some(at) => at.saturating_duration_since(Instant::now()),
            None => Duration::MAX,
        }
    }

    /// Fails with `DeadlineExceeded` naming `operation` if the deadline passed.
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.expired() {
            return Err(CkptError::DeadlineExceeded(operation.to_string()));
        }
        Ok(())
    }
}
