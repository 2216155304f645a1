//! Exclusive advisory file locks.
//!
//! Used for single-flight builds per pipeline identity and for the
//! read-install-write sequence on shared cache records. The lock is held for
//! as long as the returned [`FileLock`] lives; dropping it closes the file,
//! which releases the lock.

use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::shell::CancelToken;

/// How often a waiting caller retries.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A held exclusive lock.
#[derive(Debug)]
pub struct FileLock {
    _file: File,
    path: PathBuf,
}

impl FileLock {
    /// Try to take the lock without blocking.
    ///
    /// Returns `Ok(None)` if another holder has it.
    pub fn try_acquire(path: &Path) -> io::Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        if !try_lock_exclusive(&file)? {
            return Ok(None);
        }

        // Owner breadcrumb for whoever finds the lock held.
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;

        Ok(Some(Self {
            _file: file,
            path: path.to_path_buf(),
        }))
    }

    /// Take the lock, polling until it is free.
    ///
    /// With `wait = None` this waits indefinitely; otherwise it returns
    /// `Ok(None)` once `wait` has elapsed without success.
    ///
    /// # Errors
    ///
    /// An error of kind [`io::ErrorKind::Interrupted`] when `cancel` fires
    /// while waiting.
    pub fn acquire(
        path: &Path,
        wait: Option<Duration>,
        cancel: &CancelToken,
    ) -> io::Result<Option<Self>> {
        let start = Instant::now();
        loop {
            if let Some(lock) = Self::try_acquire(path)? {
                return Ok(Some(lock));
            }
            if cancel.is_cancelled() {
                return Err(io::Error::new(
                    io::ErrorKind::Interrupted,
                    format!("cancelled while waiting for {}", path.display()),
                ));
            }
            if wait.is_some_and(|limit| start.elapsed() >= limit) {
                return Ok(None);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Try to take an exclusive lock on `file` without blocking.
///
/// Returns `Ok(false)` if another open handle holds it.
fn try_lock_exclusive(file: &File) -> io::Result<bool> {
    match file.try_lock() {
        Ok(()) => Ok(true),
        Err(TryLockError::WouldBlock) => Ok(false),
        Err(TryLockError::Error(e)) => Err(e),
    }
}
