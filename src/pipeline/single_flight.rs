//! One build at a time per pipeline identity.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, StagegateError};
use crate::lock::FileLock;
use crate::shell::CancelToken;

/// What a build does when another build of the same pipeline is running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockPolicy {
    /// Wait for the running build to finish.
    #[default]
    Queue,
    /// Fail immediately.
    Reject,
}

/// Default directory for per-pipeline lock files.
pub fn default_lock_dir() -> PathBuf {
    std::env::temp_dir().join("stagegate-locks")
}

/// Lock file for `identity` inside `lock_dir`.
///
/// Identities are hashed so any string maps to a safe file name.
pub fn lock_path(lock_dir: &Path, identity: &str) -> PathBuf {
    let digest = Sha256::digest(identity.as_bytes());
    let name = hex::encode(&digest[..]);
    lock_dir.join(format!("{}.lock", &name[..16]))
}

/// Held for the whole build; released on drop.
#[derive(Debug)]
pub struct PipelineLock {
    identity: String,
    _lock: FileLock,
}

impl PipelineLock {
    /// Acquire the lock for `identity` under `policy`.
    ///
    /// # Errors
    ///
    /// [`StagegateError::PipelineLocked`] when rejected,
    /// [`StagegateError::LockTimeout`] when a queued wait runs out,
    /// [`StagegateError::LockCancelled`] when `cancel` fires while queued, or
    /// an I/O error if the lock file cannot be opened.
    pub fn acquire(
        lock_dir: &Path,
        identity: &str,
        policy: LockPolicy,
        wait_timeout: Option<Duration>,
        cancel: &CancelToken,
    ) -> Result<Self> {
        let path = lock_path(lock_dir, identity);

        let lock = match policy {
            LockPolicy::Reject => FileLock::try_acquire(&path)?.ok_or_else(|| {
                tracing::warn!(pipeline = %identity, "another build holds the pipeline; rejecting");
                StagegateError::PipelineLocked {
                    identity: identity.to_string(),
                }
            })?,
            LockPolicy::Queue => match FileLock::try_acquire(&path)? {
                Some(lock) => lock,
                None => {
                    tracing::info!(pipeline = %identity, "another build holds the pipeline; waiting");
                    let waited = FileLock::acquire(&path, wait_timeout, cancel).map_err(|e| {
                        if e.kind() == std::io::ErrorKind::Interrupted {
                            tracing::warn!(pipeline = %identity, "cancelled while queued");
                            StagegateError::LockCancelled {
                                identity: identity.to_string(),
                            }
                        } else {
                            e.into()
                        }
                    })?;
                    waited.ok_or_else(|| StagegateError::LockTimeout {
                        identity: identity.to_string(),
                        waited_secs: wait_timeout.map(|d| d.as_secs()).unwrap_or_default(),
                    })?
                }
            },
        };

        tracing::debug!(pipeline = %identity, lock = %path.display(), "pipeline lock acquired");
        Ok(Self {
            identity: identity.to_string(),
            _lock: lock,
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }
}
