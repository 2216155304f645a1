//! Build workspace acquisition and guaranteed cleanup.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::is_workspace_relative;
use crate::error::Result;

/// How the build's working directory is provided.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceMode {
    /// Run in the project directory; remove only transient paths.
    #[default]
    Persistent,
    /// Run in a fresh temporary directory removed wholesale.
    Ephemeral,
}

/// Hands out a workspace for one build.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    mode: WorkspaceMode,
    base: PathBuf,
    transient: Vec<PathBuf>,
}

impl WorkspaceManager {
    /// `base` is the project directory used in persistent mode.
    pub fn new(mode: WorkspaceMode, base: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            base: base.into(),
            transient: Vec::new(),
        }
    }

    /// Workspace-relative paths removed when the build ends.
    pub fn with_transient(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.transient.extend(paths);
        self
    }

    pub fn mode(&self) -> WorkspaceMode {
        self.mode
    }

    /// Acquire the workspace. Cleanup happens when the guard drops.
    ///
    /// # Errors
    ///
    /// Fails if the temporary or scratch directory cannot be created, or the
    /// persistent base directory does not exist.
    pub fn acquire(&self) -> Result<WorkspaceGuard> {
        let (root, temp) = match self.mode {
            WorkspaceMode::Persistent => {
                if !self.base.is_dir() {
                    return Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("workspace {} does not exist", self.base.display()),
                    )
                    .into());
                }
                (self.base.clone(), None)
            }
            WorkspaceMode::Ephemeral => {
                let temp = tempfile::Builder::new().prefix("stagegate-").tempdir()?;
                (temp.path().to_path_buf(), Some(temp))
            }
        };

        let scratch = root
            .join(crate::config::CONFIG_DIR)
            .join("scratch")
            .join(format!("build-{}", std::process::id()));
        fs::create_dir_all(&scratch)?;

        tracing::debug!(root = %root.display(), mode = ?self.mode, "workspace acquired");
        Ok(WorkspaceGuard {
            root,
            scratch,
            transient: self.transient.clone(),
            temp,
        })
    }
}

/// A held workspace. Dropping it (normally, on early return, or while
/// unwinding) removes the scratch directory and transient paths.
#[derive(Debug)]
pub struct WorkspaceGuard {
    root: PathBuf,
    scratch: PathBuf,
    transient: Vec<PathBuf>,
    temp: Option<tempfile::TempDir>,
}

impl WorkspaceGuard {
    /// Directory stages run in.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Per-build scratch directory, removed on release.
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch
    }

    /// Release now instead of at drop.
    pub fn release(self) {
        drop(self);
    }

    fn cleanup(&mut self) {
        for relative in &self.transient {
            if !is_workspace_relative(relative) {
                tracing::warn!(path = %relative.display(), "refusing to remove path outside workspace");
                continue;
            }
            remove_path(&self.root.join(relative));
        }
        remove_path(&self.scratch);

        if let Some(temp) = self.temp.take() {
            let path = temp.path().to_path_buf();
            if let Err(e) = temp.close() {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove ephemeral workspace");
            }
        }
        tracing::debug!(root = %self.root.display(), "workspace released");
    }
}

impl Drop for WorkspaceGuard {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn remove_path(path: &Path) {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove transient path");
    }
}
