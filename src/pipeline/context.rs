//! Shared, read-only build state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// State passed by reference to every gate and action.
///
/// Built once after parameters and credentials are resolved. There are no
/// mutating methods: stage-specific variables are layered on a copy by the
/// stage itself.
#[derive(Debug, Clone)]
pub struct BuildContext {
    parameters: BTreeMap<String, String>,
    environment: BTreeMap<String, String>,
    workspace_root: PathBuf,
    state_root: PathBuf,
}

impl BuildContext {
    /// Create a context.
    pub fn new(
        parameters: BTreeMap<String, String>,
        environment: BTreeMap<String, String>,
        workspace_root: impl Into<PathBuf>,
    ) -> Self {
        let workspace_root = workspace_root.into();
        Self {
            parameters,
            environment,
            state_root: workspace_root.clone(),
            workspace_root,
        }
    }

    /// Keep cache records, logs and summaries under `root` instead of the
    /// workspace. Needed when the workspace does not outlive the build.
    pub fn with_state_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.state_root = root.into();
        self
    }

    /// Trigger parameters by name.
    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    /// Look up one parameter.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    /// Environment exported to every step, credentials included.
    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    /// Directory stages run in and gate paths resolve against.
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Resolve a workspace-relative path.
    pub fn resolve(&self, relative: &Path) -> PathBuf {
        self.workspace_root.join(relative)
    }

    /// Directory that persists across builds.
    pub fn state_root(&self) -> &Path {
        &self.state_root
    }

    /// Resolve a path that must survive the build.
    pub fn resolve_state(&self, relative: &Path) -> PathBuf {
        self.state_root.join(relative)
    }
}
