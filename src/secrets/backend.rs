//! Secret backends.
//!
//! A backend is the capability the [`SecretStore`](super::SecretStore) uses to
//! look up a credential by id. The store never knows where values live.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Prefix of the process variables read by [`EnvBackend`].
pub const ENV_SECRET_PREFIX: &str = "STAGEGATE_SECRET_";

/// Looks up credential values by id.
pub trait SecretBackend: Send + Sync {
    /// Human-readable backend name for logs.
    fn name(&self) -> &str;

    /// Fetch the value for `id`.
    ///
    /// # Errors
    ///
    /// Returns an error when the id is unknown or the backend is unreachable.
    /// Error messages must never contain secret values.
    fn fetch(&self, id: &str) -> Result<String>;
}

/// A shared backend serves every build of a long-lived pipeline.
impl<B: SecretBackend + ?Sized> SecretBackend for Arc<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch(&self, id: &str) -> Result<String> {
        (**self).fetch(id)
    }
}

/// Reads `STAGEGATE_SECRET_<ID>` from the launching process.
///
/// The id is upper-cased and `-` / `.` become `_`, so `jira-token` is read
/// from `STAGEGATE_SECRET_JIRA_TOKEN`.
#[derive(Debug, Clone, Default)]
pub struct EnvBackend {
    /// Snapshot used in tests instead of the live process environment.
    vars: Option<HashMap<String, String>>,
}

impl EnvBackend {
    /// Backend over the live process environment.
    pub fn new() -> Self {
        Self { vars: None }
    }

    /// Backend over a fixed set of variables.
    pub fn with_vars(vars: HashMap<String, String>) -> Self {
        Self { vars: Some(vars) }
    }

    /// Variable name a credential id is read from.
    pub fn variable_for(id: &str) -> String {
        let normalized: String = id
            .chars()
            .map(|c| match c {
                '-' | '.' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();
        format!("{}{}", ENV_SECRET_PREFIX, normalized)
    }
}

impl SecretBackend for EnvBackend {
    fn name(&self) -> &str {
        "env"
    }

    fn fetch(&self, id: &str) -> Result<String> {
        let var = Self::variable_for(id);
        let value = match &self.vars {
            Some(vars) => vars.get(&var).cloned(),
            None => std::env::var(&var).ok(),
        };

        match value {
            Some(v) if !v.is_empty() => Ok(v),
            Some(_) => bail!("{} is set but empty", var),
            None => bail!("{} is not set", var),
        }
    }
}

/// Reads credentials from a `KEY=value` secrets file.
///
/// Supported syntax: `# comments`, blank lines, optional `export ` prefix,
/// single or double quoted values, whitespace around `=`.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
    entries: HashMap<String, String>,
}

impl FileBackend {
    /// Load a secrets file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read secrets file {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            entries: Self::parse(&content),
        })
    }

    /// Parse secrets file content.
    pub fn parse(content: &str) -> HashMap<String, String> {
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let line = line.strip_prefix("export ").unwrap_or(line);
                let (key, value) = line.split_once('=')?;
                let key = key.trim();
                if key.is_empty() {
                    return None;
                }
                Some((key.to_string(), unquote(value.trim()).to_string()))
            })
            .collect()
    }
}

fn unquote(value: &str) -> &str {
    let quoted = value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')));
    if quoted {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

impl SecretBackend for FileBackend {
    fn name(&self) -> &str {
        "file"
    }

    fn fetch(&self, id: &str) -> Result<String> {
        match self.entries.get(id) {
            Some(v) if !v.is_empty() => Ok(v.clone()),
            Some(_) => bail!("'{}' is empty in {}", id, self.path.display()),
            None => bail!("'{}' not found in {}", id, self.path.display()),
        }
    }
}

/// In-memory backend for embedders and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    values: HashMap<String, String>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a credential (builder style).
    pub fn with(mut self, id: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(id.into(), value.into());
        self
    }
}

impl SecretBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch(&self, id: &str) -> Result<String> {
        self.values
            .get(id)
            .cloned()
            .with_context(|| format!("'{}' is not defined", id))
    }
}
