//! Configuration file discovery and loading.

use crate::config::schema::PipelineConfig;
use crate::error::{Result, StagegateError};
use std::fs;
use std::path::{Path, PathBuf};

/// Directory holding stagegate files inside a project.
pub const CONFIG_DIR: &str = ".stagegate";

/// Pipeline definition file name.
pub const CONFIG_FILE: &str = "pipeline.yml";

/// Default config location for a project root.
pub fn default_config_path(project_root: &Path) -> PathBuf {
    project_root.join(CONFIG_DIR).join(CONFIG_FILE)
}

/// Find the project root by walking up from `start`.
///
/// Looks for a `.stagegate` directory first, then falls back to `.git`.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        if current.join(CONFIG_DIR).is_dir() {
            return Some(current);
        }

        if current.join(".git").exists() {
            return Some(current);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Load a single config file and parse it into a [`PipelineConfig`].
///
/// # Errors
///
/// Returns `ConfigNotFound` if the file doesn't exist.
/// Returns `ConfigParseError` if the YAML is invalid.
pub fn load_config_file(path: &Path) -> Result<PipelineConfig> {
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StagegateError::ConfigNotFound {
                path: path.to_path_buf(),
            }
        } else {
            StagegateError::Io(e)
        }
    })?;

    parse_config(&content, path)
}

/// Parse YAML content into a [`PipelineConfig`].
///
/// `source_path` is only used for error reporting.
pub fn parse_config(content: &str, source_path: &Path) -> Result<PipelineConfig> {
    serde_yaml::from_str(content).map_err(|e| StagegateError::ConfigParseError {
        path: source_path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Load the pipeline for a project.
///
/// An explicit path wins over `<project_root>/.stagegate/pipeline.yml`.
/// Relative explicit paths are taken relative to the project root.
pub fn load_config(project_root: &Path, explicit: Option<&Path>) -> Result<PipelineConfig> {
    let path = match explicit {
        Some(p) if p.is_absolute() => p.to_path_buf(),
        Some(p) => project_root.join(p),
        None => default_config_path(project_root),
    };

    tracing::debug!(path = %path.display(), "loading pipeline config");
    load_config_file(&path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(root: &Path, content: &str) {
        let dir = root.join(CONFIG_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(CONFIG_FILE), content).unwrap();
    }

    #[test]
    fn loads_default_location() {
        let temp = TempDir::new().unwrap();
        write_config(temp.path(), "name: rtm\nstages: []\n");

        let config = load_config(temp.path(), None).unwrap();
        assert_eq!(config.name.as_deref(), Some("rtm"));
    }

    #[test]
    fn explicit_relative_path_resolves_from_project_root() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("ci.yml"), "name: nightly\n").unwrap();

        let config = load_config(temp.path(), Some(Path::new("ci.yml"))).unwrap();
        assert_eq!(config.name.as_deref(), Some("nightly"));
    }

    #[test]
    fn missing_file_is_config_not_found() {
        let temp = TempDir::new().unwrap();
        let result = load_config(temp.path(), None);
        assert!(matches!(result, Err(StagegateError::ConfigNotFound { .. })));
    }

    #[test]
    fn invalid_yaml_is_parse_error() {
        let temp = TempDir::new().unwrap();
        write_config(temp.path(), "stages: [unclosed\n");

        let result = load_config(temp.path(), None);
        assert!(matches!(result, Err(StagegateError::ConfigParseError { .. })));
    }

    #[test]
    fn find_project_root_walks_up() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join(CONFIG_DIR)).unwrap();
        let nested = temp.path().join("scripts").join("lib");
        fs::create_dir_all(&nested).unwrap();

        let root = find_project_root(&nested).unwrap();
        assert_eq!(root, temp.path());
    }
}
