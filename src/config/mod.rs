//! Pipeline configuration loading, parsing, and validation.
//!
//! This module handles all aspects of configuration:
//! - Schema definitions in [`schema`]
//! - File discovery and loading in [`loader`]
//! - Validation in [`validator`]
//! - Parameter interpolation in [`interpolation`]
//!
//! # Example
//!
//! ```
//! use stagegate::config::{load_config, validate};
//! use tempfile::TempDir;
//! use std::fs;
//!
//! let temp = TempDir::new().unwrap();
//! let dir = temp.path().join(".stagegate");
//! fs::create_dir_all(&dir).unwrap();
//! fs::write(
//!     dir.join("pipeline.yml"),
//!     "name: rtm\nstages:\n  - name: fetch\n    command: echo fetch\n",
//! )
//! .unwrap();
//!
//! let config = load_config(temp.path(), None).unwrap();
//! validate(&config).unwrap();
//! assert_eq!(config.stages[0].name, "fetch");
//! ```

pub mod interpolation;
pub mod loader;
pub mod schema;
pub mod validator;

pub use schema::{
    CacheConfig, ConcurrencyConfig, CredentialConfig, HookConfig, HooksConfig, ParameterConfig,
    PipelineConfig, SecretBackendKind, SecretsConfig, Settings, StageConfig, WorkspaceConfig,
};

pub use loader::{
    default_config_path, find_project_root, load_config, load_config_file, parse_config,
    CONFIG_DIR, CONFIG_FILE,
};

pub use validator::{is_workspace_relative, validate, validate_config, ValidationError};

pub use interpolation::{expand_parameters, parse_template, referenced_names, Segment};
