//! Stagegate - gated, cache-aware build pipelines.
//!
//! Stagegate runs a fixed, ordered list of shell stages. Each stage may be
//! gated on an artifact left by an earlier one, expensive setup is skipped
//! while its dependency manifest is unchanged, credentials are bound into
//! the environment and masked in every output, and post-build hooks follow
//! the terminal state.
//!
//! # Modules
//!
//! - [`cache`] - Manifest-hash gating for install stages
//! - [`cli`] - Command-line interface and argument parsing
//! - [`config`] - Pipeline file loading, parsing, and validation
//! - [`error`] - Error types and result aliases
//! - [`lock`] - Advisory file locks
//! - [`pipeline`] - Stage graph, step runner, hooks, and workspace handling
//! - [`secrets`] - Credential resolution and output masking
//! - [`shell`] - Child process execution
//! - [`ui`] - Terminal output
//!
//! # Example
//!
//! ```
//! use stagegate::config::expand_parameters;
//! use std::collections::BTreeMap;
//!
//! let mut params = BTreeMap::new();
//! params.insert("project_key".to_string(), "ACME".to_string());
//! let command = expand_parameters("./fetch.sh ${project_key} $${HOME}", &params);
//! assert_eq!(command, "./fetch.sh ACME ${HOME}");
//! ```

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod lock;
pub mod pipeline;
pub mod secrets;
pub mod shell;
pub mod ui;

pub use error::{Result, StagegateError};
