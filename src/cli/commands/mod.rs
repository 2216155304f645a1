//! CLI command implementations.
//!
//! Each command implements the [`Command`] trait, which provides a uniform
//! interface for executing commands and reporting results.
//!
//! # Architecture
//!
//! Commands are dispatched via [`CommandDispatcher`], which routes CLI
//! subcommands to their implementations. This allows:
//! - Single binary with subcommands (`stagegate run`, `stagegate stages`)
//! - One place where the pipeline file is located

pub mod cache;
pub mod dispatcher;
pub mod run;
pub mod stages;
pub mod validate;

pub use dispatcher::{Command, CommandDispatcher, CommandResult, ProjectLocation};
