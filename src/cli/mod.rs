//! Command-line interface for stagegate.
//!
//! # Architecture
//!
//! - [`args`] - Argument definitions using clap derive macros
//! - [`commands`] - Command implementations

pub mod args;
pub mod commands;

pub use args::{Cli, Commands, RunArgs, StagesArgs, ValidateArgs};
pub use commands::cache::{CacheArgs, CacheSubcommand};
pub use commands::{Command, CommandDispatcher, CommandResult, ProjectLocation};
