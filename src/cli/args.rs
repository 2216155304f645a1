//! CLI argument definitions.
//!
//! This module defines all CLI arguments using clap's derive macros.
//! The main entry point is the [`Cli`] struct.

use clap::{Parser, Subcommand};
use std::fmt;
use std::path::PathBuf;

/// Stagegate - gated, cache-aware build pipelines.
#[derive(Debug, Parser)]
#[command(name = "stagegate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to pipeline file (overrides default .stagegate/pipeline.yml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to project root (overrides current directory)
    #[arg(short, long, global = true)]
    pub project: Option<PathBuf>,

    /// Errors and final status only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

use super::commands::cache::CacheArgs;

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Trigger a build
    Run(RunArgs),

    /// Check the pipeline file
    Validate(ValidateArgs),

    /// List stages in execution order
    Stages(StagesArgs),

    /// Inspect or reset install caches
    Cache(CacheArgs),
}

/// Arguments for the `run` command.
#[derive(Clone, Default, clap::Args)]
pub struct RunArgs {
    /// Trigger parameter (repeatable)
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub params: Vec<(String, String)>,

    /// Run in this directory instead of the project root
    #[arg(long)]
    pub workspace: Option<PathBuf>,
}

// Parameter values may carry trigger tokens; only names are printed.
impl fmt::Debug for RunArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|(key, _)| format!("{}=[REDACTED]", key))
            .collect();
        f.debug_struct("RunArgs")
            .field("params", &params)
            .field("workspace", &self.workspace)
            .finish()
    }
}

/// Arguments for the `validate` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ValidateArgs {}

/// Arguments for the `stages` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct StagesArgs {}

/// Parse `KEY=VALUE`.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("empty parameter name in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}
