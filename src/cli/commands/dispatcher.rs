//! Command dispatching.
//!
//! This module provides the core command infrastructure:
//! - [`Command`] trait for implementing commands
//! - [`CommandResult`] for uniform result reporting
//! - [`CommandDispatcher`] for routing CLI subcommands

use std::path::{Path, PathBuf};

use crate::cli::args::{Cli, Commands};
use crate::config::{load_config, PipelineConfig};
use crate::error::Result;
use crate::ui::UserInterface;

/// Trait for command implementations.
///
/// Each CLI subcommand implements this trait to provide its execution logic.
pub trait Command {
    /// Execute the command.
    ///
    /// # Returns
    ///
    /// A [`CommandResult`] indicating success/failure and exit code.
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult>;
}

/// Result of command execution.
#[derive(Debug, PartialEq, Eq)]
pub struct CommandResult {
    /// Whether the command succeeded.
    pub success: bool,

    /// Exit code to use (0 for success, non-zero for failure).
    pub exit_code: i32,
}

impl CommandResult {
    /// Create a successful result.
    pub fn success() -> Self {
        Self {
            success: true,
            exit_code: 0,
        }
    }

    /// Create a failure result.
    pub fn failure(exit_code: i32) -> Self {
        Self {
            success: false,
            exit_code,
        }
    }
}

/// Where a command finds its pipeline.
#[derive(Debug, Clone)]
pub struct ProjectLocation {
    pub root: PathBuf,
    pub config: Option<PathBuf>,
}

impl ProjectLocation {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            config: None,
        }
    }

    pub fn with_config(mut self, config: Option<PathBuf>) -> Self {
        self.config = config;
        self
    }

    /// Load the pipeline file.
    pub fn load(&self) -> Result<PipelineConfig> {
        load_config(&self.root, self.config.as_deref())
    }
}

/// Dispatches CLI commands to their implementations.
pub struct CommandDispatcher {
    location: ProjectLocation,
}

impl CommandDispatcher {
    /// Create a new dispatcher for the given project.
    pub fn new(location: ProjectLocation) -> Self {
        Self { location }
    }

    /// Get the project root path.
    pub fn project_root(&self) -> &Path {
        &self.location.root
    }

    /// Dispatch and execute a command.
    pub fn dispatch(&self, cli: &Cli, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let location = self.location.clone();
        match &cli.command {
            Commands::Run(args) => super::run::RunCommand::new(location, args.clone()).execute(ui),
            Commands::Validate(args) => {
                super::validate::ValidateCommand::new(location, args.clone()).execute(ui)
            }
            Commands::Stages(args) => {
                super::stages::StagesCommand::new(location, args.clone()).execute(ui)
            }
            Commands::Cache(args) => {
                super::cache::CacheCommand::new(location, args.clone()).execute(ui)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StagegateError;
    use crate::ui::MockUI;
    use clap::Parser;
    use tempfile::TempDir;

    #[test]
    fn command_result_success() {
        let result = CommandResult::success();
        assert!(result.success);
        assert_eq!(result.exit_code, 0);
    }

    #[test]
    fn command_result_failure() {
        let result = CommandResult::failure(2);
        assert!(!result.success);
        assert_eq!(result.exit_code, 2);
    }

    #[test]
    fn dispatcher_stores_project_root() {
        let temp = TempDir::new().unwrap();
        let dispatcher = CommandDispatcher::new(ProjectLocation::new(temp.path()));
        assert_eq!(dispatcher.project_root(), temp.path());
    }

    #[test]
    fn dispatch_without_config_is_config_not_found() {
        let temp = TempDir::new().unwrap();
        let dispatcher = CommandDispatcher::new(ProjectLocation::new(temp.path()));
        let cli = Cli::parse_from(["stagegate", "stages"]);
        let mut ui = MockUI::new();

        let err = dispatcher.dispatch(&cli, &mut ui).unwrap_err();
        assert!(matches!(err, StagegateError::ConfigNotFound { .. }));
    }
}
