//! Run command implementation.
//!
//! The `stagegate run` command triggers one build.

use std::collections::BTreeMap;

use crate::cli::args::RunArgs;
use crate::error::{Result, StagegateError};
use crate::pipeline::{BuildReport, BuildRequest, Pipeline, StageProgress};
use crate::shell::CancelToken;
use crate::ui::UserInterface;

use super::dispatcher::{Command, CommandResult, ProjectLocation};

/// The run command implementation.
pub struct RunCommand {
    location: ProjectLocation,
    args: RunArgs,
    cancel: CancelToken,
}

impl RunCommand {
    /// Create a new run command that stops on SIGINT/SIGTERM.
    pub fn new(location: ProjectLocation, args: RunArgs) -> Self {
        Self {
            location,
            args,
            cancel: CancelToken::from_interrupts(),
        }
    }

    /// Get the command arguments.
    pub fn args(&self) -> &RunArgs {
        &self.args
    }

    fn request(&self) -> BuildRequest {
        let parameters: BTreeMap<String, String> = self.args.params.iter().cloned().collect();
        BuildRequest {
            parameters,
            workspace: self.args.workspace.clone(),
        }
    }
}

impl Command for RunCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let config = match self.location.load() {
            Ok(config) => config,
            Err(e @ StagegateError::ConfigNotFound { .. }) => {
                ui.error("No pipeline found. Create .stagegate/pipeline.yml or pass --config.");
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let mut pipeline =
            Pipeline::new(config, &self.location.root).with_cancel(self.cancel.clone());
        ui.show_header(&format!("Pipeline {}", pipeline.identity()));

        let report = pipeline.trigger_with_progress(&self.request(), |event| match event {
            StageProgress::StageStarting { name, index, total } => {
                ui.stage_started(name, index, total)
            }
            StageProgress::StageFinished { result } => ui.stage_finished(result),
        })?;

        show_report(&report, ui);

        Ok(if report.outcome.is_success() {
            CommandResult::success()
        } else {
            CommandResult::failure(report.exit_code())
        })
    }
}

fn show_report(report: &BuildReport, ui: &mut dyn UserInterface) {
    if let Some(failed) = report.outcome.failed_stage() {
        ui.show_output_tail(&failed.stage_name, &failed.output_tail);
    }

    for hook in report.hooks.failures() {
        ui.warning(&format!(
            "{} hook '{}' failed: {}",
            hook.phase,
            hook.name,
            hook.error.as_deref().unwrap_or("unknown error")
        ));
    }

    match report.outcome.failed_stage() {
        None => ui.success(&format!("Pipeline {} succeeded", report.identity)),
        Some(failed) => {
            let reason = failed
                .failure
                .map(|r| r.to_string())
                .unwrap_or_else(|| "failed".to_string());
            ui.error(&format!(
                "Pipeline {} failed at stage '{}' ({})",
                report.identity, failed.stage_name, reason
            ));
        }
    }
}
