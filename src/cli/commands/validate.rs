//! Validate command implementation.
//!
//! The `stagegate validate` command checks the pipeline file and prints the
//! resulting stage table.

use crate::cli::args::ValidateArgs;
use crate::config::validate_config;
use crate::error::Result;
use crate::ui::{StagegateTheme, UserInterface};

use super::dispatcher::{Command, CommandResult, ProjectLocation};
use super::stages::stage_lines;

/// The validate command implementation.
pub struct ValidateCommand {
    location: ProjectLocation,
    args: ValidateArgs,
}

impl ValidateCommand {
    /// Create a new validate command.
    pub fn new(location: ProjectLocation, args: ValidateArgs) -> Self {
        Self { location, args }
    }

    /// Get the command arguments.
    pub fn args(&self) -> &ValidateArgs {
        &self.args
    }
}

impl Command for ValidateCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let config = self.location.load()?;

        let errors = validate_config(&config);
        if !errors.is_empty() {
            for error in &errors {
                ui.error(&format!("[{}] {}", error.rule, error.message));
            }
            ui.message(&format!(
                "{} problem{} found",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" }
            ));
            return Ok(CommandResult::failure(2));
        }

        let theme = StagegateTheme::new();
        ui.success(&format!(
            "Pipeline is valid ({} stage{})",
            config.stages.len(),
            if config.stages.len() == 1 { "" } else { "s" }
        ));
        for line in stage_lines(&config, &theme) {
            ui.message(&line);
        }

        Ok(CommandResult::success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CONFIG_DIR, CONFIG_FILE};
    use crate::ui::MockUI;
    use std::fs;
    use tempfile::TempDir;

    fn validate(yaml: &str) -> (CommandResult, MockUI) {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join(CONFIG_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(CONFIG_FILE), yaml).unwrap();

        let cmd = ValidateCommand::new(ProjectLocation::new(temp.path()), ValidateArgs {});
        let mut ui = MockUI::new();
        let result = cmd.execute(&mut ui).unwrap();
        (result, ui)
    }

    #[test]
    fn valid_pipeline_prints_stage_table() {
        let (result, ui) = validate(
            r#"
stages:
  - name: fetch
    command: ./fetch.sh
  - name: generate
    gate: rtm_data.json
    command: ./generate.sh
"#,
        );

        assert_eq!(result, CommandResult::success());
        assert_eq!(ui.successes(), ["Pipeline is valid (2 stages)"]);
        assert!(ui.has_output("gate: rtm_data.json"));
    }

    #[test]
    fn reports_every_problem_with_exit_two() {
        let (result, ui) = validate(
            r#"
stages:
  - name: fetch
    ordinal: 1
    command: ./fetch.sh
  - name: generate
    ordinal: 1
    gate: ../outside.json
    command: ./generate.sh
"#,
        );

        assert_eq!(result, CommandResult::failure(2));
        assert_eq!(ui.errors().len(), 2);
        assert!(ui.has_output("[duplicate-ordinal]"));
        assert!(ui.has_output("[path-outside-workspace]"));
    }
}
