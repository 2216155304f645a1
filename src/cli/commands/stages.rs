//! Stages command implementation.
//!
//! The `stagegate stages` command lists stages in execution order.

use crate::cli::args::StagesArgs;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::pipeline::effective_ordinals;
use crate::ui::{StagegateTheme, UserInterface};

use super::dispatcher::{Command, CommandResult, ProjectLocation};

/// The stages command implementation.
pub struct StagesCommand {
    location: ProjectLocation,
    args: StagesArgs,
}

impl StagesCommand {
    /// Create a new stages command.
    pub fn new(location: ProjectLocation, args: StagesArgs) -> Self {
        Self { location, args }
    }

    /// Get the command arguments.
    pub fn args(&self) -> &StagesArgs {
        &self.args
    }
}

impl Command for StagesCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let config = self.location.load()?;
        for line in stage_lines(&config, &StagegateTheme::new()) {
            ui.message(&line);
        }
        Ok(CommandResult::success())
    }
}

/// One line per stage, ordered by effective ordinal.
pub(crate) fn stage_lines(config: &PipelineConfig, theme: &StagegateTheme) -> Vec<String> {
    let ordinals = effective_ordinals(&config.stages);
    let mut rows: Vec<_> = ordinals.into_iter().zip(&config.stages).collect();
    rows.sort_by_key(|(ordinal, _)| *ordinal);

    let width = config
        .stages
        .iter()
        .map(|s| s.name.len())
        .max()
        .unwrap_or(0);

    rows.into_iter()
        .map(|(ordinal, stage)| {
            let gate = stage
                .gate
                .as_ref()
                .map(|g| format!("gate: {}", g.display()))
                .unwrap_or_else(|| "always".to_string());
            let timeout = stage.timeout.unwrap_or(config.settings.default_timeout);
            let cached = if stage.cache.is_some() { ", cached" } else { "" };

            let mut line = format!(
                "  {:>3}  {:<width$}  {}",
                ordinal,
                theme.stage.apply_to(&stage.name),
                theme
                    .dim
                    .apply_to(format!("({}, timeout {}s{})", gate, timeout, cached)),
                width = width
            );
            if let Some(desc) = &stage.description {
                line.push_str(&format!(" {}", theme.dim.apply_to(desc)));
            }
            line
        })
        .collect()
}
