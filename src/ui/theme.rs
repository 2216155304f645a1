//! Visual theme and styling.

use console::Style;

use crate::pipeline::{ExecutionResult, StageStatus};

/// Colors and symbols for terminal output.
#[derive(Debug, Clone)]
pub struct StagegateTheme {
    /// Success messages (green).
    pub success: Style,
    /// Warning messages (orange).
    pub warning: Style,
    /// Error messages (red bold).
    pub error: Style,
    /// Dim/secondary text.
    pub dim: Style,
    /// Headers (bold magenta).
    pub header: Style,
    /// Stage names (bold).
    pub stage: Style,
    /// Captured command output (dim italic).
    pub output: Style,
}

impl Default for StagegateTheme {
    fn default() -> Self {
        Self::new()
    }
}

impl StagegateTheme {
    pub fn new() -> Self {
        Self {
            success: Style::new().green(),
            warning: Style::new().color256(208),
            error: Style::new().red().bold(),
            dim: Style::new().dim(),
            header: Style::new().bold().magenta(),
            stage: Style::new().bold(),
            output: Style::new().dim().italic(),
        }
    }

    /// A theme without colors (for non-TTY or `NO_COLOR`).
    pub fn plain() -> Self {
        Self {
            success: Style::new(),
            warning: Style::new(),
            error: Style::new(),
            dim: Style::new(),
            header: Style::new(),
            stage: Style::new(),
            output: Style::new(),
        }
    }

    pub fn format_success(&self, msg: &str) -> String {
        format!("{}", self.success.apply_to(format!("✓ {}", msg)))
    }

    pub fn format_warning(&self, msg: &str) -> String {
        format!("{}", self.warning.apply_to(format!("⚠ {}", msg)))
    }

    pub fn format_error(&self, msg: &str) -> String {
        format!("{}", self.error.apply_to(format!("✗ {}", msg)))
    }

    pub fn format_header(&self, title: &str) -> String {
        format!("{}", self.header.apply_to(title))
    }

    /// One status line for a finished stage.
    pub fn format_stage_result(&self, result: &ExecutionResult) -> String {
        let symbol = result.status.display_char();
        let detail = match (&result.status, &result.failure, &result.note) {
            (StageStatus::Failed, Some(reason), _) => format!("{} ({})", result.status, reason),
            (_, _, Some(note)) => format!("{} ({})", result.status, note),
            _ => result.status.to_string(),
        };
        let line = format!(
            "{} {} {} {}",
            symbol,
            self.stage.apply_to(&result.stage_name),
            detail,
            self.dim.apply_to(format!("{}ms", result.duration_ms))
        );
        let style = match result.status {
            StageStatus::Succeeded => &self.success,
            StageStatus::Skipped => &self.dim,
            StageStatus::Failed => &self.error,
        };
        format!("{}", style.apply_to(line))
    }
}

/// Whether to colorize stdout.
pub fn should_use_colors() -> bool {
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }
    console::Term::stdout().is_term()
}
