//! Terminal output.
//!
//! This module provides:
//! - [`UserInterface`] trait for UI abstraction
//! - [`TerminalUI`] for real terminals and CI logs
//! - [`MockUI`] capturing output for tests
//!
//! # Example
//!
//! ```
//! use stagegate::ui::{MockUI, UserInterface};
//!
//! let mut ui = MockUI::new();
//! ui.show_header("rtm-report");
//! ui.success("Pipeline succeeded");
//! assert_eq!(ui.successes(), ["Pipeline succeeded"]);
//! ```

pub mod mock;
pub mod output;
pub mod terminal;
pub mod theme;

pub use mock::MockUI;
pub use output::OutputMode;
pub use terminal::TerminalUI;
pub use theme::{should_use_colors, StagegateTheme};

use crate::pipeline::ExecutionResult;

/// Trait for user-facing output.
///
/// This trait allows mocking the UI in tests.
pub trait UserInterface {
    /// Get the current output mode.
    fn output_mode(&self) -> OutputMode;

    /// Display a message to the user.
    fn message(&mut self, msg: &str);

    /// Display a success message.
    fn success(&mut self, msg: &str);

    /// Display a warning message.
    fn warning(&mut self, msg: &str);

    /// Display an error message. Shown in every mode.
    fn error(&mut self, msg: &str);

    /// Show a header/banner.
    fn show_header(&mut self, title: &str);

    /// A stage's action is starting.
    fn stage_started(&mut self, name: &str, index: usize, total: usize);

    /// A stage reached its final status.
    fn stage_finished(&mut self, result: &ExecutionResult);

    /// Show the captured output tail of a failed stage.
    fn show_output_tail(&mut self, stage: &str, lines: &[String]);
}
