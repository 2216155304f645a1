//! Terminal UI.

use console::Term;
use std::io::Write;

use crate::pipeline::ExecutionResult;

use super::{should_use_colors, OutputMode, StagegateTheme, UserInterface};

/// Writes status to stdout and errors to stderr.
pub struct TerminalUI {
    term: Term,
    err: Term,
    theme: StagegateTheme,
    mode: OutputMode,
}

impl TerminalUI {
    pub fn new(mode: OutputMode) -> Self {
        let theme = if should_use_colors() {
            StagegateTheme::new()
        } else {
            StagegateTheme::plain()
        };

        Self {
            term: Term::stdout(),
            err: Term::stderr(),
            theme,
            mode,
        }
    }
}

impl UserInterface for TerminalUI {
    fn output_mode(&self) -> OutputMode {
        self.mode
    }

    fn message(&mut self, msg: &str) {
        if self.mode.shows_progress() {
            writeln!(self.term, "{}", msg).ok();
        }
    }

    fn success(&mut self, msg: &str) {
        writeln!(self.term, "{}", self.theme.format_success(msg)).ok();
    }

    fn warning(&mut self, msg: &str) {
        writeln!(self.err, "{}", self.theme.format_warning(msg)).ok();
    }

    fn error(&mut self, msg: &str) {
        writeln!(self.err, "{}", self.theme.format_error(msg)).ok();
    }

    fn show_header(&mut self, title: &str) {
        if self.mode.shows_progress() {
            writeln!(self.term, "{}", self.theme.format_header(title)).ok();
        }
    }

    fn stage_started(&mut self, name: &str, index: usize, total: usize) {
        if self.mode.shows_progress() {
            writeln!(
                self.term,
                "{} {}",
                self.theme.dim.apply_to(format!("[{}/{}]", index + 1, total)),
                self.theme.stage.apply_to(name)
            )
            .ok();
        }
    }

    fn stage_finished(&mut self, result: &ExecutionResult) {
        if self.mode.shows_progress() || result.is_failed() {
            writeln!(self.term, "{}", self.theme.format_stage_result(result)).ok();
        }
    }

    fn show_output_tail(&mut self, stage: &str, lines: &[String]) {
        if lines.is_empty() {
            return;
        }
        writeln!(
            self.err,
            "{}",
            self.theme.dim.apply_to(format!("--- last {} lines of {} ---", lines.len(), stage))
        )
        .ok();
        for line in lines {
            writeln!(self.err, "{}", self.theme.output.apply_to(line)).ok();
        }
    }
}
