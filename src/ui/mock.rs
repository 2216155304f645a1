//! Mock UI implementation for testing.
//!
//! `MockUI` implements the `UserInterface` trait and captures all
//! interactions for later assertion.

use crate::pipeline::{ExecutionResult, StageStatus};

use super::{OutputMode, UserInterface};

/// Captures everything written through [`UserInterface`].
#[derive(Debug, Default)]
pub struct MockUI {
    mode: OutputMode,
    messages: Vec<String>,
    successes: Vec<String>,
    warnings: Vec<String>,
    errors: Vec<String>,
    headers: Vec<String>,
    started: Vec<String>,
    finished: Vec<(String, StageStatus)>,
    tails: Vec<(String, Vec<String>)>,
}

impl MockUI {
    /// Create a new MockUI with Normal output mode.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new MockUI with a specific output mode.
    pub fn with_mode(mode: OutputMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn successes(&self) -> &[String] {
        &self.successes
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Names of stages reported as starting.
    pub fn started_stages(&self) -> &[String] {
        &self.started
    }

    /// `(stage, status)` pairs in report order.
    pub fn finished_stages(&self) -> &[(String, StageStatus)] {
        &self.finished
    }

    /// Output tails shown for failed stages.
    pub fn output_tails(&self) -> &[(String, Vec<String>)] {
        &self.tails
    }

    /// Check if any message (of any kind) contains the given text.
    pub fn has_output(&self, text: &str) -> bool {
        self.messages
            .iter()
            .chain(&self.successes)
            .chain(&self.warnings)
            .chain(&self.errors)
            .chain(&self.headers)
            .any(|m| m.contains(text))
    }
}

impl UserInterface for MockUI {
    fn output_mode(&self) -> OutputMode {
        self.mode
    }

    fn message(&mut self, msg: &str) {
        self.messages.push(msg.to_string());
    }

    fn success(&mut self, msg: &str) {
        self.successes.push(msg.to_string());
    }

    fn warning(&mut self, msg: &str) {
        self.warnings.push(msg.to_string());
    }

    fn error(&mut self, msg: &str) {
        self.errors.push(msg.to_string());
    }

    fn show_header(&mut self, title: &str) {
        self.headers.push(title.to_string());
    }

    fn stage_started(&mut self, name: &str, _index: usize, _total: usize) {
        self.started.push(name.to_string());
    }

    fn stage_finished(&mut self, result: &ExecutionResult) {
        self.finished
            .push((result.stage_name.clone(), result.status));
    }

    fn show_output_tail(&mut self, stage: &str, lines: &[String]) {
        self.tails.push((stage.to_string(), lines.to_vec()));
    }
}
