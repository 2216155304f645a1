//! Stage and pipeline outcomes.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Final status of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    /// The gate was false, or a cache hit made the action unnecessary.
    Skipped,
    /// The action ran and exited 0.
    Succeeded,
    /// The action ran and did not succeed.
    Failed,
}

impl StageStatus {
    /// Get a display character for this status.
    pub fn display_char(&self) -> char {
        match self {
            StageStatus::Skipped => '⊘',
            StageStatus::Succeeded => '✓',
            StageStatus::Failed => '✗',
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageStatus::Skipped => "skipped",
            StageStatus::Succeeded => "succeeded",
            StageStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Why a stage failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The process could not be started.
    LaunchError,
    /// The process exited with a nonzero status or was killed by a signal.
    NonZeroExit,
    /// The stage exceeded its timeout and was killed.
    Timeout,
    /// The build was cancelled while the stage ran.
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::LaunchError => "launch error",
            FailureReason::NonZeroExit => "nonzero exit",
            FailureReason::Timeout => "timeout",
            FailureReason::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Result of one stage (or hook) execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    /// Stage name.
    pub stage_name: String,

    /// Final status.
    pub status: StageStatus,

    /// Exit code, when a process ran and exited normally.
    pub exit_code: Option<i32>,

    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,

    /// Last lines of masked output.
    pub output_tail: Vec<String>,

    /// Failure cause, for `Failed` results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,

    /// Why the stage was skipped, or other detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ExecutionResult {
    /// Create a skipped result.
    pub fn skipped(stage_name: &str, note: impl Into<String>) -> Self {
        Self {
            stage_name: stage_name.to_string(),
            status: StageStatus::Skipped,
            exit_code: None,
            duration_ms: 0,
            output_tail: Vec::new(),
            failure: None,
            note: Some(note.into()),
        }
    }

    /// Create a success result.
    pub fn succeeded(stage_name: &str, duration: Duration, output_tail: Vec<String>) -> Self {
        Self {
            stage_name: stage_name.to_string(),
            status: StageStatus::Succeeded,
            exit_code: Some(0),
            duration_ms: duration_ms(duration),
            output_tail,
            failure: None,
            note: None,
        }
    }

    /// Create a failure result.
    pub fn failed(
        stage_name: &str,
        reason: FailureReason,
        exit_code: Option<i32>,
        duration: Duration,
        output_tail: Vec<String>,
    ) -> Self {
        Self {
            stage_name: stage_name.to_string(),
            status: StageStatus::Failed,
            exit_code,
            duration_ms: duration_ms(duration),
            output_tail,
            failure: Some(reason),
            note: None,
        }
    }

    /// Attach a note.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Whether the stage failed.
    pub fn is_failed(&self) -> bool {
        self.status == StageStatus::Failed
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Terminal state of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Terminal {
    Success,
    Failed,
}

impl Terminal {
    /// Process exit code for this terminal state.
    pub fn exit_code(&self) -> i32 {
        match self {
            Terminal::Success => 0,
            Terminal::Failed => 1,
        }
    }
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminal::Success => write!(f, "success"),
            Terminal::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of running the stage graph.
///
/// `results` is in ordinal order. A `Failed` entry, if present, is the last
/// one: nothing after a failure runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineOutcome {
    pub terminal: Terminal,
    pub results: Vec<ExecutionResult>,
}

impl PipelineOutcome {
    /// Derive the terminal state from the recorded results.
    pub fn from_results(results: Vec<ExecutionResult>) -> Self {
        let terminal = if results.iter().any(ExecutionResult::is_failed) {
            Terminal::Failed
        } else {
            Terminal::Success
        };
        Self { terminal, results }
    }

    /// The failed stage, if any.
    pub fn failed_stage(&self) -> Option<&ExecutionResult> {
        self.results.iter().find(|r| r.is_failed())
    }

    /// Whether the pipeline succeeded.
    pub fn is_success(&self) -> bool {
        self.terminal == Terminal::Success
    }
}
