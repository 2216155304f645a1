//! Runs one external step and turns its outcome into an [`ExecutionResult`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::secrets::OutputMasker;
use crate::shell::{self, CancelToken, CommandOptions, Termination, DEFAULT_TAIL_LINES};

use super::result::{ExecutionResult, FailureReason};

/// Executes step commands with masking, timeouts and cancellation.
#[derive(Debug, Clone)]
pub struct StepRunner {
    masker: OutputMasker,
    tail_lines: usize,
    log_dir: Option<PathBuf>,
    cancel: CancelToken,
}

impl StepRunner {
    /// Create a runner that redacts with `masker`.
    pub fn new(masker: OutputMasker) -> Self {
        Self {
            masker,
            tail_lines: DEFAULT_TAIL_LINES,
            log_dir: None,
            cancel: CancelToken::new(),
        }
    }

    /// Keep this many trailing output lines per step.
    pub fn with_tail_lines(mut self, lines: usize) -> Self {
        self.tail_lines = lines;
        self
    }

    /// Write each step's masked output to `<dir>/<name>.log`.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Stop running steps when `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The cancellation token steps observe.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// The masker applied to output.
    pub fn masker(&self) -> &OutputMasker {
        &self.masker
    }

    /// Run `command` in `working_dir` with `env` layered over the inherited
    /// environment.
    ///
    /// Never returns an error: launch failures, nonzero exits, timeouts and
    /// cancellation all become a `Failed` result.
    pub fn execute(
        &self,
        name: &str,
        command: &str,
        env: &BTreeMap<String, String>,
        working_dir: &Path,
        timeout: Option<Duration>,
    ) -> ExecutionResult {
        let start = Instant::now();
        tracing::info!(stage = %name, command = %self.masker.mask(command), "running step");

        let options = CommandOptions {
            cwd: Some(working_dir.to_path_buf()),
            env: env.clone(),
            timeout,
            tail_lines: self.tail_lines,
            masker: self.masker.clone(),
            log_file: self
                .log_dir
                .as_ref()
                .map(|dir| dir.join(log_file_name(name))),
            cancel: self.cancel.clone(),
        };

        let output = match shell::execute(command, &options) {
            Ok(output) => output,
            Err(e) => {
                tracing::error!(stage = %name, error = %e, "step could not be launched");
                return ExecutionResult::failed(
                    name,
                    FailureReason::LaunchError,
                    None,
                    start.elapsed(),
                    vec![self.masker.mask(&e.to_string())],
                );
            }
        };

        let result = match output.termination {
            Termination::Exited(Some(0)) => {
                ExecutionResult::succeeded(name, output.duration, output.tail)
            }
            Termination::Exited(code) => ExecutionResult::failed(
                name,
                FailureReason::NonZeroExit,
                code,
                output.duration,
                output.tail,
            ),
            Termination::TimedOut => ExecutionResult::failed(
                name,
                FailureReason::Timeout,
                None,
                output.duration,
                output.tail,
            )
            .with_note(format!(
                "killed after {}s",
                timeout.map(|t| t.as_secs()).unwrap_or_default()
            )),
            Termination::Cancelled => ExecutionResult::failed(
                name,
                FailureReason::Cancelled,
                None,
                output.duration,
                output.tail,
            ),
        };

        tracing::info!(
            stage = %name,
            status = %result.status,
            exit_code = ?result.exit_code,
            duration_ms = result.duration_ms,
            "step finished"
        );
        result
    }
}

/// `<name>.log`, with anything outside `[A-Za-z0-9_-]` replaced.
fn log_file_name(name: &str) -> String {
    let stem: String = name
        .chars()
        .take(64)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}.log", stem)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::pipeline::StageStatus;
    use tempfile::TempDir;

    fn run(runner: &StepRunner, dir: &Path, command: &str) -> ExecutionResult {
        runner.execute("step", command, &BTreeMap::new(), dir, None)
    }

    #[test]
    fn exit_zero_is_succeeded() {
        let temp = TempDir::new().unwrap();
        let result = run(&StepRunner::new(OutputMasker::new()), temp.path(), "echo ok");

        assert_eq!(result.status, StageStatus::Succeeded);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.output_tail, vec!["ok".to_string()]);
    }

    #[test]
    fn nonzero_exit_is_failed() {
        let temp = TempDir::new().unwrap();
        let result = run(&StepRunner::new(OutputMasker::new()), temp.path(), "exit 4");

        assert_eq!(result.status, StageStatus::Failed);
        assert_eq!(result.failure, Some(FailureReason::NonZeroExit));
        assert_eq!(result.exit_code, Some(4));
    }

    #[test]
    fn timeout_is_failed_timeout() {
        let temp = TempDir::new().unwrap();
        let runner = StepRunner::new(OutputMasker::new());
        let result = runner.execute(
            "slow",
            "sleep 30",
            &BTreeMap::new(),
            temp.path(),
            Some(Duration::from_millis(200)),
        );

        assert_eq!(result.failure, Some(FailureReason::Timeout));
        assert_eq!(result.exit_code, None);
    }

    #[test]
    fn missing_working_dir_is_launch_error() {
        let runner = StepRunner::new(OutputMasker::new());
        let result = run(&runner, Path::new("/no/such/workspace"), "true");

        assert_eq!(result.failure, Some(FailureReason::LaunchError));
    }

    #[test]
    fn cancelled_runner_fails_with_cancelled() {
        let temp = TempDir::new().unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let runner = StepRunner::new(OutputMasker::new()).with_cancel(cancel);

        let result = run(&runner, temp.path(), "sleep 30");
        assert_eq!(result.failure, Some(FailureReason::Cancelled));
    }

    #[test]
    fn log_file_names_are_sanitized() {
        assert_eq!(log_file_name("fetch"), "fetch.log");
        assert_eq!(log_file_name("hook-mail ops@acme"), "hook-mail_ops_acme.log");
    }

    #[test]
    fn writes_masked_log_file() {
        let temp = TempDir::new().unwrap();
        let mut masker = OutputMasker::new();
        masker.add_secret("hunter2");
        let runner = StepRunner::new(masker).with_log_dir(temp.path().join("logs"));
        let mut env = BTreeMap::new();
        env.insert("SMTP_PASSWORD".to_string(), "hunter2".to_string());

        let result = runner.execute(
            "notify",
            "echo $SMTP_PASSWORD",
            &env,
            temp.path(),
            None,
        );

        assert!(!result.output_tail.join("\n").contains("hunter2"));
        let log = std::fs::read_to_string(temp.path().join("logs/notify.log")).unwrap();
        assert!(!log.contains("hunter2"));
    }
}
