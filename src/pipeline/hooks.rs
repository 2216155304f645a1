//! Post-action dispatch: success, failure and always hooks.
//!
//! After the stage graph terminates, the hooks matching the terminal state
//! run first, then the always hooks. Hook failures are recorded and logged
//! but never change the pipeline's terminal state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::time::Duration;

use super::context::BuildContext;
use super::result::{PipelineOutcome, StageStatus, Terminal};
use super::runner::StepRunner;
use super::summary::BuildSummary;

/// Environment variable telling command hooks how the build ended.
pub const STATUS_ENV: &str = "STAGEGATE_STATUS";

/// Environment variable naming the failed stage, set for failure hooks.
pub const FAILED_STAGE_ENV: &str = "STAGEGATE_FAILED_STAGE";

/// When a hook runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HookPhase {
    Success,
    Failure,
    Always,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPhase::Success => write!(f, "success"),
            HookPhase::Failure => write!(f, "failure"),
            HookPhase::Always => write!(f, "always"),
        }
    }
}

/// Inputs available to a hook.
pub struct HookInvocation<'a> {
    pub outcome: &'a PipelineOutcome,
    pub context: &'a BuildContext,
    pub runner: &'a StepRunner,
}

/// A post-action hook.
pub trait Hook: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, invocation: &HookInvocation<'_>) -> anyhow::Result<()>;
}

/// Runs a shell command with `STAGEGATE_STATUS` exported.
#[derive(Debug, Clone)]
pub struct CommandHook {
    name: String,
    command: String,
    timeout: Option<Duration>,
}

impl CommandHook {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Hook for CommandHook {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, inv: &HookInvocation<'_>) -> anyhow::Result<()> {
        let mut env = inv.context.environment().clone();
        let status = match inv.outcome.terminal {
            Terminal::Success => "success",
            Terminal::Failed => "failed",
        };
        env.insert(STATUS_ENV.to_string(), status.to_string());
        if let Some(failed) = inv.outcome.failed_stage() {
            env.insert(FAILED_STAGE_ENV.to_string(), failed.stage_name.clone());
        }

        let result = inv.runner.execute(
            &format!("hook-{}", self.name),
            &self.command,
            &env,
            inv.context.workspace_root(),
            self.timeout,
        );

        if result.status == StageStatus::Succeeded {
            Ok(())
        } else {
            for line in &result.output_tail {
                tracing::warn!(hook = %self.name, "  {}", line);
            }
            match (result.failure, result.exit_code) {
                (_, Some(code)) => anyhow::bail!("exited with code {}", code),
                (Some(reason), None) => anyhow::bail!("{}", reason),
                (None, None) => anyhow::bail!("did not complete"),
            }
        }
    }
}

/// Writes the build summary JSON.
#[derive(Debug, Clone)]
pub struct SummaryHook {
    pipeline: String,
    path: PathBuf,
    started_at: DateTime<Utc>,
}

impl SummaryHook {
    /// `path` is resolved against the build's state root unless absolute.
    pub fn new(pipeline: impl Into<String>, path: impl Into<PathBuf>, started_at: DateTime<Utc>) -> Self {
        Self {
            pipeline: pipeline.into(),
            path: path.into(),
            started_at,
        }
    }
}

impl Hook for SummaryHook {
    fn name(&self) -> &str {
        "build-summary"
    }

    fn run(&self, inv: &HookInvocation<'_>) -> anyhow::Result<()> {
        let summary = BuildSummary::new(
            &self.pipeline,
            self.started_at,
            inv.context.parameters(),
            inv.outcome,
            inv.runner.masker(),
        );
        let path = inv.context.resolve_state(&self.path);
        summary.write(&path)?;
        tracing::info!(path = %path.display(), "wrote build summary");
        Ok(())
    }
}

/// Outcome of one hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookRecord {
    pub name: String,
    pub phase: HookPhase,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Every hook that ran, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub records: Vec<HookRecord>,
}

impl DispatchReport {
    /// Hooks that failed.
    pub fn failures(&self) -> impl Iterator<Item = &HookRecord> {
        self.records.iter().filter(|r| !r.succeeded)
    }

    /// Names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.name.as_str()).collect()
    }
}

/// Holds hooks by phase and runs them after the graph terminates.
#[derive(Default)]
pub struct PostActionDispatcher {
    success: Vec<Box<dyn Hook>>,
    failure: Vec<Box<dyn Hook>>,
    always: Vec<Box<dyn Hook>>,
}

impl PostActionDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, phase: HookPhase, hook: impl Hook + 'static) {
        let hook: Box<dyn Hook> = Box::new(hook);
        match phase {
            HookPhase::Success => self.success.push(hook),
            HookPhase::Failure => self.failure.push(hook),
            HookPhase::Always => self.always.push(hook),
        }
    }

    pub fn len(&self) -> usize {
        self.success.len() + self.failure.len() + self.always.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run the terminal-specific hooks, then the always hooks.
    pub fn dispatch(
        &self,
        outcome: &PipelineOutcome,
        context: &BuildContext,
        runner: &StepRunner,
    ) -> DispatchReport {
        let invocation = HookInvocation {
            outcome,
            context,
            runner,
        };
        let (phase, first) = match outcome.terminal {
            Terminal::Success => (HookPhase::Success, &self.success),
            Terminal::Failed => (HookPhase::Failure, &self.failure),
        };

        let mut report = DispatchReport::default();
        for (phase, hooks) in [(phase, first), (HookPhase::Always, &self.always)] {
            for hook in hooks {
                report.records.push(run_hook(hook.as_ref(), phase, &invocation));
            }
        }
        report
    }
}

/// Run one hook. A panic is recorded as a failure so later hooks still run.
fn run_hook(hook: &dyn Hook, phase: HookPhase, invocation: &HookInvocation<'_>) -> HookRecord {
    tracing::info!(hook = %hook.name(), phase = %phase, "running hook");
    let result = panic::catch_unwind(AssertUnwindSafe(|| hook.run(invocation)))
        .unwrap_or_else(|payload| Err(anyhow::anyhow!("panicked: {}", panic_message(&*payload))));
    match result {
        Ok(()) => HookRecord {
            name: hook.name().to_string(),
            phase,
            succeeded: true,
            error: None,
        },
        Err(e) => {
            let message = invocation.runner.masker().mask(&format!("{:#}", e));
            tracing::warn!(hook = %hook.name(), phase = %phase, error = %message, "hook failed");
            HookRecord {
                name: hook.name().to_string(),
                phase,
                succeeded: false,
                error: Some(message),
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{ExecutionResult, FailureReason};
    use crate::secrets::OutputMasker;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    struct Recording {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl Hook for Recording {
        fn name(&self) -> &str {
            self.name
        }

        fn run(&self, _inv: &HookInvocation<'_>) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(self.name.to_string());
            if self.fail {
                anyhow::bail!("smtp unreachable");
            }
            Ok(())
        }
    }

    fn dispatcher(log: &Arc<Mutex<Vec<String>>>) -> PostActionDispatcher {
        let mut d = PostActionDispatcher::new();
        for (phase, name) in [
            (HookPhase::Always, "cleanup"),
            (HookPhase::Success, "archive"),
            (HookPhase::Failure, "mail-failure"),
        ] {
            d.add(
                phase,
                Recording {
                    name,
                    log: log.clone(),
                    fail: false,
                },
            );
        }
        d
    }

    fn failed_outcome() -> PipelineOutcome {
        PipelineOutcome::from_results(vec![ExecutionResult::failed(
            "generate",
            FailureReason::NonZeroExit,
            Some(1),
            Duration::ZERO,
            vec![],
        )])
    }

    #[test]
    fn success_runs_success_then_always() {
        let temp = TempDir::new().unwrap();
        let ctx = BuildContext::new(BTreeMap::new(), BTreeMap::new(), temp.path());
        let log = Arc::new(Mutex::new(Vec::new()));
        let outcome = PipelineOutcome::from_results(vec![]);

        let report = dispatcher(&log).dispatch(&outcome, &ctx, &StepRunner::new(OutputMasker::new()));

        assert_eq!(*log.lock().unwrap(), vec!["archive", "cleanup"]);
        assert_eq!(report.names(), vec!["archive", "cleanup"]);
    }

    #[test]
    fn failure_runs_failure_hook_once_then_always() {
        let temp = TempDir::new().unwrap();
        let ctx = BuildContext::new(BTreeMap::new(), BTreeMap::new(), temp.path());
        let log = Arc::new(Mutex::new(Vec::new()));

        dispatcher(&log).dispatch(&failed_outcome(), &ctx, &StepRunner::new(OutputMasker::new()));

        assert_eq!(*log.lock().unwrap(), vec!["mail-failure", "cleanup"]);
    }

    #[test]
    fn hook_failure_is_recorded_and_does_not_stop_always() {
        let temp = TempDir::new().unwrap();
        let ctx = BuildContext::new(BTreeMap::new(), BTreeMap::new(), temp.path());
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut d = PostActionDispatcher::new();
        d.add(
            HookPhase::Failure,
            Recording {
                name: "mail-failure",
                log: log.clone(),
                fail: true,
            },
        );
        d.add(
            HookPhase::Always,
            Recording {
                name: "cleanup",
                log: log.clone(),
                fail: false,
            },
        );

        let outcome = failed_outcome();
        let report = d.dispatch(&outcome, &ctx, &StepRunner::new(OutputMasker::new()));

        assert_eq!(report.failures().count(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["mail-failure", "cleanup"]);
        assert_eq!(outcome.terminal, Terminal::Failed);
    }

    #[cfg(unix)]
    #[test]
    fn command_hook_sees_status_and_failed_stage() {
        let temp = TempDir::new().unwrap();
        let ctx = BuildContext::new(BTreeMap::new(), BTreeMap::new(), temp.path());
        let hook = CommandHook::new(
            "record",
            "echo \"$STAGEGATE_STATUS $STAGEGATE_FAILED_STAGE\" > hook.txt",
        );
        let mut d = PostActionDispatcher::new();
        d.add(HookPhase::Always, hook);

        let report = d.dispatch(&failed_outcome(), &ctx, &StepRunner::new(OutputMasker::new()));

        assert_eq!(report.failures().count(), 0);
        let written = std::fs::read_to_string(temp.path().join("hook.txt")).unwrap();
        assert_eq!(written.trim(), "failed generate");
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_hook_reports_exit_code() {
        let temp = TempDir::new().unwrap();
        let ctx = BuildContext::new(BTreeMap::new(), BTreeMap::new(), temp.path());
        let mut d = PostActionDispatcher::new();
        d.add(HookPhase::Always, CommandHook::new("broken", "exit 5"));

        let report = d.dispatch(
            &PipelineOutcome::from_results(vec![]),
            &ctx,
            &StepRunner::new(OutputMasker::new()),
        );

        let record = &report.records[0];
        assert!(!record.succeeded);
        assert_eq!(record.error.as_deref(), Some("exited with code 5"));
    }

    #[test]
    fn summary_hook_writes_into_workspace() {
        let temp = TempDir::new().unwrap();
        let ctx = BuildContext::new(BTreeMap::new(), BTreeMap::new(), temp.path());
        let mut d = PostActionDispatcher::new();
        d.add(
            HookPhase::Always,
            SummaryHook::new("rtm", "build-summary.json", Utc::now()),
        );

        let report = d.dispatch(&failed_outcome(), &ctx, &StepRunner::new(OutputMasker::new()));

        assert_eq!(report.failures().count(), 0);
        assert!(temp.path().join("build-summary.json").exists());
    }

    #[test]
    fn summary_hook_writes_under_state_root() {
        let workspace = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let ctx = BuildContext::new(BTreeMap::new(), BTreeMap::new(), workspace.path())
            .with_state_root(project.path());
        let mut d = PostActionDispatcher::new();
        d.add(
            HookPhase::Always,
            SummaryHook::new("rtm", "build-summary.json", Utc::now()),
        );

        d.dispatch(&failed_outcome(), &ctx, &StepRunner::new(OutputMasker::new()));

        assert!(project.path().join("build-summary.json").exists());
        assert!(!workspace.path().join("build-summary.json").exists());
    }

    struct Panicking;

    impl Hook for Panicking {
        fn name(&self) -> &str {
            "panicky"
        }

        fn run(&self, _inv: &HookInvocation<'_>) -> anyhow::Result<()> {
            panic!("mail template missing");
        }
    }

    #[test]
    fn panicking_hook_is_recorded_and_always_hooks_still_run() {
        let temp = TempDir::new().unwrap();
        let ctx = BuildContext::new(BTreeMap::new(), BTreeMap::new(), temp.path());
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut d = PostActionDispatcher::new();
        d.add(HookPhase::Failure, Panicking);
        d.add(
            HookPhase::Always,
            Recording {
                name: "cleanup",
                log: log.clone(),
                fail: false,
            },
        );

        let report = d.dispatch(&failed_outcome(), &ctx, &StepRunner::new(OutputMasker::new()));

        assert_eq!(report.names(), vec!["panicky", "cleanup"]);
        let record = &report.records[0];
        assert!(!record.succeeded);
        assert_eq!(record.error.as_deref(), Some("panicked: mail template missing"));
        assert_eq!(*log.lock().unwrap(), vec!["cleanup"]);
    }
}
