//! Stages: a gate predicate plus an action.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::CacheGate;
use crate::config::{expand_parameters, is_workspace_relative, CacheConfig, StageConfig};

use super::build::ResolvedParameters;
use super::context::BuildContext;
use super::result::{ExecutionResult, StageStatus};
use super::runner::StepRunner;

/// Decides whether a stage's action runs.
///
/// An `Err` is a gate evaluation error: the graph treats it as `false` and
/// logs a warning.
pub trait Gate: Send + Sync {
    /// Evaluate against the build context.
    fn evaluate(&self, context: &BuildContext) -> anyhow::Result<bool>;

    /// Note recorded on the skipped result when the gate is false.
    fn skip_reason(&self) -> String {
        "gate not satisfied".to_string()
    }
}

impl<F> Gate for F
where
    F: Fn(&BuildContext) -> anyhow::Result<bool> + Send + Sync,
{
    fn evaluate(&self, context: &BuildContext) -> anyhow::Result<bool> {
        self(context)
    }
}

/// A gate that always opens.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysGate;

impl Gate for AlwaysGate {
    fn evaluate(&self, _context: &BuildContext) -> anyhow::Result<bool> {
        Ok(true)
    }
}

/// Opens when a workspace-relative file exists.
///
/// Contents are never read; an upstream stage signals success by leaving
/// its artifact behind.
#[derive(Debug, Clone)]
pub struct FileGate {
    path: PathBuf,
}

impl FileGate {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The watched path, relative to the workspace.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Gate for FileGate {
    fn evaluate(&self, context: &BuildContext) -> anyhow::Result<bool> {
        if !is_workspace_relative(&self.path) {
            anyhow::bail!("gate path {} escapes the workspace", self.path.display());
        }
        match std::fs::metadata(context.resolve(&self.path)) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("cannot inspect gate file {}", self.path.display()))),
        }
    }

    fn skip_reason(&self) -> String {
        format!("gate file {} absent", self.path.display())
    }
}

/// Everything an action needs to run.
pub struct StageInvocation<'a> {
    pub name: &'a str,
    pub context: &'a BuildContext,
    pub runner: &'a StepRunner,
    pub timeout: Option<Duration>,
}

/// The work a stage performs once its gate is open.
pub trait Action: Send + Sync {
    fn run(&self, invocation: &StageInvocation<'_>) -> ExecutionResult;
}

/// An in-process action backed by a closure.
pub struct FnAction<F>(F);

impl<F> FnAction<F>
where
    F: Fn(&StageInvocation<'_>) -> ExecutionResult + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Action for FnAction<F>
where
    F: Fn(&StageInvocation<'_>) -> ExecutionResult + Send + Sync,
{
    fn run(&self, invocation: &StageInvocation<'_>) -> ExecutionResult {
        (self.0)(invocation)
    }
}

/// Runs a shell command through the [`StepRunner`].
#[derive(Debug, Clone)]
pub struct CommandAction {
    command: String,
    env: BTreeMap<String, String>,
}

impl CommandAction {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            env: BTreeMap::new(),
        }
    }

    /// Stage-only variables layered over the build environment.
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

impl Action for CommandAction {
    fn run(&self, inv: &StageInvocation<'_>) -> ExecutionResult {
        let mut env = inv.context.environment().clone();
        env.extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        inv.runner.execute(
            inv.name,
            &self.command,
            &env,
            inv.context.workspace_root(),
            inv.timeout,
        )
    }
}

/// Runs an install command only when its manifest changed.
#[derive(Debug, Clone)]
pub struct CachedInstallAction {
    cache: CacheConfig,
    install: CommandAction,
}

impl CachedInstallAction {
    pub fn new(cache: CacheConfig, install: CommandAction) -> Self {
        Self { cache, install }
    }
}

impl Action for CachedInstallAction {
    fn run(&self, inv: &StageInvocation<'_>) -> ExecutionResult {
        let gate = CacheGate::from_roots(
            inv.context.workspace_root(),
            inv.context.state_root(),
            &self.cache,
        )
        .with_cancel(inv.runner.cancel_token().clone());
        let run = gate.run(
            || self.install.run(inv),
            |result| result.status == StageStatus::Succeeded,
        );

        match run.install {
            Some(result) => result.with_note(format!("cache {}", run.decision.label())),
            None => ExecutionResult::skipped(
                inv.name,
                format!("cache hit ({})", run.decision.label()),
            ),
        }
    }
}

/// One registered stage. Immutable once built.
pub struct Stage {
    name: String,
    ordinal: u32,
    description: Option<String>,
    gate: Box<dyn Gate>,
    action: Box<dyn Action>,
    timeout: Option<Duration>,
}

impl Stage {
    /// Create a stage with an always-open gate and no timeout.
    pub fn new(name: impl Into<String>, ordinal: u32, action: impl Action + 'static) -> Self {
        Self {
            name: name.into(),
            ordinal,
            description: None,
            gate: Box::new(AlwaysGate),
            action: Box::new(action),
            timeout: None,
        }
    }

    pub fn with_gate(mut self, gate: impl Gate + 'static) -> Self {
        self.gate = Box::new(gate);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Build a stage from configuration.
    ///
    /// `${name}` references to trigger parameters take the value in stage env
    /// entries. In the command they become references to the parameter's
    /// exported variable. Anything else is left for the shell.
    pub fn from_config(
        config: &StageConfig,
        ordinal: u32,
        default_timeout: u64,
        parameters: &ResolvedParameters,
    ) -> Self {
        let env = config
            .env
            .iter()
            .map(|(k, v)| (k.clone(), expand_parameters(v, &parameters.values)))
            .collect();
        let command = CommandAction::new(expand_parameters(
            &config.command,
            &parameters.command_references(),
        ))
        .with_env(env);

        let mut stage = match &config.cache {
            Some(cache) => Stage::new(
                &config.name,
                ordinal,
                CachedInstallAction::new(cache.clone(), command),
            ),
            None => Stage::new(&config.name, ordinal, command),
        };

        if let Some(gate) = &config.gate {
            stage = stage.with_gate(FileGate::new(gate));
        }
        if let Some(description) = &config.description {
            stage = stage.with_description(description);
        }
        stage.with_timeout(Duration::from_secs(config.timeout.unwrap_or(default_timeout)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn gate(&self) -> &dyn Gate {
        self.gate.as_ref()
    }

    pub(crate) fn action(&self) -> &dyn Action {
        self.action.as_ref()
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("ordinal", &self.ordinal)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
