//! One triggered build, end to end.
//!
//! [`Pipeline::trigger`] performs the whole sequence:
//!
//! 1. check trigger parameters against their declarations
//! 2. take the single-flight lock for the pipeline identity
//! 3. acquire the workspace (cleaned when the guard drops)
//! 4. resolve credentials; a failure here stops the build before stage 1
//! 5. build the immutable [`BuildContext`] and run the [`StageGraph`]
//! 6. dispatch success/failure hooks, then always hooks

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{expand_parameters, validate, PipelineConfig, SecretBackendKind, StageConfig};
use crate::error::{Result, StagegateError};
use crate::secrets::{EnvBackend, FileBackend, SecretBackend, SecretMatcher, SecretStore};
use crate::shell::{env_reference, quote_argument, CancelToken};

use super::context::BuildContext;
use super::graph::{StageGraph, StageProgress};
use super::hooks::{CommandHook, DispatchReport, HookPhase, PostActionDispatcher, SummaryHook};
use super::result::PipelineOutcome;
use super::runner::StepRunner;
use super::single_flight::{default_lock_dir, PipelineLock};
use super::stage::Stage;
use super::workspace::WorkspaceManager;

/// Variable holding the workspace root, exported to every step.
pub const WORKSPACE_ENV: &str = "STAGEGATE_WORKSPACE";
/// Variable holding the per-build scratch directory.
pub const SCRATCH_ENV: &str = "STAGEGATE_SCRATCH";
/// Variable holding the pipeline identity.
pub const PIPELINE_ENV: &str = "STAGEGATE_PIPELINE";

/// What the trigger supplies.
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    /// `KEY=VALUE` trigger parameters.
    pub parameters: BTreeMap<String, String>,
    /// Run in this directory instead of the project root.
    pub workspace: Option<PathBuf>,
}

/// Everything a finished build produced.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub identity: String,
    pub started_at: DateTime<Utc>,
    pub outcome: PipelineOutcome,
    pub hooks: DispatchReport,
}

impl BuildReport {
    /// Process exit code: 0 on success, 1 on failure.
    pub fn exit_code(&self) -> i32 {
        self.outcome.terminal.exit_code()
    }
}

/// Parameters checked against their declarations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedParameters {
    /// Values by parameter name.
    pub values: BTreeMap<String, String>,
    /// Values by environment variable name.
    pub exports: BTreeMap<String, String>,
    /// Environment variable name by parameter name.
    pub env_names: BTreeMap<String, String>,
}

impl ResolvedParameters {
    /// Replacements for `${name}` references in command text.
    ///
    /// Each parameter becomes a reference to its exported variable, so a
    /// value is expanded by the shell and never parsed as script. Parameters
    /// whose variable name the shell cannot reference are quoted instead.
    pub fn command_references(&self) -> BTreeMap<String, String> {
        self.values
            .iter()
            .map(|(name, value)| {
                let reference = self
                    .env_names
                    .get(name)
                    .and_then(|env| env_reference(env))
                    .unwrap_or_else(|| quote_argument(value));
                (name.clone(), reference)
            })
            .collect()
    }
}

/// Apply declarations to the supplied trigger parameters.
///
/// Declared parameters take the supplied value, then the default; a required
/// parameter with neither is an error. Undeclared parameters are accepted and
/// exported under their upper-cased name.
///
/// # Errors
///
/// [`StagegateError::MissingParameter`] for the first missing required one.
pub fn resolve_parameters(
    config: &PipelineConfig,
    supplied: &BTreeMap<String, String>,
) -> Result<ResolvedParameters> {
    let mut resolved = ResolvedParameters::default();

    for (name, decl) in &config.parameters {
        let value = match supplied.get(name).or(decl.default.as_ref()) {
            Some(value) => value.clone(),
            None if decl.required => {
                return Err(StagegateError::MissingParameter { name: name.clone() })
            }
            None => continue,
        };
        let env = decl.env.clone().unwrap_or_else(|| name.to_uppercase());
        resolved.exports.insert(env.clone(), value.clone());
        resolved.env_names.insert(name.clone(), env);
        resolved.values.insert(name.clone(), value);
    }

    for (name, value) in supplied {
        if config.parameters.contains_key(name) {
            continue;
        }
        tracing::debug!(parameter = %name, "undeclared parameter accepted");
        let env = name.to_uppercase();
        resolved.exports.insert(env.clone(), value.clone());
        resolved.env_names.insert(name.clone(), env);
        resolved.values.insert(name.clone(), value.clone());
    }

    Ok(resolved)
}

/// Ordinals for configured stages: explicit where given, otherwise one past
/// the previous stage.
pub fn effective_ordinals(stages: &[StageConfig]) -> Vec<u32> {
    let mut previous = 0u32;
    stages
        .iter()
        .map(|stage| {
            let ordinal = stage.ordinal.unwrap_or(previous.saturating_add(1));
            previous = ordinal;
            ordinal
        })
        .collect()
}

/// Register every configured stage.
///
/// # Errors
///
/// Duplicate stage names or ordinals.
pub fn build_graph(config: &PipelineConfig, parameters: &ResolvedParameters) -> Result<StageGraph> {
    let mut graph = StageGraph::new();
    let ordinals = effective_ordinals(&config.stages);
    for (stage, ordinal) in config.stages.iter().zip(ordinals) {
        graph.register(Stage::from_config(
            stage,
            ordinal,
            config.settings.default_timeout,
            parameters,
        ))?;
    }
    Ok(graph)
}

/// A configured pipeline ready to be triggered.
pub struct Pipeline {
    config: PipelineConfig,
    project_root: PathBuf,
    backend: Option<Arc<dyn SecretBackend>>,
    cancel: CancelToken,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, project_root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            project_root: project_root.into(),
            backend: None,
            cancel: CancelToken::new(),
        }
    }

    /// Use this backend instead of the configured one, for every build.
    pub fn with_secret_backend(mut self, backend: Box<dyn SecretBackend>) -> Self {
        self.backend = Some(Arc::from(backend));
        self
    }

    /// Observe this cancellation token.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The pipeline identity: its configured name, else the project
    /// directory name.
    pub fn identity(&self) -> String {
        self.config.name.clone().unwrap_or_else(|| {
            self.project_root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "pipeline".to_string())
        })
    }

    /// Run a build.
    pub fn trigger(&mut self, request: &BuildRequest) -> Result<BuildReport> {
        self.trigger_with_progress(request, |_| {})
    }

    /// Run a build, reporting stage progress.
    ///
    /// # Errors
    ///
    /// Only conditions that keep stage 1 from starting: invalid config,
    /// missing parameters, lock rejection or timeout, workspace or credential
    /// failures. A failed stage is reported in the returned outcome.
    pub fn trigger_with_progress(
        &mut self,
        request: &BuildRequest,
        on_progress: impl FnMut(StageProgress<'_>),
    ) -> Result<BuildReport> {
        validate(&self.config)?;
        let identity = self.identity();
        let started_at = Utc::now();
        let settings = &self.config.settings;

        let parameters = resolve_parameters(&self.config, &request.parameters)?;
        let graph = build_graph(&self.config, &parameters)?;

        let lock_dir = settings
            .concurrency
            .lock_dir
            .as_ref()
            .map(|dir| self.project_root.join(dir))
            .unwrap_or_else(default_lock_dir);
        let _lock = PipelineLock::acquire(
            &lock_dir,
            &identity,
            settings.concurrency.policy,
            settings.concurrency.wait_timeout.map(Duration::from_secs),
            &self.cancel,
        )?;

        let base = request
            .workspace
            .clone()
            .unwrap_or_else(|| self.project_root.clone());
        let workspace = WorkspaceManager::new(settings.workspace.mode, &base)
            .with_transient(settings.workspace.transient.iter().cloned())
            .acquire()?;

        let backend: Box<dyn SecretBackend> = match &self.backend {
            Some(backend) => Box::new(Arc::clone(backend)),
            None => configured_backend(&self.config, &self.project_root)?,
        };
        let mut store = SecretStore::new(backend);
        let ids: BTreeSet<String> = self.config.credentials.iter().map(|c| c.id.clone()).collect();
        let credentials = store.resolve(&ids)?;

        let mut environment: BTreeMap<String, String> = settings
            .env
            .iter()
            .map(|(k, v)| (k.clone(), expand_parameters(v, &parameters.values)))
            .collect();
        environment.extend(parameters.exports.clone());
        environment.insert(PIPELINE_ENV.to_string(), identity.clone());
        environment.insert(WORKSPACE_ENV.to_string(), path_string(workspace.root()));
        environment.insert(SCRATCH_ENV.to_string(), path_string(workspace.scratch_dir()));
        environment.extend(
            credentials.bind(
                self.config
                    .credentials
                    .iter()
                    .map(|c| (c.id.as_str(), c.env.as_str())),
            ),
        );

        let mut masker = credentials.masker();
        let matcher = SecretMatcher::with_builtins();
        masker.add_secrets(
            parameters
                .values
                .iter()
                .filter(|(name, _)| matcher.is_secret(name))
                .map(|(_, value)| value.clone()),
        );

        // Cache records, logs and the summary outlive an ephemeral workspace.
        let context = BuildContext::new(parameters.values.clone(), environment, workspace.root())
            .with_state_root(&base);

        let mut runner = StepRunner::new(masker)
            .with_tail_lines(settings.output_tail_lines)
            .with_cancel(self.cancel.clone());
        if let Some(log_dir) = &settings.log_dir {
            runner = runner.with_log_dir(context.resolve_state(log_dir));
        }

        tracing::info!(pipeline = %identity, stages = graph.len(), credentials = credentials.len(), "build started");
        let outcome = graph.run_with_progress(&context, &runner, on_progress);

        let dispatcher = self.dispatcher(&identity, started_at, &parameters.command_references());
        let hook_runner = runner.clone().with_cancel(CancelToken::new());
        let hooks = dispatcher.dispatch(&outcome, &context, &hook_runner);

        tracing::info!(pipeline = %identity, terminal = %outcome.terminal, "build finished");
        drop(workspace);

        Ok(BuildReport {
            identity,
            started_at,
            outcome,
            hooks,
        })
    }

    fn dispatcher(
        &self,
        identity: &str,
        started_at: DateTime<Utc>,
        references: &BTreeMap<String, String>,
    ) -> PostActionDispatcher {
        let hooks = &self.config.hooks;
        let default_timeout = Duration::from_secs(self.config.settings.default_timeout);
        let mut dispatcher = PostActionDispatcher::new();

        for (phase, configured) in [
            (HookPhase::Success, &hooks.success),
            (HookPhase::Failure, &hooks.failure),
        ] {
            for hook in configured {
                dispatcher.add(phase, command_hook(hook, references, default_timeout));
            }
        }

        if let Some(path) = &self.config.settings.summary_path {
            dispatcher.add(HookPhase::Always, SummaryHook::new(identity, path, started_at));
        }
        for hook in &hooks.always {
            dispatcher.add(
                HookPhase::Always,
                command_hook(hook, references, default_timeout),
            );
        }
        dispatcher
    }
}

fn command_hook(
    hook: &crate::config::HookConfig,
    references: &BTreeMap<String, String>,
    default_timeout: Duration,
) -> CommandHook {
    CommandHook::new(
        hook.display_name(),
        expand_parameters(&hook.command, references),
    )
    .with_timeout(hook.timeout.map(Duration::from_secs).unwrap_or(default_timeout))
}

fn configured_backend(config: &PipelineConfig, project_root: &Path) -> Result<Box<dyn SecretBackend>> {
    match config.secrets.backend {
        SecretBackendKind::Env => Ok(Box::new(EnvBackend::new())),
        SecretBackendKind::File => {
            let path = config.secrets.path.as_ref().ok_or_else(|| {
                StagegateError::ConfigValidationError {
                    message: "secrets.path is required for the file backend".to_string(),
                }
            })?;
            Ok(Box::new(FileBackend::load(&project_root.join(path))?))
        }
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
