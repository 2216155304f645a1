//! Configuration schema definitions for stagegate.
//!
//! This module contains the struct definitions that map to the
//! `.stagegate/pipeline.yml` file format.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::cache::BootstrapPolicy;
use crate::pipeline::{LockPolicy, WorkspaceMode};

/// Root configuration structure for `pipeline.yml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pipeline identity. Builds sharing a name are mutually exclusive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Global settings
    pub settings: Settings,

    /// Trigger parameter declarations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, ParameterConfig>,

    /// Credentials resolved once at build start
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credentials: Vec<CredentialConfig>,

    /// Where credentials come from
    pub secrets: SecretsConfig,

    /// Stage definitions, in execution order
    #[serde(default)]
    pub stages: Vec<StageConfig>,

    /// Post-action hooks
    pub hooks: HooksConfig,
}

/// Global settings that apply to every stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Timeout in seconds for stages that don't set their own
    #[serde(default = "default_timeout")]
    pub default_timeout: u64,

    /// Number of output lines kept per stage for diagnostics
    #[serde(default = "default_output_tail_lines")]
    pub output_tail_lines: usize,

    /// Directory (relative to the workspace) for per-stage log files
    #[serde(default = "default_log_dir")]
    pub log_dir: Option<PathBuf>,

    /// Build summary file (relative to the workspace)
    #[serde(default = "default_summary_path")]
    pub summary_path: Option<PathBuf>,

    /// Static environment shared by every stage
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Single-flight behaviour for concurrent builds
    pub concurrency: ConcurrencyConfig,

    /// Workspace handling
    pub workspace: WorkspaceConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_timeout: default_timeout(),
            output_tail_lines: default_output_tail_lines(),
            log_dir: default_log_dir(),
            summary_path: default_summary_path(),
            env: BTreeMap::new(),
            concurrency: ConcurrencyConfig::default(),
            workspace: WorkspaceConfig::default(),
        }
    }
}

fn default_timeout() -> u64 {
    30 * 60
}

fn default_output_tail_lines() -> usize {
    40
}

fn default_log_dir() -> Option<PathBuf> {
    Some(PathBuf::from("logs"))
}

fn default_summary_path() -> Option<PathBuf> {
    Some(PathBuf::from("build-summary.json"))
}

fn is_false(v: &bool) -> bool {
    !v
}

/// Mutual exclusion between builds of the same pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Queue or reject a build when another one holds the pipeline
    pub policy: LockPolicy,

    /// Maximum seconds a queued build waits (None = wait forever)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_timeout: Option<u64>,

    /// Directory holding the per-pipeline lock files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_dir: Option<PathBuf>,
}

/// Workspace lifetime settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// persistent (project checkout) or ephemeral (fresh temp dir)
    pub mode: WorkspaceMode,

    /// Paths removed when the build ends, whatever the outcome
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transient: Vec<PathBuf>,
}

/// A trigger parameter declaration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterConfig {
    /// Build refuses to start without it
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,

    /// Value used when the trigger omits it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    /// Environment variable name (defaults to the upper-cased key)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,

    /// Human-readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A credential to resolve through the secret backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    /// Identifier understood by the backend
    pub id: String,

    /// Environment variable the value is bound to
    pub env: String,
}

/// Secret backend selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    /// Backend kind
    pub backend: SecretBackendKind,

    /// Secrets file for the `file` backend (relative to the project root)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Supported secret backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretBackendKind {
    /// `STAGEGATE_SECRET_<ID>` variables of the launching process
    #[default]
    Env,
    /// `KEY=value` secrets file
    File,
}

/// Configuration for a single stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Stage name
    pub name: String,

    /// Explicit position; defaults to declaration order
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordinal: Option<u32>,

    /// Stage description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// File (relative to the workspace) that must exist for the stage to run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate: Option<PathBuf>,

    /// Shell command to execute
    pub command: String,

    /// Timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Stage-only environment entries
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Skip the command while its manifest is unchanged
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheConfig>,
}

/// Manifest-hash caching for an install stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Dependency manifest whose content is hashed
    pub manifest: PathBuf,

    /// Where the hash record is persisted
    pub record: PathBuf,

    /// What to do when no record exists yet
    #[serde(default)]
    pub bootstrap: BootstrapPolicy,
}

/// Post-action hooks grouped by trigger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HooksConfig {
    /// Run after every build, last
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub always: Vec<HookConfig>,

    /// Run when every stage succeeded or was skipped
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub success: Vec<HookConfig>,

    /// Run when a stage failed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failure: Vec<HookConfig>,
}

impl HooksConfig {
    /// Total number of configured hooks.
    pub fn len(&self) -> usize {
        self.always.len() + self.success.len() + self.failure.len()
    }

    /// Whether no hooks are configured.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A command hook.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HookConfig {
    /// Display name (defaults to the command)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Shell command to execute
    pub command: String,

    /// Timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl HookConfig {
    /// Name shown in logs and summaries.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RTM_PIPELINE: &str = r#"
name: rtm-report
parameters:
  project_key:
    required: true
    env: RTM_PROJECT
  execution_key:
    required: true
    env: JIRA_EXECUTION_ID
credentials:
  - id: jira-token
    env: JIRA_TOKEN
stages:
  - name: setup
    command: pip install -r requirements.txt
    cache:
      manifest: requirements.txt
      record: .stagegate/cache/requirements.json
  - name: fetch
    command: python3 scripts/fetch_rtm_data.py
    timeout: 600
  - name: generate
    gate: data/rtm_data.json
    command: python3 scripts/generate_rtm_report.py
hooks:
  failure:
    - command: echo failed
"#;

    #[test]
    fn parses_full_pipeline() {
        let config: PipelineConfig = serde_yaml::from_str(RTM_PIPELINE).unwrap();

        assert_eq!(config.name.as_deref(), Some("rtm-report"));
        assert_eq!(config.stages.len(), 3);
        assert!(config.parameters["project_key"].required);
        assert_eq!(config.credentials[0].env, "JIRA_TOKEN");
        assert_eq!(config.stages[1].timeout, Some(600));
        assert_eq!(
            config.stages[2].gate,
            Some(PathBuf::from("data/rtm_data.json"))
        );
        assert_eq!(config.hooks.failure.len(), 1);
    }

    #[test]
    fn cache_bootstrap_defaults_to_trust_baseline() {
        let config: PipelineConfig = serde_yaml::from_str(RTM_PIPELINE).unwrap();
        let cache = config.stages[0].cache.as_ref().unwrap();
        assert_eq!(cache.bootstrap, BootstrapPolicy::TrustBaseline);
    }

    #[test]
    fn settings_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.default_timeout, 1800);
        assert_eq!(settings.output_tail_lines, 40);
        assert_eq!(settings.log_dir, Some(PathBuf::from("logs")));
        assert_eq!(settings.concurrency.policy, LockPolicy::Queue);
        assert_eq!(settings.workspace.mode, WorkspaceMode::Persistent);
    }

    #[test]
    fn parses_reject_policy_and_ephemeral_workspace() {
        let yaml = r#"
settings:
  concurrency:
    policy: reject
  workspace:
    mode: ephemeral
    transient: [data, report]
"#;
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.settings.concurrency.policy, LockPolicy::Reject);
        assert_eq!(config.settings.workspace.mode, WorkspaceMode::Ephemeral);
        assert_eq!(config.settings.workspace.transient.len(), 2);
    }

    #[test]
    fn secrets_backend_parses_lowercase() {
        let yaml = "secrets:\n  backend: file\n  path: .secrets.env\n";
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.secrets.backend, SecretBackendKind::File);
    }

    #[test]
    fn hook_display_name_falls_back_to_command() {
        let hook = HookConfig {
            command: "python3 scripts/send_email.py".into(),
            ..Default::default()
        };
        assert_eq!(hook.display_name(), "python3 scripts/send_email.py");
    }

    #[test]
    fn log_dir_can_be_disabled() {
        let yaml = "settings:\n  log_dir: null\n";
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.settings.log_dir.is_none());
    }
}
