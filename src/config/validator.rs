//! Configuration validation rules.
//!
//! This module validates a pipeline definition for correctness:
//! - Stage names are non-empty, unique and shell/file-safe
//! - Explicit ordinals are unique
//! - Every stage and hook has a command
//! - Gate, manifest and record paths stay inside the workspace
//! - Credential ids and environment bindings are unique

use crate::config::schema::PipelineConfig;
use crate::error::{Result, StagegateError};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::{Component, Path};
use std::sync::OnceLock;

/// Validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Rule identifier
    pub rule: String,
    /// Human-readable error message
    pub message: String,
    /// Stage name if error is stage-specific
    pub stage: Option<String>,
}

impl ValidationError {
    fn new(rule: &str, message: String, stage: Option<&str>) -> Self {
        Self {
            rule: rule.to_string(),
            message,
            stage: stage.map(String::from),
        }
    }
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static regex"))
}

/// Validate a configuration and return all errors.
///
/// All rules run so users can fix every issue in one pass.
pub fn validate_config(config: &PipelineConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    errors.extend(validate_stages(config));
    errors.extend(validate_hooks(config));
    errors.extend(validate_credentials(config));
    errors.extend(validate_parameters(config));

    errors
}

fn validate_stages(config: &PipelineConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut names = HashSet::new();
    let mut ordinals: HashMap<u32, &str> = HashMap::new();

    for stage in &config.stages {
        let name = stage.name.as_str();

        if !name_pattern().is_match(name) {
            errors.push(ValidationError::new(
                "invalid-stage-name",
                format!(
                    "Stage name '{}' must be non-empty and use only letters, digits, '_' or '-'",
                    name
                ),
                Some(name),
            ));
        }

        if !names.insert(name) {
            errors.push(ValidationError::new(
                "duplicate-stage",
                format!("Stage '{}' is defined more than once", name),
                Some(name),
            ));
        }

        if let Some(ordinal) = stage.ordinal {
            if let Some(existing) = ordinals.insert(ordinal, name) {
                errors.push(ValidationError::new(
                    "duplicate-ordinal",
                    format!(
                        "Stage '{}' reuses ordinal {} already taken by '{}'",
                        name, ordinal, existing
                    ),
                    Some(name),
                ));
            }
        }

        if stage.command.trim().is_empty() {
            errors.push(ValidationError::new(
                "missing-command",
                format!("Stage '{}' has no command", name),
                Some(name),
            ));
        }

        if stage.timeout == Some(0) {
            errors.push(ValidationError::new(
                "zero-timeout",
                format!("Stage '{}' has a timeout of 0 seconds", name),
                Some(name),
            ));
        }

        if let Some(gate) = &stage.gate {
            check_workspace_path(&mut errors, "gate", gate, name);
        }

        if let Some(cache) = &stage.cache {
            check_workspace_path(&mut errors, "manifest", &cache.manifest, name);
            check_workspace_path(&mut errors, "record", &cache.record, name);
        }
    }

    errors
}

fn check_workspace_path(errors: &mut Vec<ValidationError>, field: &str, path: &Path, stage: &str) {
    if path.as_os_str().is_empty() {
        errors.push(ValidationError::new(
            "empty-path",
            format!("Stage '{}' has an empty {} path", stage, field),
            Some(stage),
        ));
    } else if !is_workspace_relative(path) {
        errors.push(ValidationError::new(
            "path-outside-workspace",
            format!(
                "Stage '{}' {} path '{}' must be relative and may not contain '..'",
                stage,
                field,
                path.display()
            ),
            Some(stage),
        ));
    }
}

/// Whether a path is relative and cannot climb out of the workspace.
pub fn is_workspace_relative(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn validate_hooks(config: &PipelineConfig) -> Vec<ValidationError> {
    let hooks = &config.hooks;
    hooks
        .always
        .iter()
        .chain(&hooks.success)
        .chain(&hooks.failure)
        .filter(|hook| hook.command.trim().is_empty())
        .map(|hook| {
            ValidationError::new(
                "missing-hook-command",
                format!("Hook '{}' has no command", hook.display_name()),
                None,
            )
        })
        .collect()
}

fn validate_credentials(config: &PipelineConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut ids = HashSet::new();
    let mut envs = HashSet::new();

    for cred in &config.credentials {
        if cred.id.trim().is_empty() {
            errors.push(ValidationError::new(
                "empty-credential-id",
                "A credential has an empty id".to_string(),
                None,
            ));
        }
        if !ids.insert(cred.id.as_str()) {
            errors.push(ValidationError::new(
                "duplicate-credential",
                format!("Credential '{}' is declared more than once", cred.id),
                None,
            ));
        }
        if !envs.insert(cred.env.as_str()) {
            errors.push(ValidationError::new(
                "duplicate-credential-env",
                format!(
                    "Environment variable '{}' is bound to more than one credential",
                    cred.env
                ),
                None,
            ));
        }
    }

    errors
}

fn validate_parameters(config: &PipelineConfig) -> Vec<ValidationError> {
    let credential_envs: HashSet<&str> = config.credentials.iter().map(|c| c.env.as_str()).collect();

    config
        .parameters
        .iter()
        .filter_map(|(name, param)| {
            let env = param
                .env
                .clone()
                .unwrap_or_else(|| name.to_ascii_uppercase());
            credential_envs.contains(env.as_str()).then(|| {
                ValidationError::new(
                    "parameter-shadows-credential",
                    format!(
                        "Parameter '{}' binds '{}', which is reserved for a credential",
                        name, env
                    ),
                    None,
                )
            })
        })
        .collect()
}

/// Validate and return Result (for convenience).
///
/// # Errors
///
/// Returns `ConfigValidationError` if any validation rules fail.
pub fn validate(config: &PipelineConfig) -> Result<()> {
    let errors = validate_config(config);

    if errors.is_empty() {
        Ok(())
    } else {
        let messages: Vec<_> = errors.iter().map(|e| e.message.clone()).collect();
        Err(StagegateError::ConfigValidationError {
            message: messages.join("; "),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{
        CacheConfig, CredentialConfig, HookConfig, ParameterConfig, StageConfig,
    };
    use std::path::PathBuf;

    fn stage(name: &str, command: &str) -> StageConfig {
        StageConfig {
            name: name.to_string(),
            command: command.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn valid_pipeline_passes() {
        let mut config = PipelineConfig::default();
        config.stages.push(stage("fetch", "python3 fetch.py"));
        config.stages.push(StageConfig {
            gate: Some(PathBuf::from("data/rtm_data.json")),
            ..stage("generate", "python3 generate.py")
        });

        assert!(validate(&config).is_ok());
    }

    #[test]
    fn rejects_duplicate_stage_names() {
        let mut config = PipelineConfig::default();
        config.stages.push(stage("fetch", "a"));
        config.stages.push(stage("fetch", "b"));

        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| e.rule == "duplicate-stage"));
    }

    #[test]
    fn rejects_duplicate_ordinals() {
        let mut config = PipelineConfig::default();
        config.stages.push(StageConfig {
            ordinal: Some(2),
            ..stage("fetch", "a")
        });
        config.stages.push(StageConfig {
            ordinal: Some(2),
            ..stage("generate", "b")
        });

        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| e.rule == "duplicate-ordinal"));
    }

    #[test]
    fn rejects_empty_command() {
        let mut config = PipelineConfig::default();
        config.stages.push(stage("fetch", "   "));

        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| e.rule == "missing-command"));
    }

    #[test]
    fn rejects_unsafe_stage_name() {
        let mut config = PipelineConfig::default();
        config.stages.push(stage("../escape", "true"));

        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| e.rule == "invalid-stage-name"));
    }

    #[test]
    fn rejects_gate_outside_workspace() {
        let mut config = PipelineConfig::default();
        config.stages.push(StageConfig {
            gate: Some(PathBuf::from("../other/report.html")),
            ..stage("publish", "true")
        });
        config.stages.push(StageConfig {
            gate: Some(PathBuf::from("/etc/passwd")),
            ..stage("notify", "true")
        });

        let errors = validate_config(&config);
        let outside = errors
            .iter()
            .filter(|e| e.rule == "path-outside-workspace")
            .count();
        assert_eq!(outside, 2);
    }

    #[test]
    fn rejects_cache_record_outside_workspace() {
        let mut config = PipelineConfig::default();
        config.stages.push(StageConfig {
            cache: Some(CacheConfig {
                manifest: PathBuf::from("requirements.txt"),
                record: PathBuf::from("../hash.json"),
                bootstrap: Default::default(),
            }),
            ..stage("setup", "pip install -r requirements.txt")
        });

        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| e.rule == "path-outside-workspace"));
    }

    #[test]
    fn rejects_empty_hook_command() {
        let mut config = PipelineConfig::default();
        config.hooks.failure.push(HookConfig {
            name: Some("notify".into()),
            ..Default::default()
        });

        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| e.rule == "missing-hook-command"));
    }

    #[test]
    fn rejects_duplicate_credential_env() {
        let mut config = PipelineConfig::default();
        config.credentials.push(CredentialConfig {
            id: "jira-token".into(),
            env: "TOKEN".into(),
        });
        config.credentials.push(CredentialConfig {
            id: "confluence-token".into(),
            env: "TOKEN".into(),
        });

        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| e.rule == "duplicate-credential-env"));
    }

    #[test]
    fn rejects_parameter_bound_to_credential_env() {
        let mut config = PipelineConfig::default();
        config.credentials.push(CredentialConfig {
            id: "jira-token".into(),
            env: "JIRA_TOKEN".into(),
        });
        config
            .parameters
            .insert("jira_token".into(), ParameterConfig::default());

        let errors = validate_config(&config);
        assert!(errors
            .iter()
            .any(|e| e.rule == "parameter-shadows-credential"));
    }

    #[test]
    fn validate_joins_messages() {
        let mut config = PipelineConfig::default();
        config.stages.push(stage("", ""));

        let err = validate(&config).unwrap_err();
        assert!(matches!(err, StagegateError::ConfigValidationError { .. }));
    }

    #[test]
    fn workspace_relative_accepts_dot_prefix() {
        assert!(is_workspace_relative(Path::new("./report/rtm_report.pdf")));
        assert!(!is_workspace_relative(Path::new("report/../../x")));
    }
}
