//! Machine-readable build summary.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::secrets::{OutputMasker, SecretMatcher};

use super::result::{ExecutionResult, PipelineOutcome, Terminal};

const REDACTED: &str = "[REDACTED]";

/// The `build-summary.json` document.
///
/// Never contains credential values: parameters whose names look secret are
/// redacted and every string passes through the build's masker.
#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
    pub pipeline: String,
    pub terminal: Terminal,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub parameters: BTreeMap<String, String>,
    pub stages: Vec<ExecutionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<String>,
}

impl BuildSummary {
    /// Summarise `outcome`, redacting with `masker`.
    pub fn new(
        pipeline: &str,
        started_at: DateTime<Utc>,
        parameters: &BTreeMap<String, String>,
        outcome: &PipelineOutcome,
        masker: &OutputMasker,
    ) -> Self {
        let matcher = SecretMatcher::with_builtins();
        let parameters = parameters
            .iter()
            .map(|(name, value)| {
                let shown = if matcher.is_secret(name) {
                    REDACTED.to_string()
                } else {
                    masker.mask(value)
                };
                (name.clone(), shown)
            })
            .collect();

        let stages = outcome
            .results
            .iter()
            .map(|r| {
                let mut r = r.clone();
                r.output_tail = r.output_tail.iter().map(|l| masker.mask(l)).collect();
                r.note = r.note.as_deref().map(|n| masker.mask(n));
                r
            })
            .collect();

        Self {
            pipeline: pipeline.to_string(),
            terminal: outcome.terminal,
            started_at,
            finished_at: Utc::now(),
            parameters,
            stages,
            failed_stage: outcome.failed_stage().map(|r| r.stage_name.clone()),
        }
    }

    /// Write the summary as pretty JSON, atomically.
    pub fn write(&self, path: &Path) -> anyhow::Result<()> {
        use anyhow::Context;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, json)
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;
        fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to move summary into {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::FailureReason;
    use std::time::Duration;
    use tempfile::TempDir;

    fn outcome() -> PipelineOutcome {
        PipelineOutcome::from_results(vec![
            ExecutionResult::skipped("setup", "cache hit (unchanged)"),
            ExecutionResult::failed(
                "fetch",
                FailureReason::NonZeroExit,
                Some(1),
                Duration::from_millis(12),
                vec!["401 for token abc123".to_string()],
            ),
        ])
    }

    #[test]
    fn redacts_secret_parameters_and_credentials() {
        let mut params = BTreeMap::new();
        params.insert("project_key".to_string(), "ACME".to_string());
        params.insert("trigger_token".to_string(), "tt-999".to_string());
        let mut masker = OutputMasker::new();
        masker.add_secret("abc123");

        let summary = BuildSummary::new("rtm", Utc::now(), &params, &outcome(), &masker);
        let json = serde_json::to_string(&summary).unwrap();

        assert!(json.contains("ACME"));
        assert!(!json.contains("tt-999"));
        assert!(!json.contains("abc123"));
        assert_eq!(summary.failed_stage.as_deref(), Some("fetch"));
        assert_eq!(summary.terminal, Terminal::Failed);
    }

    #[test]
    fn write_creates_json_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out").join("build-summary.json");
        let summary = BuildSummary::new(
            "rtm",
            Utc::now(),
            &BTreeMap::new(),
            &outcome(),
            &OutputMasker::new(),
        );

        summary.write(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["pipeline"], "rtm");
        assert_eq!(value["terminal"], "failed");
        assert_eq!(value["stages"][0]["status"], "skipped");
    }
}
