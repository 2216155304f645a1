//! Cache command implementation.
//!
//! Provides `stagegate cache status` and `stagegate cache clear`.

use clap::{Args, Subcommand};

use crate::cache::{CacheDecision, CacheGate};
use crate::error::{Result, StagegateError};
use crate::ui::UserInterface;

use super::dispatcher::{Command, CommandResult, ProjectLocation};

/// Arguments for the cache command.
#[derive(Debug, Clone, Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheSubcommand,
}

/// Cache subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum CacheSubcommand {
    /// Show whether each cached stage would install on the next run.
    Status,
    /// Delete cache records so the next run starts fresh.
    Clear {
        /// Only clear this stage's record.
        #[arg(long)]
        stage: Option<String>,
    },
}

/// The cache command implementation.
pub struct CacheCommand {
    location: ProjectLocation,
    args: CacheArgs,
}

impl CacheCommand {
    /// Create a new cache command.
    pub fn new(location: ProjectLocation, args: CacheArgs) -> Self {
        Self { location, args }
    }

    /// Cache gates for every stage with a `cache:` block, in file order.
    fn gates(&self) -> Result<Vec<(String, CacheGate)>> {
        let config = self.location.load()?;
        Ok(config
            .stages
            .iter()
            .filter_map(|stage| {
                stage.cache.as_ref().map(|cache| {
                    (
                        stage.name.clone(),
                        CacheGate::from_config(&self.location.root, cache),
                    )
                })
            })
            .collect())
    }
}

impl Command for CacheCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let gates = self.gates()?;

        match &self.args.command {
            CacheSubcommand::Status => {
                show_status(&gates, ui);
                Ok(CommandResult::success())
            }
            CacheSubcommand::Clear { stage } => clear(&gates, stage.as_deref(), ui),
        }
    }
}

fn show_status(gates: &[(String, CacheGate)], ui: &mut dyn UserInterface) {
    if gates.is_empty() {
        ui.message("No stages declare a cache");
        return;
    }

    for (name, gate) in gates {
        let decision = gate.decide();
        let detail = match &decision {
            CacheDecision::Unchanged { hash } => format!("up to date ({})", short(hash)),
            CacheDecision::Changed { previous, current } => {
                format!("manifest changed ({} -> {})", short(previous), short(current))
            }
            CacheDecision::NoRecord { .. } => "no record".to_string(),
            CacheDecision::Unavailable { reason, .. } => format!("unavailable: {}", reason),
        };
        let action = if decision.requires_install(gate.policy()) {
            "will install"
        } else {
            "will skip"
        };
        ui.message(&format!(
            "  {}: {}, {} [{}]",
            name,
            detail,
            action,
            gate.record_path().display()
        ));
    }
}

fn clear(
    gates: &[(String, CacheGate)],
    stage: Option<&str>,
    ui: &mut dyn UserInterface,
) -> Result<CommandResult> {
    let selected: Vec<_> = gates
        .iter()
        .filter(|(name, _)| stage.map_or(true, |s| s == name))
        .collect();

    if let Some(stage) = stage {
        if selected.is_empty() {
            ui.error(&format!("Stage '{}' has no cache", stage));
            return Ok(CommandResult::failure(2));
        }
    }

    let mut cleared = 0;
    for (name, gate) in selected {
        let existed = gate.clear().map_err(StagegateError::Io)?;
        if existed {
            tracing::debug!(stage = %name, record = %gate.record_path().display(), "cleared cache record");
            cleared += 1;
        }
    }

    ui.success(&format!(
        "Cleared {} cache record{}",
        cleared,
        if cleared == 1 { "" } else { "s" }
    ));
    Ok(CommandResult::success())
}

fn short(hash: &str) -> &str {
    &hash[..hash.len().min(12)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CONFIG_DIR, CONFIG_FILE};
    use crate::ui::MockUI;
    use std::fs;
    use tempfile::TempDir;

    const PIPELINE: &str = r#"
stages:
  - name: setup
    command: pip install -r requirements.txt
    cache:
      manifest: requirements.txt
      record: .cache/requirements.sha256
  - name: fetch
    command: ./fetch.sh
"#;

    fn project() -> TempDir {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join(CONFIG_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(CONFIG_FILE), PIPELINE).unwrap();
        fs::write(temp.path().join("requirements.txt"), "requests==2.31\n").unwrap();
        temp
    }

    fn run(temp: &TempDir, command: CacheSubcommand) -> (CommandResult, MockUI) {
        let cmd = CacheCommand::new(ProjectLocation::new(temp.path()), CacheArgs { command });
        let mut ui = MockUI::new();
        let result = cmd.execute(&mut ui).unwrap();
        (result, ui)
    }

    #[test]
    fn status_without_record() {
        let temp = project();
        let (result, ui) = run(&temp, CacheSubcommand::Status);

        assert!(result.success);
        assert_eq!(ui.messages().len(), 1);
        assert!(ui.messages()[0].starts_with("  setup: no record"));
    }

    #[test]
    fn status_after_record_is_up_to_date() {
        let temp = project();
        let gate = CacheGate::from_config(
            temp.path(),
            crate::config::load_config(temp.path(), None).unwrap().stages[0]
                .cache
                .as_ref()
                .unwrap(),
        );
        gate.run(|| (), |_| true);

        let (_, ui) = run(&temp, CacheSubcommand::Status);
        assert!(ui.has_output("up to date"));
        assert!(ui.has_output("will skip"));
    }

    #[test]
    fn clear_removes_record() {
        let temp = project();
        let record = temp.path().join(".cache/requirements.sha256");
        fs::create_dir_all(record.parent().unwrap()).unwrap();
        fs::write(&record, "{}").unwrap();

        let (result, ui) = run(&temp, CacheSubcommand::Clear { stage: None });

        assert!(result.success);
        assert!(!record.exists());
        assert_eq!(ui.successes(), ["Cleared 1 cache record"]);
    }

    #[test]
    fn clear_unknown_stage_fails() {
        let temp = project();
        let (result, ui) = run(
            &temp,
            CacheSubcommand::Clear {
                stage: Some("fetch".to_string()),
            },
        );

        assert_eq!(result, CommandResult::failure(2));
        assert!(ui.has_output("Stage 'fetch' has no cache"));
    }
}
