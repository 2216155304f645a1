//! Ordered stage execution with gating and fail-fast abort.

use crate::error::{Result, StagegateError};

use super::context::BuildContext;
use super::result::{ExecutionResult, FailureReason, PipelineOutcome};
use super::runner::StepRunner;
use super::stage::{Stage, StageInvocation};

/// Progress events emitted while the graph runs.
#[derive(Debug)]
pub enum StageProgress<'a> {
    /// A stage's gate opened and its action is about to run.
    StageStarting {
        name: &'a str,
        index: usize,
        total: usize,
    },
    /// A stage reached its final status (including skips).
    StageFinished { result: &'a ExecutionResult },
}

/// The ordered list of stages for one pipeline.
#[derive(Debug, Default)]
pub struct StageGraph {
    stages: Vec<Stage>,
}

impl StageGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stage, keeping the list sorted by ordinal.
    ///
    /// # Errors
    ///
    /// Rejects a stage whose name or ordinal is already registered.
    pub fn register(&mut self, stage: Stage) -> Result<()> {
        if self.stages.iter().any(|s| s.name() == stage.name()) {
            return Err(StagegateError::DuplicateStage {
                stage: stage.name().to_string(),
            });
        }
        if let Some(existing) = self.stages.iter().find(|s| s.ordinal() == stage.ordinal()) {
            return Err(StagegateError::DuplicateOrdinal {
                stage: stage.name().to_string(),
                ordinal: stage.ordinal(),
                existing: existing.name().to_string(),
            });
        }

        let pos = self
            .stages
            .iter()
            .position(|s| s.ordinal() > stage.ordinal())
            .unwrap_or(self.stages.len());
        tracing::debug!(stage = %stage.name(), ordinal = stage.ordinal(), "registered stage");
        self.stages.insert(pos, stage);
        Ok(())
    }

    /// Registered stages in ordinal order.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage in order.
    pub fn run(&self, context: &BuildContext, runner: &StepRunner) -> PipelineOutcome {
        self.run_with_progress(context, runner, |_| {})
    }

    /// Run every stage in order with a progress callback.
    ///
    /// Each gate is evaluated before its action. A false gate (or a gate
    /// that errors) records `Skipped` and moves on. The first `Failed`
    /// result ends the run; later stages are neither evaluated nor recorded.
    pub fn run_with_progress(
        &self,
        context: &BuildContext,
        runner: &StepRunner,
        mut on_progress: impl FnMut(StageProgress<'_>),
    ) -> PipelineOutcome {
        let total = self.stages.len();
        let mut results = Vec::with_capacity(total);

        for (index, stage) in self.stages.iter().enumerate() {
            let name = stage.name();

            if runner.cancel_token().is_cancelled() {
                tracing::warn!(stage = %name, "build cancelled before stage started");
                let result = ExecutionResult::failed(
                    name,
                    FailureReason::Cancelled,
                    None,
                    std::time::Duration::ZERO,
                    Vec::new(),
                )
                .with_note("cancelled before start");
                on_progress(StageProgress::StageFinished { result: &result });
                results.push(result);
                break;
            }

            let open = match stage.gate().evaluate(context) {
                Ok(open) => open,
                Err(e) => {
                    tracing::warn!(stage = %name, error = %format!("{:#}", e), "gate evaluation failed; treating as closed");
                    false
                }
            };

            if !open {
                let result = ExecutionResult::skipped(name, stage.gate().skip_reason());
                tracing::info!(stage = %name, reason = ?result.note, "stage skipped");
                on_progress(StageProgress::StageFinished { result: &result });
                results.push(result);
                continue;
            }

            on_progress(StageProgress::StageStarting { name, index, total });
            let invocation = StageInvocation {
                name,
                context,
                runner,
                timeout: stage.timeout(),
            };
            let result = stage.action().run(&invocation);
            on_progress(StageProgress::StageFinished { result: &result });

            let failed = result.is_failed();
            if failed {
                tracing::error!(
                    stage = %name,
                    reason = ?result.failure,
                    exit_code = ?result.exit_code,
                    "stage failed; aborting remaining stages"
                );
                for line in &result.output_tail {
                    tracing::error!(stage = %name, "  {}", line);
                }
            }
            results.push(result);
            if failed {
                break;
            }
        }

        let outcome = PipelineOutcome::from_results(results);
        tracing::info!(terminal = %outcome.terminal, stages = outcome.results.len(), "stage graph finished");
        outcome
    }
}
