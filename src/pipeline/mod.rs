//! The staged execution engine.
//!
//! A [`StageGraph`] holds stages in ordinal order. Each stage has a
//! [`Gate`] (usually "does the upstream artifact exist?") and an [`Action`]
//! (usually a shell command run by the [`StepRunner`]). The first failed
//! stage ends the run; the [`PostActionDispatcher`] then runs the hooks for
//! the terminal state followed by the always hooks.
//!
//! [`Pipeline`] ties this to configuration, credentials, the workspace and
//! the single-flight lock.

pub mod build;
pub mod context;
pub mod graph;
pub mod hooks;
pub mod result;
pub mod runner;
pub mod single_flight;
pub mod stage;
pub mod summary;
pub mod workspace;

pub use build::{
    build_graph, effective_ordinals, resolve_parameters, BuildReport, BuildRequest, Pipeline,
    ResolvedParameters, PIPELINE_ENV, SCRATCH_ENV, WORKSPACE_ENV,
};
pub use context::BuildContext;
pub use graph::{StageGraph, StageProgress};
pub use hooks::{
    CommandHook, DispatchReport, Hook, HookInvocation, HookPhase, HookRecord,
    PostActionDispatcher, SummaryHook, FAILED_STAGE_ENV, STATUS_ENV,
};
pub use result::{ExecutionResult, FailureReason, PipelineOutcome, StageStatus, Terminal};
pub use runner::StepRunner;
pub use single_flight::{default_lock_dir, lock_path, LockPolicy, PipelineLock};
pub use stage::{
    Action, AlwaysGate, CachedInstallAction, CommandAction, FileGate, FnAction, Gate, Stage,
    StageInvocation,
};
pub use summary::BuildSummary;
pub use workspace::{WorkspaceGuard, WorkspaceManager, WorkspaceMode};
