//! Error types for stagegate operations.
//!
//! This module defines [`StagegateError`], the error type for conditions that
//! prevent a build from starting or completing its bookkeeping, and a
//! [`Result`] alias for convenience.
//!
//! # Error Handling Strategy
//!
//! - A stage that fails is *not* an error: it is recorded as a failed
//!   [`ExecutionResult`](crate::pipeline::ExecutionResult) and drives the
//!   pipeline to a `Failed` terminal state.
//! - `StagegateError` covers what must stop a build before stage 1
//!   (configuration, parameters, credentials, locking) and registration
//!   mistakes in the stage graph.
//! - Use `anyhow::Error` (via `StagegateError::Other`) for unexpected errors.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for stagegate operations.
#[derive(Debug, Error)]
pub enum StagegateError {
    /// Configuration file not found at expected location.
    #[error("Configuration not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Failed to parse configuration file.
    #[error("Failed to parse config at {path}: {message}")]
    ConfigParseError { path: PathBuf, message: String },

    /// Invalid configuration structure or values.
    #[error("Invalid configuration: {message}")]
    ConfigValidationError { message: String },

    /// A required trigger parameter was not supplied.
    #[error("Missing required parameter '{name}'")]
    MissingParameter { name: String },

    /// A declared credential could not be resolved from the secret backend.
    #[error("Could not resolve credential '{id}': {message}")]
    CredentialResolution { id: String, message: String },

    /// Two stages were registered with the same ordinal.
    #[error("Stage '{stage}' reuses ordinal {ordinal} (already taken by '{existing}')")]
    DuplicateOrdinal {
        stage: String,
        ordinal: u32,
        existing: String,
    },

    /// Two stages were registered with the same name.
    #[error("Stage '{stage}' is registered twice")]
    DuplicateStage { stage: String },

    /// Another build for the same pipeline identity holds the lock.
    #[error("Pipeline '{identity}' is already running")]
    PipelineLocked { identity: String },

    /// Waiting for a queued build exceeded the configured limit.
    #[error("Timed out after {waited_secs}s waiting for pipeline '{identity}'")]
    LockTimeout { identity: String, waited_secs: u64 },

    /// Cancellation arrived while a queued build was waiting.
    #[error("Cancelled while waiting for pipeline '{identity}'")]
    LockCancelled { identity: String },

    /// Shell command could not be run.
    #[error("Command failed with exit code {code:?}: {command}")]
    CommandFailed { command: String, code: Option<i32> },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic wrapped error for anyhow interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StagegateError {
    /// Process exit code for errors that stop a build before any stage runs.
    pub fn exit_code(&self) -> i32 {
        match self {
            StagegateError::PipelineLocked { .. }
            | StagegateError::LockTimeout { .. }
            | StagegateError::LockCancelled { .. } => 3,
            _ => 2,
        }
    }
}

/// Result type alias for stagegate operations.
pub type Result<T> = std::result::Result<T, StagegateError>;
