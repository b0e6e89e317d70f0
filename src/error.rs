// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the worktree task supervisor.
//!
//! This module provides strongly-typed errors for the different failure
//! classes of the supervisor, using `thiserror` for ergonomic error
//! definitions and `anyhow` for propagation at the binary boundary.
//!
//! - [`PreconditionError`]: fatal, raised before any state is mutated.
//! - [`TransportError`]: a multiplexer or notifier call failed; callers
//!   recover locally by skipping the affected session.
//! - [`IntegrationError`]: a merge or rebase could not be completed.
//! - [`ConfigError`]: configuration could not be loaded or validated.

use std::path::PathBuf;

use thiserror::Error;

/// Conditions that must hold before an operation may touch any resource.
#[derive(Error, Debug)]
pub enum PreconditionError {
    #[error("Working tree has uncommitted changes: {0}")]
    DirtyWorkingTree(PathBuf),

    #[error("Not in a git repository: {0}")]
    NotARepository(PathBuf),

    #[error("Branch not found: {0}")]
    BranchNotFound(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session already exists: {0}")]
    SessionExists(String),

    #[error("Already on branch '{0}'; switch to the target branch first")]
    SameBranch(String),

    #[error("Could not determine the current branch (detached HEAD?)")]
    DetachedHead,

    #[error("Required tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),
}

/// Failures talking to an external process (tmux, notifier, ...).
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("{op} timed out after {timeout_ms}ms")]
    Timeout { op: String, timeout_ms: u64 },

    #[error("{op} failed: {stderr}")]
    CommandFailed { op: String, stderr: String },

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl TransportError {
    /// Create a command failure for the given operation.
    pub fn failed(op: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandFailed {
            op: op.into(),
            stderr: stderr.into(),
        }
    }

    /// Check if this failure was a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if the program itself could not be found.
    pub fn is_tool_missing(&self) -> bool {
        matches!(
            self,
            Self::Spawn { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        )
    }
}

/// Failures of the merge/rebase orchestration.
#[derive(Error, Debug)]
pub enum IntegrationError {
    #[error("Conflicts in {phase} could not be resolved; last status:\n{status}")]
    Conflict { phase: String, status: String },

    #[error("{operation} aborted in {phase}: {reason}")]
    Aborted {
        operation: String,
        phase: String,
        reason: String,
    },

    #[error("Git error: {0}")]
    Git(String),
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// Top-level error returned by supervisor operations.
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Integration(#[from] IntegrationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SupervisorError {
    /// Check if this is a precondition failure (nothing was mutated).
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition(_) | Self::Config(_))
    }
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;

/// Result type alias for supervisor operations.
pub type SupervisorResult<T> = std::result::Result<T, SupervisorError>;
