// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Task identity and state.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::supervise::StallVerdict;

/// Per-task lifecycle state.
///
/// ```text
/// Created -> Running -> { Stalled <-> Retried } -> { Completed | Failed } -> Cleaned
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Created,
    Running,
    Stalled,
    Retried,
    Completed,
    Failed,
    Cleaned,
}

/// Rejected state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid task transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: TaskState,
    pub to: TaskState,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stalled => "stalled",
            Self::Retried => "retried",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cleaned => "cleaned",
        }
    }

    /// Check if the agent is (or may still be) working.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Stalled | Self::Retried)
    }

    /// Check if this state represents a finished task.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cleaned)
    }

    pub fn can_transition_to(&self, next: TaskState) -> bool {
        use TaskState::*;
        match (*self, next) {
            // cleanup is allowed from anywhere except itself
            (Cleaned, _) => false,
            (_, Cleaned) => true,
            (Created, Running | Failed) => true,
            (Running, Stalled | Completed | Failed) => true,
            (Stalled, Retried | Running | Failed) => true,
            (Retried, Running | Stalled | Completed | Failed) => true,
            _ => false,
        }
    }

    pub fn transition(self, next: TaskState) -> Result<TaskState, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition { from: self, to: next })
        }
    }

    /// Derive the state of a live task from what can be observed now.
    ///
    /// Task state is never persisted; it is re-derived from the session list
    /// and the current stall verdict. An unreadable session counts as running.
    pub fn observe(session_alive: bool, verdict: Option<&StallVerdict>) -> TaskState {
        match (session_alive, verdict) {
            (false, _) => Self::Cleaned,
            (true, Some(v)) if v.stalled() => Self::Stalled,
            (true, _) => Self::Running,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A logical unit of work bound to a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub project: String,
    pub branch: String,
    pub description: String,
    pub agent_command: String,
    pub session: String,
    pub worktree: PathBuf,
    pub state: TaskState,
}

impl Task {
    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    pub fn advance(&mut self, next: TaskState) -> Result<(), InvalidTransition> {
        self.state = self.state.transition(next)?;
        Ok(())
    }
}
