// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Task lifecycle.
//!
//! A task is one branch, one worktree and one agent session. The
//! [`LifecycleController`] launches, resumes, cleans up and integrates
//! tasks; [`TaskState`] names where a task is, derived from what is live.
//!
//! # Example
//!
//! ```rust,ignore
//! use worktree_task::lifecycle::{LaunchRequest, LifecycleController};
//!
//! let controller = LifecycleController::new(mux, isolator, config)?;
//! let report = controller
//!     .launch(LaunchRequest {
//!         branch: "feature/auth".into(),
//!         description: "Add OAuth login".into(),
//!         agent: None,
//!     })
//!     .await?;
//! println!("started {}", report.task.session);
//! ```

pub mod controller;
pub mod instructions;
pub mod integrate;
pub mod prompt;
pub mod state;

pub use controller::{
    CleanupReport, GitSummary, LaunchReport, LaunchRequest, LifecycleController, ResumeOutcome,
    ResumeReport, ResumeRequest, SessionDetail, StatusReport,
};
pub use instructions::{InstructionStore, RETRY_FALLBACK};
pub use integrate::{IntegrationReport, IntegrationRequest, Phase, PhaseReport};
pub use prompt::{ConflictPrompt, TemplateKind};
pub use state::{InvalidTransition, Task, TaskState};
