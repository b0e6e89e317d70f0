// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! worktree-task - supervise autonomous coding agents.
//!
//! Each task is an agent running in its own tmux session, inside its own git
//! worktree, on its own branch. This crate launches those tasks, watches
//! them for stalls, nudges the stuck ones, and integrates finished branches
//! back.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`error`] - Error taxonomy and result aliases
//! - [`config`] - Configuration loading and merging
//! - [`telemetry`] - Tracing setup and correlation ids
//! - [`process`] - Bounded external command execution
//! - [`multiplexer`] - Terminal multiplexer abstraction (tmux)
//! - [`workspace`] - Git worktree isolation and git plumbing
//! - [`notify`] - Desktop notifications
//! - [`supervise`] - Stall classification, recovery and the monitor pass
//! - [`lifecycle`] - Launch, resume, cleanup, status, merge and rebase
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use worktree_task::config::{load_config, CliOptions};
//! use worktree_task::multiplexer::TmuxClient;
//! use worktree_task::supervise::Monitor;
//!
//! let config = load_config(".".as_ref(), CliOptions::default())?;
//! let mut monitor = Monitor::from_config(Arc::new(TmuxClient::new()), "myapp", &config)?;
//! let summary = monitor.run(false, false).await?;
//! println!("{summary}");
//! ```

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod multiplexer;
pub mod notify;
pub mod process;
pub mod supervise;
pub mod telemetry;
pub mod workspace;

// Re-export commonly used types at crate root
pub use error::{
    ConfigError, IntegrationError, PreconditionError, Result, SupervisorError, SupervisorResult,
    TransportError,
};
pub use lifecycle::{LifecycleController, Task, TaskState};
pub use multiplexer::{Multiplexer, OutputCapture, TmuxClient};
pub use supervise::{
    Classifier, Monitor, RecoveryAction, RecoveryDispatcher, RecoverySink, SessionRegistry,
    StallReason, StallVerdict, Summary,
};
pub use workspace::{GitWorktreeIsolator, WorkspaceIsolator};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
