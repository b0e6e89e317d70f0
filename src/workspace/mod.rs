// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Workspace isolation.
//!
//! Every task runs on its own branch in its own git worktree, created as a
//! sibling of the primary repository:
//!
//! ```text
//! /code/myapp/                  # primary working copy
//! /code/myapp-feature-auth/     # worktree for branch feature/auth
//! /code/myapp-fix-login/        # worktree for branch fix/login
//! ```
//!
//! - [`WorkspaceIsolator`]: the seam the lifecycle controller talks to.
//! - [`GitWorktreeIsolator`]: `git worktree` implementation.
//! - [`GitRepo`]: git plumbing shared with the merge/rebase orchestration.

mod git;
mod worktree;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{PreconditionError, SupervisorError, TransportError};

pub use git::{GitOperation, GitRepo, IntegrationStep};
pub use worktree::GitWorktreeIsolator;

#[cfg(all(test, unix))]
pub(crate) use git::tests::init_repo;

/// Error type for workspace operations.
#[derive(Debug, thiserror::Error)]
pub enum IsolationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Git error: {0}")]
    Git(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Not in a git repository: {0}")]
    NotARepository(PathBuf),

    #[error("Branch not found: {0}")]
    BranchNotFound(String),

    #[error("Invalid workspace: {0}")]
    InvalidWorkspace(String),

    #[error("Worktree creation failed: {0}")]
    WorktreeCreationFailed(String),
}

impl From<IsolationError> for SupervisorError {
    fn from(err: IsolationError) -> Self {
        match err {
            IsolationError::Transport(e) => Self::Transport(e),
            IsolationError::NotARepository(p) => PreconditionError::NotARepository(p).into(),
            IsolationError::BranchNotFound(b) => PreconditionError::BranchNotFound(b).into(),
            IsolationError::Io(e) => Self::Io(e),
            other => Self::Workspace(other.to_string()),
        }
    }
}

/// A checked-out working copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceInfo {
    pub path: PathBuf,
    /// Checked-out branch, `None` when detached.
    pub branch: Option<String>,
    pub head: String,
    /// Whether this is the primary working copy rather than a linked worktree.
    pub is_primary: bool,
}

/// How [`WorkspaceIsolator::create`] obtained the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceOrigin {
    /// New branch and new worktree.
    NewBranch,
    /// Existing branch checked out into a new worktree.
    ExistingBranch,
    /// A worktree for the branch already existed.
    Reused,
}

/// A workspace returned by [`WorkspaceIsolator::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedWorkspace {
    pub info: WorkspaceInfo,
    pub origin: WorkspaceOrigin,
}

impl CreatedWorkspace {
    pub fn path(&self) -> &Path {
        &self.info.path
    }
}

/// Creates and removes isolated workspaces for tasks.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorkspaceIsolator: Send + Sync {
    /// Root of the primary working copy.
    fn repo_root(&self) -> PathBuf;

    /// Project name derived from the primary working copy.
    fn project_name(&self) -> String;

    /// Where the worktree for `branch` lives (whether or not it exists).
    fn path_for(&self, branch: &str) -> PathBuf;

    /// Whether the primary working copy has no uncommitted changes.
    async fn primary_is_clean(&self) -> Result<bool, IsolationError>;

    /// Create a workspace for `branch`, reusing one that already exists.
    async fn create(&self, branch: &str) -> Result<CreatedWorkspace, IsolationError>;

    /// Remove the workspace at `path`. The branch is kept.
    async fn remove(&self, path: &Path) -> Result<(), IsolationError>;

    /// List all worktrees, primary first.
    async fn list(&self) -> Result<Vec<WorkspaceInfo>, IsolationError>;

    /// Find the worktree that has `branch` checked out.
    async fn get(&self, branch: &str) -> Result<Option<WorkspaceInfo>, IsolationError>;
}

/// Sanitize a branch name for use as a directory name.
///
/// Converts slashes to dashes and removes other problematic characters.
pub fn sanitize_branch_name(branch: &str) -> String {
    branch
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_whitespace() => '-',
            c => c,
        })
        .collect::<String>()
        .trim_matches('-')
        .to_string()
}

/// Generate a worktree directory path for a branch.
///
/// Creates a sibling directory to the repository root with the sanitized
/// branch name.
pub fn worktree_path_for_branch(repo_root: &Path, branch: &str, prefix: Option<&str>) -> PathBuf {
    let sanitized = sanitize_branch_name(branch);
    let dir_name = match prefix {
        Some(p) => format!("{}{}", p, sanitized),
        None => sanitized,
    };

    repo_root.parent().unwrap_or(repo_root).join(dir_name)
}

/// Parse `git worktree list --porcelain` output.
pub fn parse_worktree_list(output: &str, primary: &Path) -> Vec<WorkspaceInfo> {
    let mut worktrees = Vec::new();
    let mut current: Option<WorkspaceInfo> = None;

    for line in output.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            if let Some(done) = current.take() {
                worktrees.push(done);
            }
            let path = PathBuf::from(path);
            current = Some(WorkspaceInfo {
                is_primary: path == primary,
                path,
                branch: None,
                head: String::new(),
            });
        } else if let Some(wt) = current.as_mut() {
            if let Some(head) = line.strip_prefix("HEAD ") {
                wt.head = head.to_string();
            } else if let Some(branch) = line.strip_prefix("branch refs/heads/") {
                wt.branch = Some(branch.to_string());
            }
        }
    }

    if let Some(done) = current {
        worktrees.push(done);
    }
    worktrees
}
