// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Thin async wrapper over the `git` CLI for one working copy.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use super::IsolationError;
use crate::process::{run_command, Invocation, ProcessOutput};

/// Timeout for purely local git commands.
const LOCAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for commands that may touch the network or rewrite history.
const REMOTE_TIMEOUT: Duration = Duration::from_secs(300);

/// An in-progress history operation that can be aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GitOperation {
    Merge,
    Rebase,
}

impl GitOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Rebase => "rebase",
        }
    }
}

impl std::fmt::Display for GitOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a merge or rebase attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrationStep {
    /// Completed without conflicts.
    Clean,
    /// Stopped with conflicts; the operation is still in progress.
    Conflicted { files: Vec<String> },
}

/// A git working copy (primary repository or worktree).
#[derive(Debug, Clone)]
pub struct GitRepo {
    root: PathBuf,
}

impl GitRepo {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Discover the repository containing `dir`.
    pub async fn discover(dir: &Path) -> Result<Self, IsolationError> {
        let out = run_command(
            Invocation::new("git", &["rev-parse", "--show-toplevel"], LOCAL_TIMEOUT).cwd(dir),
        )
        .await?;
        if !out.success {
            return Err(IsolationError::NotARepository(dir.to_path_buf()));
        }
        Ok(Self::new(out.stdout_trimmed()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Root of the primary working copy, which differs from [`root`](Self::root)
    /// inside a linked worktree.
    pub async fn primary_root(&self) -> PathBuf {
        match self
            .git(&["rev-parse", "--path-format=absolute", "--git-common-dir"])
            .await
        {
            Ok(common) => {
                let common = PathBuf::from(common);
                match (common.file_name(), common.parent()) {
                    (Some(name), Some(parent)) if name == ".git" => parent.to_path_buf(),
                    _ => self.root.clone(),
                }
            }
            Err(_) => self.root.clone(),
        }
    }

    /// Repository name, taken from the root directory name.
    pub fn project_name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string())
    }

    async fn raw(&self, args: &[&str], timeout: Duration) -> Result<ProcessOutput, IsolationError> {
        Ok(run_command(Invocation::new("git", args, timeout).cwd(&self.root)).await?)
    }

    /// Run a local git command and return trimmed stdout.
    pub async fn git(&self, args: &[&str]) -> Result<String, IsolationError> {
        let out = self.raw(args, LOCAL_TIMEOUT).await?;
        if out.success {
            Ok(out.stdout_trimmed().to_string())
        } else {
            Err(IsolationError::Git(out.stderr.trim().to_string()))
        }
    }

    /// `git status --porcelain` output.
    pub async fn status_porcelain(&self) -> Result<String, IsolationError> {
        self.git(&["status", "--porcelain"]).await
    }

    /// Whether the working tree has no uncommitted changes.
    pub async fn is_clean(&self) -> Result<bool, IsolationError> {
        Ok(self.status_porcelain().await?.is_empty())
    }

    /// Number of changed (staged, unstaged, or untracked) files.
    pub async fn changed_file_count(&self) -> Result<usize, IsolationError> {
        Ok(self.status_porcelain().await?.lines().filter(|l| !l.is_empty()).count())
    }

    /// Current branch, or `None` on a detached HEAD.
    pub async fn current_branch(&self) -> Result<Option<String>, IsolationError> {
        let branch = self.git(&["branch", "--show-current"]).await?;
        Ok(if branch.is_empty() { None } else { Some(branch) })
    }

    /// Check if a branch exists locally.
    pub async fn branch_exists(&self, branch: &str) -> bool {
        let reference = format!("refs/heads/{branch}");
        self.git(&["rev-parse", "--verify", "--quiet", &reference])
            .await
            .is_ok()
    }

    /// Whether any remote is configured.
    pub async fn has_remote(&self) -> bool {
        matches!(self.git(&["remote"]).await, Ok(remotes) if !remotes.is_empty())
    }

    /// Whether the current branch tracks an upstream.
    pub async fn has_upstream(&self) -> bool {
        self.git(&["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"])
            .await
            .is_ok()
    }

    /// Fetch from all remotes.
    pub async fn fetch(&self) -> Result<(), IsolationError> {
        self.checked(&["fetch", "--all", "--prune"], REMOTE_TIMEOUT).await
    }

    /// Pull the current branch from its upstream.
    pub async fn pull(&self) -> Result<(), IsolationError> {
        self.checked(&["pull", "--no-rebase", "--no-edit"], REMOTE_TIMEOUT).await
    }

    pub async fn checkout(&self, branch: &str) -> Result<(), IsolationError> {
        self.checked(&["checkout", branch], LOCAL_TIMEOUT).await
    }

    async fn checked(&self, args: &[&str], timeout: Duration) -> Result<(), IsolationError> {
        let out = self.raw(args, timeout).await?;
        if out.success {
            Ok(())
        } else {
            Err(IsolationError::Git(out.stderr.trim().to_string()))
        }
    }

    /// Rebase the current branch onto `onto`.
    pub async fn rebase(&self, onto: &str) -> Result<IntegrationStep, IsolationError> {
        let out = self.raw(&["rebase", onto], REMOTE_TIMEOUT).await?;
        self.integration_step(GitOperation::Rebase, out).await
    }

    /// Merge `branch` into the current branch.
    pub async fn merge(&self, branch: &str) -> Result<IntegrationStep, IsolationError> {
        let out = self.raw(&["merge", "--no-edit", branch], REMOTE_TIMEOUT).await?;
        self.integration_step(GitOperation::Merge, out).await
    }

    async fn integration_step(
        &self,
        op: GitOperation,
        out: ProcessOutput,
    ) -> Result<IntegrationStep, IsolationError> {
        if out.success {
            return Ok(IntegrationStep::Clean);
        }
        if self.operation_in_progress(op).await {
            let files = self.unmerged_files().await.unwrap_or_default();
            debug!(operation = %op, conflicts = files.len(), "stopped on conflicts");
            return Ok(IntegrationStep::Conflicted { files });
        }
        let detail = if out.stderr.trim().is_empty() {
            out.stdout.trim().to_string()
        } else {
            out.stderr.trim().to_string()
        };
        Err(IsolationError::Git(format!("{op} failed: {detail}")))
    }

    /// Abort an in-progress merge or rebase.
    pub async fn abort(&self, op: GitOperation) -> Result<(), IsolationError> {
        let args = [op.as_str(), "--abort"];
        self.checked(&args, LOCAL_TIMEOUT).await
    }

    /// Whether `op` is still in progress in this working copy.
    pub async fn operation_in_progress(&self, op: GitOperation) -> bool {
        let markers: &[&str] = match op {
            GitOperation::Merge => &["MERGE_HEAD"],
            GitOperation::Rebase => &["rebase-merge", "rebase-apply"],
        };
        for marker in markers {
            // --git-path resolves per-worktree state directories correctly
            if let Ok(path) = self.git(&["rev-parse", "--git-path", marker]).await {
                if self.root.join(&path).exists() || Path::new(&path).exists() {
                    return true;
                }
            }
        }
        false
    }

    /// Files with unresolved conflicts.
    pub async fn unmerged_files(&self) -> Result<Vec<String>, IsolationError> {
        let out = self.git(&["diff", "--name-only", "--diff-filter=U"]).await?;
        Ok(out.lines().map(str::to_string).filter(|l| !l.is_empty()).collect())
    }

    /// Whether `ancestor` is reachable from HEAD.
    pub async fn is_ancestor_of_head(&self, ancestor: &str) -> bool {
        self.git(&["merge-base", "--is-ancestor", ancestor, "HEAD"])
            .await
            .is_ok()
    }

    /// Commits on HEAD that are not on `base` (one line each).
    pub async fn commits_ahead_of(&self, base: &str) -> Result<Vec<String>, IsolationError> {
        let range = format!("{base}..HEAD");
        match self.git(&["log", "--oneline", &range]).await {
            Ok(out) => Ok(out.lines().map(str::to_string).collect()),
            Err(_) => Ok(Vec::new()),
        }
    }
}
