// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Git worktree isolator.
//!
//! # Directory Structure
//!
//! ```text
//! /code/myapp/                  # Main repo
//! ├── .git/
//! └── ...
//!
//! /code/myapp-feature-auth/     # Task worktree (sibling directory)
//! ├── .git                      # Worktree link file
//! └── ...
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::git::GitRepo;
use super::{
    parse_worktree_list, worktree_path_for_branch, CreatedWorkspace, IsolationError,
    WorkspaceInfo, WorkspaceIsolator, WorkspaceOrigin,
};

/// Git worktree isolator rooted at the primary working copy.
pub struct GitWorktreeIsolator {
    repo: GitRepo,
    /// Prefix for worktree directories, `<project>-` by default.
    prefix: String,
}

impl GitWorktreeIsolator {
    /// Create an isolator for the repository at `repo_root`.
    pub fn new(repo_root: impl AsRef<Path>) -> Self {
        let repo = GitRepo::new(repo_root);
        let prefix = format!("{}-", repo.project_name());
        Self { repo, prefix }
    }

    /// Create an isolator for the repository containing `dir`, which may be
    /// the primary working copy or one of its worktrees.
    pub async fn discover(dir: &Path) -> Result<Self, IsolationError> {
        let repo = GitRepo::discover(dir).await?;
        Ok(Self::new(repo.primary_root().await))
    }

    /// Set a custom prefix for worktree directories.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Git plumbing for the primary working copy.
    pub fn repo(&self) -> &GitRepo {
        &self.repo
    }

    fn worktree_path(&self, branch: &str) -> PathBuf {
        worktree_path_for_branch(self.repo.root(), branch, Some(&self.prefix))
    }
}

#[async_trait]
impl WorkspaceIsolator for GitWorktreeIsolator {
    fn repo_root(&self) -> PathBuf {
        self.repo.root().to_path_buf()
    }

    fn project_name(&self) -> String {
        self.repo.project_name()
    }

    fn path_for(&self, branch: &str) -> PathBuf {
        self.worktree_path(branch)
    }

    async fn primary_is_clean(&self) -> Result<bool, IsolationError> {
        self.repo.is_clean().await
    }

    async fn create(&self, branch: &str) -> Result<CreatedWorkspace, IsolationError> {
        if let Some(existing) = self.get(branch).await? {
            if existing.is_primary {
                return Err(IsolationError::InvalidWorkspace(format!(
                    "branch '{}' is checked out in the primary working copy",
                    branch
                )));
            }
            info!(branch, path = %existing.path.display(), "reusing existing worktree");
            return Ok(CreatedWorkspace {
                info: existing,
                origin: WorkspaceOrigin::Reused,
            });
        }

        let worktree_path = self.worktree_path(branch);
        if worktree_path.exists() {
            return Err(IsolationError::InvalidWorkspace(format!(
                "Directory already exists: {}",
                worktree_path.display()
            )));
        }

        let path_str = worktree_path.to_string_lossy().to_string();
        let (result, origin) = if self.repo.branch_exists(branch).await {
            (
                self.repo.git(&["worktree", "add", &path_str, branch]).await,
                WorkspaceOrigin::ExistingBranch,
            )
        } else {
            (
                self.repo
                    .git(&["worktree", "add", "-b", branch, &path_str])
                    .await,
                WorkspaceOrigin::NewBranch,
            )
        };

        if let Err(e) = result {
            warn!(branch, error = %e, "failed to create worktree");
            return Err(IsolationError::WorktreeCreationFailed(e.to_string()));
        }

        info!(branch, path = %worktree_path.display(), ?origin, "created worktree");
        let head = GitRepo::new(&worktree_path)
            .git(&["rev-parse", "HEAD"])
            .await
            .unwrap_or_default();
        Ok(CreatedWorkspace {
            info: WorkspaceInfo {
                path: worktree_path,
                branch: Some(branch.to_string()),
                head,
                is_primary: false,
            },
            origin,
        })
    }

    async fn remove(&self, path: &Path) -> Result<(), IsolationError> {
        if path == self.repo.root() {
            return Err(IsolationError::InvalidWorkspace(
                "refusing to remove the primary working copy".to_string(),
            ));
        }
        info!(path = %path.display(), "removing worktree");

        let path_str = path.to_string_lossy().to_string();
        if let Err(e) = self
            .repo
            .git(&["worktree", "remove", "--force", &path_str])
            .await
        {
            warn!(error = %e, "failed to remove worktree via git");
            if path.exists() {
                std::fs::remove_dir_all(path)?;
            }
            let _ = self.repo.git(&["worktree", "prune"]).await;
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<WorkspaceInfo>, IsolationError> {
        let output = self.repo.git(&["worktree", "list", "--porcelain"]).await?;
        let mut list = parse_worktree_list(&output, self.repo.root());
        list.sort_by_key(|w| !w.is_primary);
        debug!(count = list.len(), "listed worktrees");
        Ok(list)
    }

    async fn get(&self, branch: &str) -> Result<Option<WorkspaceInfo>, IsolationError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|w| w.branch.as_deref() == Some(branch)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worktree_path() {
        let isolator = GitWorktreeIsolator::new("/workspace/project");
        let path = isolator.worktree_path("feat/auth");
        assert_eq!(path, PathBuf::from("/workspace/project-feat-auth"));
    }

    #[test]
    fn test_custom_prefix() {
        let isolator = GitWorktreeIsolator::new("/workspace/project").with_prefix("worker-");
        let path = isolator.worktree_path("feat/auth");
        assert_eq!(path, PathBuf::from("/workspace/worker-feat-auth"));
    }

    #[cfg(unix)]
    mod git_backed {
        use super::*;
        use crate::workspace::init_repo;
        use tempfile::TempDir;

        fn fixture() -> (TempDir, GitWorktreeIsolator) {
            let temp = TempDir::new().unwrap();
            let root = temp.path().join("myapp");
            std::fs::create_dir(&root).unwrap();
            init_repo(&root);
            let root = root.canonicalize().unwrap();
            (temp, GitWorktreeIsolator::new(root))
        }

        #[tokio::test]
        async fn test_create_new_then_reuse() {
            let (_temp, isolator) = fixture();

            let created = isolator.create("feature/auth").await.unwrap();
            assert_eq!(created.origin, WorkspaceOrigin::NewBranch);
            assert!(created.path().ends_with("myapp-feature-auth"));
            assert!(created.path().join("README.md").exists());

            let again = isolator.create("feature/auth").await.unwrap();
            assert_eq!(again.origin, WorkspaceOrigin::Reused);

            let list = isolator.list().await.unwrap();
            assert_eq!(list.len(), 2);
            assert!(list[0].is_primary);
        }

        #[tokio::test]
        async fn test_create_from_existing_branch() {
            let (_temp, isolator) = fixture();
            isolator.repo().git(&["branch", "fix/login"]).await.unwrap();

            let created = isolator.create("fix/login").await.unwrap();
            assert_eq!(created.origin, WorkspaceOrigin::ExistingBranch);
        }

        #[tokio::test]
        async fn test_remove_keeps_branch() {
            let (_temp, isolator) = fixture();
            let created = isolator.create("feature/x").await.unwrap();

            isolator.remove(created.path()).await.unwrap();
            assert!(!created.path().exists());
            assert!(isolator.get("feature/x").await.unwrap().is_none());
            assert!(isolator.repo().branch_exists("feature/x").await);
        }

        #[tokio::test]
        async fn test_discover_from_worktree_finds_primary() {
            let (_temp, isolator) = fixture();
            let created = isolator.create("feature/y").await.unwrap();

            let found = GitWorktreeIsolator::discover(created.path()).await.unwrap();
            assert_eq!(found.repo_root(), isolator.repo_root());
            assert_eq!(found.project_name(), "myapp");
        }

        #[tokio::test]
        async fn test_refuses_primary() {
            let (_temp, isolator) = fixture();
            assert!(isolator.create("main").await.is_err());
            assert!(isolator.remove(&isolator.repo_root()).await.is_err());
        }
    }
}
