// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Merge and rebase orchestration.
//!
//! Integration runs in two phases:
//!
//! 1. If the feature branch has its own worktree, rebase it onto the target
//!    there (after a fetch when a remote exists).
//! 2. In the primary working copy, check out the target, pull, then merge or
//!    rebase the feature branch.
//!
//! Conflicts in either phase are handed to a freshly spawned agent session
//! named after the operation. The orchestrator polls the repository until
//! the git operation finishes, running the stall monitor on the session at
//! every poll. A finished operation only counts if the branch it was meant
//! to bring in is reachable from HEAD. If the session exits, the resolution
//! window passes, or the operation ends without landing, the git operation
//! is aborted (when still in progress) and the last status is reported. A
//! pull that stops on conflicts is aborted the same way.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::controller::LifecycleController;
use super::prompt::ConflictPrompt;
use crate::error::{
    IntegrationError, PreconditionError, SupervisorError, SupervisorResult, TransportError,
};
use crate::multiplexer::send_message;
use crate::notify::notify_quietly;
use crate::supervise::{sink_for, JournalEvent, Monitor, RecoveryDispatcher};
use crate::workspace::{GitOperation, GitRepo, IntegrationStep, IsolationError};

/// Merge or rebase a feature branch into the current branch.
#[derive(Debug, Clone)]
pub struct IntegrationRequest {
    pub operation: GitOperation,
    pub feature: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Rebase the feature worktree onto the target.
    UpdateFeature,
    /// Merge or rebase in the primary working copy.
    Integrate,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpdateFeature => f.write_str("phase 1 (feature worktree)"),
            Self::Integrate => f.write_str("phase 2 (primary working copy)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseReport {
    pub phase: Phase,
    pub location: PathBuf,
    /// Session that resolved conflicts, if any were hit.
    pub resolved_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationReport {
    pub operation: GitOperation,
    pub feature: String,
    pub target: String,
    pub phases: Vec<PhaseReport>,
}

/// Why a phase did not finish.
enum Unresolved {
    SessionExited,
    TimedOut,
    /// The operation ended but the branch is not reachable from HEAD.
    NotIntegrated(String),
    PullConflicted,
}

impl fmt::Display for Unresolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionExited => f.write_str("resolution session exited"),
            Self::TimedOut => f.write_str("resolution timed out"),
            Self::NotIntegrated(branch) => {
                write!(f, "operation ended without integrating {branch}")
            }
            Self::PullConflicted => f.write_str("pull stopped on conflicts"),
        }
    }
}

struct Context<'a> {
    operation: GitOperation,
    feature: &'a str,
    target: &'a str,
    session: String,
    worktree: Option<&'a Path>,
}

fn git_error(err: IsolationError) -> SupervisorError {
    match err {
        IsolationError::Git(msg) => IntegrationError::Git(msg).into(),
        other => other.into(),
    }
}

fn continue_command(op: GitOperation) -> &'static str {
    match op {
        GitOperation::Merge => "git merge --continue",
        GitOperation::Rebase => "git rebase --continue",
    }
}

impl LifecycleController {
    /// Merge or rebase `request.feature` into the branch checked out in the
    /// primary working copy.
    ///
    /// All preconditions are checked before any git state changes. A failure
    /// after that aborts the in-progress operation.
    #[instrument(skip(self, request), fields(operation = %request.operation, feature = %request.feature, correlation_id = %self.correlation_id))]
    pub async fn integrate(&self, request: IntegrationRequest) -> SupervisorResult<IntegrationReport> {
        let operation = request.operation;
        let feature = request.feature.as_str();
        let primary = GitRepo::new(self.isolator.repo_root());

        let target = primary
            .current_branch()
            .await?
            .ok_or(PreconditionError::DetachedHead)?;
        if target == feature {
            return Err(PreconditionError::SameBranch(target).into());
        }
        if !primary.branch_exists(feature).await {
            return Err(PreconditionError::BranchNotFound(feature.to_string()).into());
        }
        if !primary.is_clean().await? {
            return Err(PreconditionError::DirtyWorkingTree(primary.root().to_path_buf()).into());
        }
        let worktree = self
            .isolator
            .get(feature)
            .await?
            .filter(|w| !w.is_primary)
            .map(|w| w.path);
        if let Some(path) = &worktree {
            if !GitRepo::new(path).is_clean().await? {
                return Err(PreconditionError::DirtyWorkingTree(path.clone()).into());
            }
        }
        let session = self.registry.resolve_integration(operation, feature, &target);
        if self.mux.has_session(&session).await? {
            return Err(PreconditionError::SessionExists(session).into());
        }

        let ctx = Context {
            operation,
            feature,
            target: &target,
            session,
            worktree: worktree.as_deref(),
        };
        info!(target = %target, worktree = ?worktree, "integration started");

        let result = self.run_phases(&primary, &ctx).await;
        let outcome = match &result {
            Ok(_) => "completed".to_string(),
            Err(e) => format!("aborted: {e}"),
        };
        self.record(JournalEvent::Integration {
            operation: operation.to_string(),
            feature: feature.to_string(),
            target: target.clone(),
            outcome: outcome.clone(),
        });
        if let Some(notifier) = &self.notifier {
            let title = format!("worktree-task {operation}");
            let body = match &result {
                Ok(_) => format!("{feature} integrated into {target}"),
                Err(_) => format!("{operation} of {feature} into {target} aborted"),
            };
            notify_quietly(notifier.as_ref(), &title, &body).await;
        }
        info!(outcome = %outcome, "integration finished");

        result.map(|phases| IntegrationReport {
            operation,
            feature: feature.to_string(),
            target,
            phases,
        })
    }

    async fn run_phases(
        &self,
        primary: &GitRepo,
        ctx: &Context<'_>,
    ) -> SupervisorResult<Vec<PhaseReport>> {
        let mut phases = Vec::new();

        if let Some(path) = ctx.worktree {
            let repo = GitRepo::new(path);
            if repo.has_remote().await {
                repo.fetch().await.map_err(git_error)?;
            }
            let step = repo.rebase(ctx.target).await.map_err(git_error)?;
            let resolved_by = self
                .settle(&repo, GitOperation::Rebase, Phase::UpdateFeature, step, ctx)
                .await?;
            phases.push(PhaseReport {
                phase: Phase::UpdateFeature,
                location: path.to_path_buf(),
                resolved_by,
            });
        }

        primary.checkout(ctx.target).await.map_err(git_error)?;
        if primary.has_upstream().await {
            if let Err(e) = primary.pull().await {
                if primary.operation_in_progress(GitOperation::Merge).await {
                    let reason = Unresolved::PullConflicted;
                    return Err(self
                        .abort(primary, GitOperation::Merge, Phase::Integrate, reason)
                        .await);
                }
                return Err(git_error(e));
            }
        }
        let step = match ctx.operation {
            GitOperation::Merge => primary.merge(ctx.feature).await,
            GitOperation::Rebase => primary.rebase(ctx.feature).await,
        }
        .map_err(git_error)?;
        let resolved_by = self
            .settle(primary, ctx.operation, Phase::Integrate, step, ctx)
            .await?;
        phases.push(PhaseReport {
            phase: Phase::Integrate,
            location: primary.root().to_path_buf(),
            resolved_by,
        });

        Ok(phases)
    }

    /// Turn a git step into a finished operation, delegating conflicts.
    async fn settle(
        &self,
        repo: &GitRepo,
        op: GitOperation,
        phase: Phase,
        step: IntegrationStep,
        ctx: &Context<'_>,
    ) -> SupervisorResult<Option<String>> {
        let files = match step {
            IntegrationStep::Clean => {
                debug!(%phase, "no conflicts");
                return Ok(None);
            }
            IntegrationStep::Conflicted { files } => files,
        };
        info!(%phase, conflicts = files.len(), session = %ctx.session, "delegating conflicts");

        let resolved = self.delegate(repo, op, phase, &files, ctx).await;
        if let Err(e) = self.mux.kill_session(&ctx.session).await {
            debug!(session = %ctx.session, error = %e, "could not kill resolution session");
        }
        match resolved {
            Ok(()) => Ok(Some(ctx.session.clone())),
            Err(reason) => Err(self.abort(repo, op, phase, reason).await),
        }
    }

    /// Spawn the resolution session and wait for the operation to finish.
    async fn delegate(
        &self,
        repo: &GitRepo,
        op: GitOperation,
        phase: Phase,
        files: &[String],
        ctx: &Context<'_>,
    ) -> Result<(), Unresolved> {
        let agent_command = self
            .config
            .agent_command(None)
            .unwrap_or_default()
            .to_string();
        let prompt = ConflictPrompt {
            operation: op.as_str(),
            feature: ctx.feature,
            target: ctx.target,
            location: repo.root(),
            worktree: ctx.worktree,
            files,
            continue_command: continue_command(op),
        }
        .render(self.config.template_dir.as_deref());

        // what HEAD must contain once the operation really landed
        let expected = match phase {
            Phase::UpdateFeature => ctx.target,
            Phase::Integrate => ctx.feature,
        };
        let session = ctx.session.as_str();
        let started = async {
            self.mux.create_session(session, repo.root(), None).await?;
            tokio::time::sleep(Duration::from_millis(self.config.shell_init_delay_ms)).await;
            send_message(self.mux.as_ref(), session, &agent_command).await?;
            tokio::time::sleep(Duration::from_millis(self.config.agent_start_delay_ms)).await;
            send_message(self.mux.as_ref(), session, &prompt).await?;
            Ok::<(), TransportError>(())
        };
        if let Err(e) = started.await {
            warn!(session, error = %e, "could not start resolution session");
            return Err(Unresolved::SessionExited);
        }
        self.remember(session, &prompt);

        let mut monitor = Monitor::new(
            self.registry.clone(),
            self.capture.clone(),
            self.classifier.clone(),
            RecoveryDispatcher::new(sink_for(&self.config, self.mux.clone())),
        )
        .with_correlation_id(self.correlation_id);
        if let Some(journal) = &self.journal {
            monitor = monitor.with_journal(journal.clone());
        }

        let spinner = self.spinner(format!("{phase}: waiting for {session} to resolve conflicts"));
        let poll = Duration::from_secs(self.config.resolution_poll_secs);
        let deadline = Instant::now() + Duration::from_secs(self.config.resolution_timeout_secs);
        let result = loop {
            tokio::time::sleep(poll).await;
            if self.resolved(repo, op).await {
                if repo.is_ancestor_of_head(expected).await {
                    break Ok(());
                }
                break Err(Unresolved::NotIntegrated(expected.to_string()));
            }
            match self.mux.has_session(session).await {
                Ok(true) => {}
                Ok(false) => break Err(Unresolved::SessionExited),
                Err(e) => debug!(session, error = %e, "could not check resolution session"),
            }
            if Instant::now() >= deadline {
                break Err(Unresolved::TimedOut);
            }
            let report = monitor.process_session(session, false).await;
            spinner.set_message(format!("{phase}: {report}"));
            spinner.tick();
        };
        spinner.finish_and_clear();
        result
    }

    async fn resolved(&self, repo: &GitRepo, op: GitOperation) -> bool {
        if repo.operation_in_progress(op).await {
            return false;
        }
        matches!(repo.unmerged_files().await, Ok(files) if files.is_empty())
    }

    async fn abort(
        &self,
        repo: &GitRepo,
        op: GitOperation,
        phase: Phase,
        reason: Unresolved,
    ) -> SupervisorError {
        let status = repo.status_porcelain().await.unwrap_or_default();
        warn!(%phase, %reason, operation = %op, "aborting");
        if repo.operation_in_progress(op).await {
            if let Err(e) = repo.abort(op).await {
                warn!(%phase, error = %e, "abort failed");
            }
        }
        IntegrationError::Conflict {
            phase: format!("{phase}: {reason}"),
            status,
        }
        .into()
    }

    fn spinner(&self, message: String) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message(message);
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner
    }
}
