// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Task lifecycle: launch, resume, cleanup and status.
//!
//! The controller owns the sessions and worktrees it creates. Task state is
//! never stored; every call re-derives it from the live session list and the
//! git worktree list.
//!
//! ```text
//! launch   ── check ──► create worktree ──► create session ──► start agent ──► prompt
//!                            ▲                      │ fails
//!                            └──── remove ◄─────────┘
//! resume   ── capture ──► classify ──► compose message ──► send ──► capture again
//! cleanup  ── find worktree ──► kill session ──► [remove worktree]
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::instructions::{InstructionStore, RETRY_FALLBACK};
use super::prompt::task_prompt;
use super::state::{Task, TaskState};
use crate::config::ResolvedConfig;
use crate::error::{ConfigError, PreconditionError, SupervisorResult};
use crate::multiplexer::{send_message, tail_lines, Multiplexer, OutputCapture};
use crate::notify::Notifier;
use crate::supervise::dispatcher::recovery_message;
use crate::supervise::{
    classify_resume, session_name, Classifier, Journal, JournalEvent, ResumeState,
    SessionRegistry, StallVerdict,
};
use crate::telemetry::CorrelationId;
use crate::workspace::{GitRepo, WorkspaceInfo, WorkspaceIsolator, WorkspaceOrigin};

/// Lines of output shown around a resume.
pub const RESUME_PREVIEW_LINES: usize = 15;

/// Lines of output shown by `status <session>`.
pub const STATUS_OUTPUT_LINES: usize = 30;

/// Commits listed by `status <session>`.
pub const STATUS_MAX_COMMITS: usize = 5;

/// Base the status view counts commits against.
const STATUS_BASE_REF: &str = "origin/HEAD";

/// Start a new task.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub branch: String,
    pub description: String,
    /// Agent name from the configured agent table; `None` uses the default.
    pub agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LaunchReport {
    pub task: Task,
    pub origin: WorkspaceOrigin,
}

/// Nudge an existing session.
#[derive(Debug, Clone, Default)]
pub struct ResumeRequest {
    pub session: String,
    /// Custom message; overrides everything else.
    pub message: Option<String>,
    /// Resend the last recorded instruction.
    pub retry: bool,
    /// Classify only.
    pub check: bool,
    /// Send the generic continue message when nothing else applies.
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// `--check`: nothing was sent.
    Checked,
    /// Nothing detected and nothing requested.
    NothingToDo,
    Sent { message: String },
}

#[derive(Debug, Clone)]
pub struct ResumeReport {
    pub session: String,
    pub state: ResumeState,
    pub verdict: StallVerdict,
    pub task_state: TaskState,
    pub before: String,
    pub after: Option<String>,
    pub outcome: ResumeOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub session: String,
    pub found: bool,
    pub worktree: Option<PathBuf>,
    pub worktree_removed: bool,
    /// Branch left behind; cleanup never deletes branches.
    pub branch: Option<String>,
    #[serde(skip)]
    pub remaining: Vec<WorkspaceInfo>,
}

/// Git facts about a session's working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSummary {
    pub branch: Option<String>,
    pub changed_files: usize,
    pub ahead: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SessionDetail {
    pub session: String,
    pub dir: Option<PathBuf>,
    pub git: Option<GitSummary>,
    /// `None` when the output could not be captured.
    pub verdict: Option<StallVerdict>,
    pub state: TaskState,
    pub output: String,
}

#[derive(Debug, Clone)]
pub enum StatusReport {
    Overview {
        sessions: Vec<String>,
        worktrees: Vec<WorkspaceInfo>,
    },
    Detail(SessionDetail),
}

/// Creates, nudges and tears down task sessions for one repository.
pub struct LifecycleController {
    pub(super) mux: Arc<dyn Multiplexer>,
    pub(super) isolator: Arc<dyn WorkspaceIsolator>,
    pub(super) registry: SessionRegistry,
    pub(super) capture: OutputCapture,
    pub(super) classifier: Arc<Classifier>,
    pub(super) config: ResolvedConfig,
    pub(super) journal: Option<Journal>,
    pub(super) instructions: InstructionStore,
    pub(super) notifier: Option<Arc<dyn Notifier>>,
    pub(super) show_progress: bool,
    pub(super) correlation_id: CorrelationId,
}

impl LifecycleController {
    pub fn new(
        mux: Arc<dyn Multiplexer>,
        isolator: Arc<dyn WorkspaceIsolator>,
        config: ResolvedConfig,
    ) -> Result<Self, ConfigError> {
        let project = isolator.project_name();
        let registry = SessionRegistry::from_config(mux.clone(), &project, &config)?;
        Ok(Self {
            capture: OutputCapture::new(mux.clone(), config.capture_lines),
            classifier: Arc::new(Classifier::new(&config.stall)),
            journal: Some(Journal::new(&config.log_path, config.log_max_bytes)),
            instructions: InstructionStore::new(config.state_dir.join("instructions")),
            notifier: None,
            show_progress: false,
            correlation_id: CorrelationId::new(),
            mux,
            isolator,
            registry,
            config,
        })
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Show a spinner while waiting on a conflict-resolution session.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn with_correlation_id(mut self, id: CorrelationId) -> Self {
        self.correlation_id = id;
        self
    }

    pub fn without_journal(mut self) -> Self {
        self.journal = None;
        self
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    pub(super) fn record(&self, event: JournalEvent) {
        if let Some(journal) = &self.journal {
            journal.record(self.correlation_id, event);
        }
    }

    pub(super) fn remember(&self, session: &str, instruction: &str) {
        if let Err(e) = self.instructions.save(session, instruction) {
            warn!(session, error = %e, "could not record instruction");
        }
    }

    /// Launch a task: worktree, session, agent, prompt.
    ///
    /// Every precondition is checked before anything is created. If the
    /// session cannot be created, a worktree made by this call is removed
    /// again.
    #[instrument(skip(self, request), fields(branch = %request.branch, correlation_id = %self.correlation_id))]
    pub async fn launch(&self, request: LaunchRequest) -> SupervisorResult<LaunchReport> {
        let agent = request
            .agent
            .clone()
            .unwrap_or_else(|| self.config.default_agent.clone());
        let agent_command = self
            .config
            .agent_command(Some(&agent))
            .ok_or_else(|| PreconditionError::UnknownAgent(agent.clone()))?
            .to_string();

        if !self.isolator.primary_is_clean().await? {
            return Err(PreconditionError::DirtyWorkingTree(self.isolator.repo_root()).into());
        }

        let session = self.registry.resolve(&request.branch);
        if self.mux.has_session(&session).await? {
            return Err(PreconditionError::SessionExists(session).into());
        }

        let workspace = self.isolator.create(&request.branch).await?;
        info!(session = %session, path = %workspace.path().display(), origin = ?workspace.origin, "workspace ready");

        if let Err(e) = self
            .mux
            .create_session(&session, workspace.path(), None)
            .await
        {
            if workspace.origin != WorkspaceOrigin::Reused {
                if let Err(cleanup) = self.isolator.remove(workspace.path()).await {
                    warn!(path = %workspace.path().display(), error = %cleanup, "could not roll back worktree");
                }
            }
            return Err(e.into());
        }

        let mut task = Task {
            project: self.registry.project().to_string(),
            branch: request.branch.clone(),
            description: request.description.clone(),
            agent_command: agent_command.clone(),
            session: session.clone(),
            worktree: workspace.path().to_path_buf(),
            state: TaskState::Created,
        };

        tokio::time::sleep(Duration::from_millis(self.config.shell_init_delay_ms)).await;
        send_message(self.mux.as_ref(), &session, &agent_command).await?;
        tokio::time::sleep(Duration::from_millis(self.config.agent_start_delay_ms)).await;

        let prompt = task_prompt(
            self.config.template_dir.as_deref(),
            &request.description,
            workspace.path(),
        );
        send_message(self.mux.as_ref(), &session, &prompt).await?;
        self.remember(&session, &prompt);

        if let Err(e) = task.advance(TaskState::Running) {
            warn!(error = %e, "unexpected task state");
        }
        self.record(JournalEvent::Launch {
            session: session.clone(),
            branch: request.branch,
            worktree: task.worktree.clone(),
            agent,
        });
        info!(session = %session, "task launched");

        Ok(LaunchReport {
            task,
            origin: workspace.origin,
        })
    }

    /// Inspect a session and, unless only checking, send it a message.
    ///
    /// Message priority: custom message, `--retry`, an actionable resume
    /// state, a stall reason, then `--force`.
    #[instrument(skip(self, request), fields(session = %request.session, correlation_id = %self.correlation_id))]
    pub async fn resume(&self, request: ResumeRequest) -> SupervisorResult<ResumeReport> {
        let session = request.session.as_str();
        if !self.mux.has_session(session).await? {
            return Err(PreconditionError::SessionNotFound(session.to_string()).into());
        }

        let text = self.capture.capture(session).await.unwrap_or_default();
        let state = classify_resume(&text);
        let verdict = self.classifier.classify(&text);
        let before = tail_lines(&text, RESUME_PREVIEW_LINES);
        debug!(state = %state, verdict = %verdict, "classified session");

        let mut report = ResumeReport {
            session: session.to_string(),
            state,
            task_state: TaskState::observe(true, Some(&verdict)),
            verdict,
            before,
            after: None,
            outcome: ResumeOutcome::Checked,
        };
        if request.check {
            return Ok(report);
        }

        let message = match self.compose(&request, state, &report.verdict) {
            Some(message) => message,
            None => {
                info!("nothing to resume");
                report.outcome = ResumeOutcome::NothingToDo;
                return Ok(report);
            }
        };

        send_message(self.mux.as_ref(), session, &message).await?;
        self.remember(session, &message);
        info!(state = %state, retry = request.retry, "resume message sent");

        tokio::time::sleep(Duration::from_millis(self.config.response_wait_ms)).await;
        report.after = self
            .capture
            .capture_lines(session, RESUME_PREVIEW_LINES)
            .await;
        if report.task_state == TaskState::Stalled {
            report.task_state = TaskState::Retried;
        }

        self.record(JournalEvent::Resume {
            session: session.to_string(),
            state: state.as_str().to_string(),
            retry: request.retry,
        });
        report.outcome = ResumeOutcome::Sent { message };
        Ok(report)
    }

    fn compose(
        &self,
        request: &ResumeRequest,
        state: ResumeState,
        verdict: &StallVerdict,
    ) -> Option<String> {
        if let Some(message) = request.message.as_ref().filter(|m| !m.trim().is_empty()) {
            return Some(message.clone());
        }
        if request.retry {
            return Some(
                self.instructions
                    .load(&request.session)
                    .unwrap_or_else(|| RETRY_FALLBACK.to_string()),
            );
        }
        if state.is_actionable() {
            return Some(state.message().to_string());
        }
        if let Some(reason) = verdict.reason() {
            return Some(recovery_message(reason).to_string());
        }
        request
            .force
            .then(|| ResumeState::Unknown.message().to_string())
    }

    /// Terminate a session and optionally remove its worktree.
    ///
    /// A session that does not exist is reported, not an error. The branch
    /// is always kept.
    #[instrument(skip(self), fields(correlation_id = %self.correlation_id))]
    pub async fn cleanup(
        &self,
        session: &str,
        remove_worktree: bool,
    ) -> SupervisorResult<CleanupReport> {
        let found = self.mux.has_session(session).await?;
        // looked up before the kill; the pane path is gone afterwards
        let worktree = self.find_worktree(session, found).await?;

        if found {
            self.mux.kill_session(session).await?;
            info!(session, "session terminated");
        } else {
            info!(session, "session not found");
        }

        let mut worktree_removed = false;
        if remove_worktree {
            if let Some(info) = &worktree {
                self.isolator.remove(&info.path).await?;
                worktree_removed = true;
                info!(path = %info.path.display(), "worktree removed");
            }
        }

        if let Err(e) = self.instructions.forget(session) {
            debug!(session, error = %e, "could not forget instruction");
        }

        let remaining = self.isolator.list().await?;
        self.record(JournalEvent::Cleanup {
            session: session.to_string(),
            found,
            worktree_removed,
        });

        Ok(CleanupReport {
            session: session.to_string(),
            found,
            worktree: worktree.as_ref().map(|w| w.path.clone()),
            branch: worktree.and_then(|w| w.branch),
            worktree_removed,
            remaining,
        })
    }

    /// Worktree the live session's pane is sitting in, or failing that the
    /// one at the canonical path of a branch whose name maps to `session`.
    ///
    /// Distinct branches can normalise to the same session name, so the
    /// branch match also requires the worktree to be where that branch's
    /// worktree would be created.
    async fn find_worktree(
        &self,
        session: &str,
        alive: bool,
    ) -> SupervisorResult<Option<WorkspaceInfo>> {
        let worktrees: Vec<WorkspaceInfo> = self
            .isolator
            .list()
            .await?
            .into_iter()
            .filter(|w| !w.is_primary)
            .collect();

        if alive {
            match self.mux.pane_current_path(session).await {
                Ok(Some(dir)) => {
                    if let Some(found) = worktrees.iter().find(|w| dir.starts_with(&w.path)) {
                        return Ok(Some(found.clone()));
                    }
                }
                Ok(None) => {}
                Err(e) => debug!(session, error = %e, "could not read pane path"),
            }
        }

        let project = self.registry.project();
        let scheme = self.registry.scheme();
        Ok(worktrees.into_iter().find(|w| {
            w.branch.as_deref().is_some_and(|b| {
                session_name(project, b, scheme) == session && w.path == self.isolator.path_for(b)
            })
        }))
    }

    /// Overview of all sessions and worktrees, or detail for one session.
    #[instrument(skip(self))]
    pub async fn status(&self, session: Option<&str>) -> SupervisorResult<StatusReport> {
        let Some(session) = session else {
            return Ok(StatusReport::Overview {
                sessions: self.registry.discover().await?,
                worktrees: self.isolator.list().await?,
            });
        };

        if !self.mux.has_session(session).await? {
            return Err(PreconditionError::SessionNotFound(session.to_string()).into());
        }

        let dir = match self.mux.pane_current_path(session).await {
            Ok(dir) => dir,
            Err(e) => {
                debug!(session, error = %e, "could not read pane path");
                None
            }
        };
        let git = match &dir {
            Some(dir) => git_summary(dir).await,
            None => None,
        };
        let text = self.capture.capture(session).await;
        let verdict = text.as_deref().map(|t| self.classifier.classify(t));

        Ok(StatusReport::Detail(SessionDetail {
            session: session.to_string(),
            state: TaskState::observe(true, verdict.as_ref()),
            output: text
                .as_deref()
                .map(|t| tail_lines(t, STATUS_OUTPUT_LINES))
                .unwrap_or_default(),
            dir,
            git,
            verdict,
        }))
    }
}

async fn git_summary(dir: &Path) -> Option<GitSummary> {
    let repo = GitRepo::discover(dir).await.ok()?;
    let branch = repo.current_branch().await.ok().flatten();
    let changed_files = repo.changed_file_count().await.unwrap_or(0);
    let mut ahead = repo.commits_ahead_of(STATUS_BASE_REF).await.unwrap_or_default();
    ahead.truncate(STATUS_MAX_COMMITS);
    Some(GitSummary {
        branch,
        changed_files,
        ahead,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{SupervisorError, TransportError};
    use crate::multiplexer::MockMultiplexer;
    use crate::workspace::{worktree_path_for_branch, CreatedWorkspace, MockWorkspaceIsolator};
    use tempfile::TempDir;

    fn config(temp: &TempDir) -> ResolvedConfig {
        ResolvedConfig {
            shell_init_delay_ms: 0,
            agent_start_delay_ms: 0,
            response_wait_ms: 0,
            log_path: temp.path().join("monitor.log"),
            state_dir: temp.path().join("state"),
            ..Default::default()
        }
    }

    fn isolator() -> MockWorkspaceIsolator {
        let mut isolator = MockWorkspaceIsolator::new();
        isolator
            .expect_project_name()
            .return_const("myapp".to_string());
        isolator
            .expect_repo_root()
            .return_const(PathBuf::from("/code/myapp"));
        isolator.expect_path_for().returning(|branch| {
            worktree_path_for_branch(Path::new("/code/myapp"), branch, Some("myapp-"))
        });
        isolator
    }

    fn worktree(branch: &str, path: &str) -> WorkspaceInfo {
        WorkspaceInfo {
            path: PathBuf::from(path),
            branch: Some(branch.to_string()),
            head: "abc123".to_string(),
            is_primary: false,
        }
    }

    fn primary() -> WorkspaceInfo {
        WorkspaceInfo {
            path: PathBuf::from("/code/myapp"),
            branch: Some("main".to_string()),
            head: "abc123".to_string(),
            is_primary: true,
        }
    }

    fn controller(
        mux: MockMultiplexer,
        isolator: MockWorkspaceIsolator,
        temp: &TempDir,
    ) -> LifecycleController {
        LifecycleController::new(Arc::new(mux), Arc::new(isolator), config(temp)).unwrap()
    }

    fn request(branch: &str) -> LaunchRequest {
        LaunchRequest {
            branch: branch.to_string(),
            description: "Implement the proxy".to_string(),
            agent: None,
        }
    }

    #[tokio::test]
    async fn test_launch_dirty_tree_creates_nothing() {
        let temp = TempDir::new().unwrap();
        let mut isolator = isolator();
        isolator.expect_primary_is_clean().returning(|| Ok(false));
        isolator.expect_create().times(0);
        let mut mux = MockMultiplexer::new();
        mux.expect_create_session().times(0);
        mux.expect_has_session().times(0);

        let err = controller(mux, isolator, &temp)
            .launch(request("feature/x"))
            .await
            .unwrap_err();
        assert!(err.is_precondition());
        assert!(matches!(
            err,
            SupervisorError::Precondition(PreconditionError::DirtyWorkingTree(_))
        ));
    }

    #[tokio::test]
    async fn test_launch_starts_agent_then_prompt() {
        let temp = TempDir::new().unwrap();
        let mut isolator = isolator();
        isolator.expect_primary_is_clean().returning(|| Ok(true));
        isolator
            .expect_create()
            .withf(|branch| branch.to_string() == "feature/x")
            .times(1)
            .returning(|_| {
                Ok(CreatedWorkspace {
                    info: worktree("feature/x", "/code/myapp-feature-x"),
                    origin: WorkspaceOrigin::NewBranch,
                })
            });

        let mut mux = MockMultiplexer::new();
        mux.expect_has_session().returning(|_| Ok(false));
        mux.expect_create_session()
            .withf(|name, cwd, command| {
                name.to_string() == "myapp-feature-x"
                    && cwd.to_path_buf() == PathBuf::from("/code/myapp-feature-x")
                    && command.is_none()
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        let mut seq = mockall::Sequence::new();
        mux.expect_send_text()
            .withf(|_, text| text.to_string() == "claude --dangerously-skip-permissions")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        mux.expect_send_text()
            .withf(|_, text| text.contains("Implement the proxy"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        mux.expect_send_keys()
            .withf(|name, keys| name.to_string() == "myapp-feature-x" && keys.to_string() == "Enter")
            .times(2)
            .returning(|_, _| Ok(()));

        let controller = controller(mux, isolator, &temp);
        let report = controller.launch(request("feature/x")).await.unwrap();
        assert_eq!(report.task.session, "myapp-feature-x");
        assert_eq!(report.task.state, TaskState::Running);
        assert_eq!(report.origin, WorkspaceOrigin::NewBranch);

        let saved = controller.instructions.load("myapp-feature-x").unwrap();
        assert!(saved.contains("/code/myapp-feature-x"));

        let entries = controller.journal.as_ref().unwrap().read_entries().unwrap();
        assert!(matches!(
            &entries[0].event,
            JournalEvent::Launch { agent, .. } if agent == "claude"
        ));
    }

    #[tokio::test]
    async fn test_launch_refuses_existing_session() {
        let temp = TempDir::new().unwrap();
        let mut isolator = isolator();
        isolator.expect_primary_is_clean().returning(|| Ok(true));
        isolator.expect_create().times(0);
        let mut mux = MockMultiplexer::new();
        mux.expect_has_session().returning(|_| Ok(true));

        let err = controller(mux, isolator, &temp)
            .launch(request("feature/x"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SupervisorError::Precondition(PreconditionError::SessionExists(ref s)) if s == "myapp-feature-x"
        ));
    }

    #[tokio::test]
    async fn test_launch_rolls_back_worktree_when_session_fails() {
        let temp = TempDir::new().unwrap();
        let mut isolator = isolator();
        isolator.expect_primary_is_clean().returning(|| Ok(true));
        isolator.expect_create().returning(|_| {
            Ok(CreatedWorkspace {
                info: worktree("feature/x", "/code/myapp-feature-x"),
                origin: WorkspaceOrigin::NewBranch,
            })
        });
        isolator
            .expect_remove()
            .withf(|path| path.to_path_buf() == PathBuf::from("/code/myapp-feature-x"))
            .times(1)
            .returning(|_| Ok(()));
        let mut mux = MockMultiplexer::new();
        mux.expect_has_session().returning(|_| Ok(false));
        mux.expect_create_session()
            .returning(|_, _, _| Err(TransportError::failed("tmux new-session", "no server")));
        mux.expect_send_text().times(0);

        let err = controller(mux, isolator, &temp)
            .launch(request("feature/x"))
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::Transport(_)));
    }

    #[tokio::test]
    async fn test_launch_unknown_agent() {
        let temp = TempDir::new().unwrap();
        let mut isolator = isolator();
        isolator.expect_primary_is_clean().times(0);
        let mux = MockMultiplexer::new();

        let mut req = request("feature/x");
        req.agent = Some("nope".to_string());
        let err = controller(mux, isolator, &temp).launch(req).await.unwrap_err();
        assert!(matches!(
            err,
            SupervisorError::Precondition(PreconditionError::UnknownAgent(_))
        ));
    }

    fn mux_showing(text: &'static str) -> MockMultiplexer {
        let mut mux = MockMultiplexer::new();
        mux.expect_has_session().returning(|_| Ok(true));
        mux.expect_capture_pane()
            .returning(move |_, _| Ok(text.to_string()));
        mux
    }

    fn resume(session: &str) -> ResumeRequest {
        ResumeRequest {
            session: session.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_resume_missing_session() {
        let temp = TempDir::new().unwrap();
        let mut mux = MockMultiplexer::new();
        mux.expect_has_session().returning(|_| Ok(false));

        let err = controller(mux, isolator(), &temp)
            .resume(resume("myapp-gone"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SupervisorError::Precondition(PreconditionError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_resume_check_sends_nothing() {
        let temp = TempDir::new().unwrap();
        let mut mux = mux_showing("API Error: 429 rate_limit_error");
        mux.expect_send_text().times(0);

        let mut req = resume("myapp-feature-x");
        req.check = true;
        let report = controller(mux, isolator(), &temp).resume(req).await.unwrap();
        assert_eq!(report.state, ResumeState::RateLimit);
        assert_eq!(report.task_state, TaskState::Stalled);
        assert_eq!(report.outcome, ResumeOutcome::Checked);
    }

    #[tokio::test]
    async fn test_resume_rate_limit_sends_canned_message() {
        let temp = TempDir::new().unwrap();
        let mut mux = mux_showing("API Error: 429 rate_limit_error");
        mux.expect_send_text()
            .withf(|_, text| text.to_string() == ResumeState::RateLimit.message())
            .times(1)
            .returning(|_, _| Ok(()));
        mux.expect_send_keys().times(1).returning(|_, _| Ok(()));

        let controller = controller(mux, isolator(), &temp);
        let report = controller.resume(resume("myapp-feature-x")).await.unwrap();
        assert_eq!(report.task_state, TaskState::Retried);
        assert!(report.after.is_some());
        assert_eq!(
            controller.instructions.load("myapp-feature-x").as_deref(),
            Some(ResumeState::RateLimit.message())
        );
    }

    #[tokio::test]
    async fn test_resume_nothing_to_do() {
        let temp = TempDir::new().unwrap();
        let mut mux = mux_showing("✻ Thinking… (esc to interrupt)");
        mux.expect_send_text().times(0);

        let report = controller(mux, isolator(), &temp)
            .resume(resume("myapp-feature-x"))
            .await
            .unwrap();
        assert_eq!(report.outcome, ResumeOutcome::NothingToDo);
        assert_eq!(report.task_state, TaskState::Running);
    }

    #[tokio::test]
    async fn test_resume_force_and_custom_message() {
        let temp = TempDir::new().unwrap();
        let mut mux = mux_showing("✻ Thinking… (esc to interrupt)");
        mux.expect_send_text()
            .withf(|_, text| text.to_string() == ResumeState::Unknown.message())
            .times(1)
            .returning(|_, _| Ok(()));
        mux.expect_send_text()
            .withf(|_, text| text.to_string() == "run the tests")
            .times(1)
            .returning(|_, _| Ok(()));
        mux.expect_send_keys().times(2).returning(|_, _| Ok(()));
        let controller = controller(mux, isolator(), &temp);

        let mut req = resume("myapp-feature-x");
        req.force = true;
        controller.resume(req).await.unwrap();

        let mut req = resume("myapp-feature-x");
        req.message = Some("run the tests".to_string());
        let report = controller.resume(req).await.unwrap();
        assert_eq!(
            report.outcome,
            ResumeOutcome::Sent {
                message: "run the tests".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_resume_retry_resends_recorded_instruction() {
        let temp = TempDir::new().unwrap();
        let mut mux = mux_showing("✻ Thinking… (esc to interrupt)");
        mux.expect_send_text()
            .withf(|_, text| text.to_string() == "finish phase 3")
            .times(1)
            .returning(|_, _| Ok(()));
        mux.expect_send_text()
            .withf(|_, text| text.to_string() == RETRY_FALLBACK)
            .times(1)
            .returning(|_, _| Ok(()));
        mux.expect_send_keys().times(2).returning(|_, _| Ok(()));
        let controller = controller(mux, isolator(), &temp);
        controller
            .instructions
            .save("myapp-feature-x", "finish phase 3")
            .unwrap();

        let mut req = resume("myapp-feature-x");
        req.retry = true;
        controller.resume(req).await.unwrap();

        let mut req = resume("myapp-other");
        req.retry = true;
        controller.resume(req).await.unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_not_found_is_ok() {
        let temp = TempDir::new().unwrap();
        let mut mux = MockMultiplexer::new();
        mux.expect_has_session().returning(|_| Ok(false));
        mux.expect_kill_session().times(0);
        let mut isolator = isolator();
        isolator.expect_list().returning(|| Ok(vec![primary()]));
        isolator.expect_remove().times(0);

        let report = controller(mux, isolator, &temp)
            .cleanup("myapp-nope", true)
            .await
            .unwrap();
        assert!(!report.found);
        assert!(!report.worktree_removed);
        assert_eq!(report.remaining.len(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_worktree_by_default() {
        let temp = TempDir::new().unwrap();
        let mut mux = MockMultiplexer::new();
        mux.expect_has_session().returning(|_| Ok(true));
        mux.expect_pane_current_path()
            .returning(|_| Ok(Some(PathBuf::from("/code/myapp-feature-x"))));
        mux.expect_kill_session()
            .withf(|name| name.to_string() == "myapp-feature-x")
            .times(1)
            .returning(|_| Ok(()));
        let mut isolator = isolator();
        isolator
            .expect_list()
            .returning(|| Ok(vec![primary(), worktree("feature/x", "/code/myapp-feature-x")]));
        isolator.expect_remove().times(0);

        let report = controller(mux, isolator, &temp)
            .cleanup("myapp-feature-x", false)
            .await
            .unwrap();
        assert!(report.found);
        assert_eq!(report.branch.as_deref(), Some("feature/x"));
        assert_eq!(report.worktree, Some(PathBuf::from("/code/myapp-feature-x")));
        assert!(!report.worktree_removed);
    }

    #[tokio::test]
    async fn test_cleanup_removes_worktree_found_by_pane_path() {
        let temp = TempDir::new().unwrap();
        let mut mux = MockMultiplexer::new();
        mux.expect_has_session().returning(|_| Ok(true));
        mux.expect_pane_current_path()
            .returning(|_| Ok(Some(PathBuf::from("/code/myapp-renamed/src"))));
        mux.expect_kill_session().times(1).returning(|_| Ok(()));
        let mut isolator = isolator();
        isolator
            .expect_list()
            .returning(|| Ok(vec![primary(), worktree("feature/y", "/code/myapp-renamed")]));
        isolator
            .expect_remove()
            .withf(|path| path.to_path_buf() == PathBuf::from("/code/myapp-renamed"))
            .times(1)
            .returning(|_| Ok(()));

        let report = controller(mux, isolator, &temp)
            .cleanup("custom-session", true)
            .await
            .unwrap();
        assert!(report.worktree_removed);
        assert_eq!(report.branch.as_deref(), Some("feature/y"));
    }

    fn colliding_worktrees() -> Vec<WorkspaceInfo> {
        // both branches normalise to the session name `myapp-feat-a`
        vec![
            primary(),
            worktree("feat.a", "/code/myapp-feat.a"),
            worktree("feat-a", "/code/myapp-feat-a"),
        ]
    }

    #[tokio::test]
    async fn test_cleanup_prefers_pane_path_over_colliding_branch() {
        let temp = TempDir::new().unwrap();
        let mut mux = MockMultiplexer::new();
        mux.expect_has_session().returning(|_| Ok(true));
        mux.expect_pane_current_path()
            .returning(|_| Ok(Some(PathBuf::from("/code/myapp-feat-a"))));
        mux.expect_kill_session().times(1).returning(|_| Ok(()));
        let mut isolator = isolator();
        isolator.expect_list().returning(|| Ok(colliding_worktrees()));
        isolator
            .expect_remove()
            .withf(|path| path.to_path_buf() == PathBuf::from("/code/myapp-feat-a"))
            .times(1)
            .returning(|_| Ok(()));

        let report = controller(mux, isolator, &temp)
            .cleanup("myapp-feat-a", true)
            .await
            .unwrap();
        assert!(report.worktree_removed);
        assert_eq!(report.branch.as_deref(), Some("feat-a"));
    }

    #[tokio::test]
    async fn test_cleanup_of_dead_session_matches_canonical_worktree_path() {
        let temp = TempDir::new().unwrap();
        let mut mux = MockMultiplexer::new();
        mux.expect_has_session().returning(|_| Ok(false));
        mux.expect_pane_current_path().times(0);
        mux.expect_kill_session().times(0);
        let mut isolator = isolator();
        isolator.expect_list().returning(|| Ok(colliding_worktrees()));
        isolator
            .expect_remove()
            .withf(|path| path.to_path_buf() == PathBuf::from("/code/myapp-feat-a"))
            .times(1)
            .returning(|_| Ok(()));

        let report = controller(mux, isolator, &temp)
            .cleanup("myapp-feat-a", true)
            .await
            .unwrap();
        assert!(!report.found);
        assert_eq!(report.worktree, Some(PathBuf::from("/code/myapp-feat-a")));
        assert_eq!(report.branch.as_deref(), Some("feat-a"));
    }

    #[tokio::test]
    async fn test_status_overview_and_missing_session() {
        let temp = TempDir::new().unwrap();
        let mut mux = MockMultiplexer::new();
        mux.expect_list_sessions()
            .returning(|| Ok(vec!["myapp-feature-x".to_string(), "scratch".to_string()]));
        mux.expect_has_session().returning(|_| Ok(false));
        let mut isolator = isolator();
        isolator.expect_list().returning(|| Ok(vec![primary()]));
        let controller = controller(mux, isolator, &temp);

        match controller.status(None).await.unwrap() {
            StatusReport::Overview { sessions, worktrees } => {
                assert_eq!(sessions, vec!["myapp-feature-x".to_string()]);
                assert_eq!(worktrees.len(), 1);
            }
            other => panic!("unexpected report: {other:?}"),
        }
        assert!(controller.status(Some("myapp-gone")).await.is_err());
    }

    #[tokio::test]
    async fn test_status_detail() {
        let temp = TempDir::new().unwrap();
        let mut mux = mux_showing("attempt 6/10");
        mux.expect_pane_current_path().returning(|_| Ok(None));

        match controller(mux, isolator(), &temp)
            .status(Some("myapp-feature-x"))
            .await
            .unwrap()
        {
            StatusReport::Detail(detail) => {
                assert_eq!(detail.state, TaskState::Stalled);
                assert!(detail.git.is_none());
                assert_eq!(detail.output, "attempt 6/10");
            }
            other => panic!("unexpected report: {other:?}"),
        }
    }
}
