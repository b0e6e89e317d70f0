// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::TempDir;

use worktree_task::config::ResolvedConfig;
use worktree_task::multiplexer::Multiplexer;
use worktree_task::workspace::{
    worktree_path_for_branch, CreatedWorkspace, IsolationError, WorkspaceInfo, WorkspaceIsolator,
    WorkspaceOrigin,
};
use worktree_task::TransportError;

/// Something written into a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Keys(String),
    Text(String),
}

#[derive(Debug, Clone)]
struct FakeSession {
    cwd: PathBuf,
    output: String,
    sent: Vec<Sent>,
}

type TextHook = Box<dyn Fn(&str, &Path, &str) + Send + Sync>;

/// Multiplexer keeping sessions in a map.
#[derive(Default)]
pub struct FakeMultiplexer {
    sessions: Mutex<BTreeMap<String, FakeSession>>,
    killed: Mutex<Vec<String>>,
    on_text: Option<TextHook>,
}

impl FakeMultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `hook(session, cwd, text)` whenever text is pasted.
    pub fn with_text_hook(mut self, hook: impl Fn(&str, &Path, &str) + Send + Sync + 'static) -> Self {
        self.on_text = Some(Box::new(hook));
        self
    }

    pub fn add_session(&self, name: &str, cwd: impl Into<PathBuf>, output: &str) {
        self.sessions.lock().unwrap().insert(
            name.to_string(),
            FakeSession {
                cwd: cwd.into(),
                output: output.to_string(),
                sent: Vec::new(),
            },
        );
    }

    pub fn set_output(&self, name: &str, output: &str) {
        if let Some(session) = self.sessions.lock().unwrap().get_mut(name) {
            session.output = output.to_string();
        }
    }

    pub fn session_names(&self) -> Vec<String> {
        self.sessions.lock().unwrap().keys().cloned().collect()
    }

    pub fn sent(&self, name: &str) -> Vec<Sent> {
        self.sessions
            .lock()
            .unwrap()
            .get(name)
            .map(|s| s.sent.clone())
            .unwrap_or_default()
    }

    pub fn texts(&self, name: &str) -> Vec<String> {
        self.sent(name)
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text(t) => Some(t),
                Sent::Keys(_) => None,
            })
            .collect()
    }

    pub fn killed(&self) -> Vec<String> {
        self.killed.lock().unwrap().clone()
    }

    fn missing(op: &str, name: &str) -> TransportError {
        TransportError::failed(op, format!("can't find session: {name}"))
    }
}

#[async_trait]
impl Multiplexer for FakeMultiplexer {
    async fn create_session(
        &self,
        name: &str,
        cwd: &Path,
        _command: Option<String>,
    ) -> Result<(), TransportError> {
        let mut sessions = self.sessions.lock().unwrap();
        if sessions.contains_key(name) {
            return Err(TransportError::failed("new-session", format!("duplicate session: {name}")));
        }
        sessions.insert(
            name.to_string(),
            FakeSession {
                cwd: cwd.to_path_buf(),
                output: String::new(),
                sent: Vec::new(),
            },
        );
        Ok(())
    }

    async fn send_keys(&self, name: &str, keys: &str) -> Result<(), TransportError> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(name)
            .ok_or_else(|| Self::missing("send-keys", name))?;
        session.sent.push(Sent::Keys(keys.to_string()));
        Ok(())
    }

    async fn send_text(&self, name: &str, text: &str) -> Result<(), TransportError> {
        let cwd = {
            let mut sessions = self.sessions.lock().unwrap();
            let session = sessions
                .get_mut(name)
                .ok_or_else(|| Self::missing("paste-buffer", name))?;
            session.sent.push(Sent::Text(text.to_string()));
            session.cwd.clone()
        };
        if let Some(hook) = &self.on_text {
            hook(name, &cwd, text);
        }
        Ok(())
    }

    async fn capture_pane(&self, name: &str, _lines: usize) -> Result<String, TransportError> {
        self.sessions
            .lock()
            .unwrap()
            .get(name)
            .map(|s| s.output.clone())
            .ok_or_else(|| Self::missing("capture-pane", name))
    }

    async fn list_sessions(&self) -> Result<Vec<String>, TransportError> {
        Ok(self.session_names())
    }

    async fn has_session(&self, name: &str) -> Result<bool, TransportError> {
        Ok(self.sessions.lock().unwrap().contains_key(name))
    }

    async fn kill_session(&self, name: &str) -> Result<(), TransportError> {
        self.sessions
            .lock()
            .unwrap()
            .remove(name)
            .ok_or_else(|| Self::missing("kill-session", name))?;
        self.killed.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn pane_current_path(&self, name: &str) -> Result<Option<PathBuf>, TransportError> {
        Ok(self.sessions.lock().unwrap().get(name).map(|s| s.cwd.clone()))
    }
}

/// Isolator keeping worktrees in a list; nothing touches the disk.
pub struct FakeIsolator {
    root: PathBuf,
    clean: Mutex<bool>,
    worktrees: Mutex<Vec<WorkspaceInfo>>,
}

impl FakeIsolator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let primary = WorkspaceInfo {
            path: root.clone(),
            branch: Some("main".to_string()),
            head: "0000000".to_string(),
            is_primary: true,
        };
        Self {
            root,
            clean: Mutex::new(true),
            worktrees: Mutex::new(vec![primary]),
        }
    }

    pub fn set_clean(&self, clean: bool) {
        *self.clean.lock().unwrap() = clean;
    }

    pub fn worktree_count(&self) -> usize {
        self.worktrees.lock().unwrap().len()
    }
}

#[async_trait]
impl WorkspaceIsolator for FakeIsolator {
    fn repo_root(&self) -> PathBuf {
        self.root.clone()
    }

    fn project_name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn path_for(&self, branch: &str) -> PathBuf {
        let prefix = format!("{}-", self.project_name());
        worktree_path_for_branch(&self.root, branch, Some(&prefix))
    }

    async fn primary_is_clean(&self) -> Result<bool, IsolationError> {
        Ok(*self.clean.lock().unwrap())
    }

    async fn create(&self, branch: &str) -> Result<CreatedWorkspace, IsolationError> {
        if let Some(existing) = self.get(branch).await? {
            return Ok(CreatedWorkspace {
                info: existing,
                origin: WorkspaceOrigin::Reused,
            });
        }
        let info = WorkspaceInfo {
            path: self.path_for(branch),
            branch: Some(branch.to_string()),
            head: "1111111".to_string(),
            is_primary: false,
        };
        self.worktrees.lock().unwrap().push(info.clone());
        Ok(CreatedWorkspace {
            info,
            origin: WorkspaceOrigin::NewBranch,
        })
    }

    async fn remove(&self, path: &Path) -> Result<(), IsolationError> {
        let mut worktrees = self.worktrees.lock().unwrap();
        let before = worktrees.len();
        worktrees.retain(|w| w.is_primary || w.path != path);
        if worktrees.len() == before {
            return Err(IsolationError::InvalidWorkspace(path.display().to_string()));
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<WorkspaceInfo>, IsolationError> {
        Ok(self.worktrees.lock().unwrap().clone())
    }

    async fn get(&self, branch: &str) -> Result<Option<WorkspaceInfo>, IsolationError> {
        Ok(self
            .worktrees
            .lock()
            .unwrap()
            .iter()
            .find(|w| w.branch.as_deref() == Some(branch))
            .cloned())
    }
}

/// Configuration with no delays and all state under `temp`.
pub fn test_config(temp: &TempDir) -> ResolvedConfig {
    ResolvedConfig {
        shell_init_delay_ms: 0,
        agent_start_delay_ms: 0,
        response_wait_ms: 0,
        resolution_poll_secs: 0,
        resolution_timeout_secs: 30,
        notifications: false,
        log_path: temp.path().join("logs").join("monitor.log"),
        state_dir: temp.path().join("state"),
        ..Default::default()
    }
}

/// Run git in `dir`, panicking on failure.
pub fn git(dir: &Path, args: &[&str]) {
    let out = std::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_EDITOR", "true")
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
}

/// Create `<temp>/<name>` as a repository with one commit on `main`.
pub fn init_repo(temp: &TempDir, name: &str) -> PathBuf {
    let root = temp.path().join(name);
    std::fs::create_dir(&root).unwrap();
    git(&root, &["init", "-q", "-b", "main"]);
    git(&root, &["config", "user.email", "test@example.com"]);
    git(&root, &["config", "user.name", "Test"]);
    git(&root, &["config", "commit.gpgsign", "false"]);
    std::fs::write(root.join("README.md"), "hello\n").unwrap();
    git(&root, &["add", "."]);
    git(&root, &["commit", "-q", "-m", "initial"]);
    root.canonicalize().unwrap()
}
