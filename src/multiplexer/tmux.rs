// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! tmux-backed [`Multiplexer`].
//!
//! Targets always use tmux's `=` exact-match prefix so `feat-a` never
//! resolves to a session named `feat-ab`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{tail_lines, Multiplexer};
use crate::error::TransportError;
use crate::process::{run_command, Invocation, ProcessOutput};

/// Default timeout for a single tmux call.
pub const DEFAULT_TMUX_TIMEOUT: Duration = Duration::from_secs(3);

/// Messages tmux prints when no server is running; treated as "no sessions".
const NO_SERVER_MARKERS: &[&str] = &["no server running", "error connecting to", "No such file or directory"];

/// Runs the `tmux` binary.
#[derive(Debug, Clone)]
pub struct TmuxClient {
    program: String,
    timeout: Duration,
}

impl Default for TmuxClient {
    fn default() -> Self {
        Self::new()
    }
}

impl TmuxClient {
    /// Create a client for the `tmux` on `PATH`.
    pub fn new() -> Self {
        Self {
            program: "tmux".to_string(),
            timeout: DEFAULT_TMUX_TIMEOUT,
        }
    }

    /// Set the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use a different tmux binary.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    async fn tmux(&self, args: &[&str]) -> Result<ProcessOutput, TransportError> {
        run_command(Invocation::new(&self.program, args, self.timeout)).await
    }

    async fn tmux_ok(&self, args: &[&str]) -> Result<String, TransportError> {
        let label = format!("tmux {}", args.first().copied().unwrap_or_default());
        let out = self.tmux(args).await?.into_result(&label)?;
        Ok(out.stdout)
    }
}

fn session_target(name: &str) -> String {
    format!("={name}")
}

fn pane_target(name: &str) -> String {
    format!("={name}:")
}

fn buffer_name(name: &str) -> String {
    format!("worktree-task-{name}")
}

fn is_no_server(stderr: &str) -> bool {
    NO_SERVER_MARKERS.iter().any(|m| stderr.contains(m))
}

#[async_trait]
impl Multiplexer for TmuxClient {
    async fn create_session(
        &self,
        name: &str,
        cwd: &Path,
        command: Option<String>,
    ) -> Result<(), TransportError> {
        let cwd = cwd.to_string_lossy();
        let mut args = vec!["new-session", "-d", "-s", name, "-c", cwd.as_ref()];
        if let Some(command) = command.as_deref() {
            args.push(command);
        }
        self.tmux_ok(&args).await.map(|_| ())
    }

    async fn send_keys(&self, name: &str, keys: &str) -> Result<(), TransportError> {
        let target = pane_target(name);
        self.tmux_ok(&["send-keys", "-t", &target, keys]).await.map(|_| ())
    }

    async fn send_text(&self, name: &str, text: &str) -> Result<(), TransportError> {
        // A named paste buffer avoids shell escaping and send-keys key-name parsing
        let buffer = buffer_name(name);
        let target = pane_target(name);
        let load_args = ["load-buffer", "-b", buffer.as_str(), "-"];
        let inv = Invocation::new(&self.program, &load_args, self.timeout).stdin(text);
        run_command(inv).await?.into_result("tmux load-buffer")?;
        self.tmux_ok(&["paste-buffer", "-d", "-b", &buffer, "-t", &target])
            .await
            .map(|_| ())
    }

    async fn capture_pane(&self, name: &str, lines: usize) -> Result<String, TransportError> {
        let target = pane_target(name);
        let start = format!("-{lines}");
        let raw = self
            .tmux_ok(&["capture-pane", "-p", "-J", "-t", &target, "-S", &start])
            .await?;
        Ok(tail_lines(&raw, lines))
    }

    async fn list_sessions(&self) -> Result<Vec<String>, TransportError> {
        let out = self.tmux(&["list-sessions", "-F", "#{session_name}"]).await?;
        if !out.success {
            if is_no_server(&out.stderr) {
                debug!("tmux server not running; no sessions");
                return Ok(Vec::new());
            }
            return Err(TransportError::failed("tmux list-sessions", out.stderr.trim()));
        }
        Ok(out
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn has_session(&self, name: &str) -> Result<bool, TransportError> {
        let target = session_target(name);
        let out = self.tmux(&["has-session", "-t", &target]).await?;
        Ok(out.success)
    }

    async fn kill_session(&self, name: &str) -> Result<(), TransportError> {
        let target = session_target(name);
        self.tmux_ok(&["kill-session", "-t", &target]).await.map(|_| ())
    }

    async fn pane_current_path(&self, name: &str) -> Result<Option<PathBuf>, TransportError> {
        let target = pane_target(name);
        let out = self
            .tmux_ok(&["display-message", "-p", "-t", &target, "#{pane_current_path}"])
            .await?;
        let path = out.trim();
        Ok(if path.is_empty() {
            None
        } else {
            Some(PathBuf::from(path))
        })
    }
}
