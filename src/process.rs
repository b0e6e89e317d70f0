// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Timeout-bounded execution of external programs.
//!
//! Every call into tmux, git, or a notifier goes through [`run_command`] so a
//! hung child can never block a monitoring pass.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::trace;

use crate::error::TransportError;

/// Captured result of a finished process.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// Whether the process exited with status 0.
    pub success: bool,
    /// Exit code, if the process was not killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// Trimmed stdout.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// Convert a non-zero exit into a [`TransportError::CommandFailed`].
    pub fn into_result(self, op: &str) -> Result<Self, TransportError> {
        if self.success {
            Ok(self)
        } else {
            let detail = if self.stderr.trim().is_empty() {
                format!("exit code {}", self.code.unwrap_or(-1))
            } else {
                self.stderr.trim().to_string()
            };
            Err(TransportError::failed(op, detail))
        }
    }
}

/// A program invocation.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub program: &'a str,
    pub args: &'a [&'a str],
    pub cwd: Option<&'a Path>,
    pub stdin: Option<&'a str>,
    pub timeout: Duration,
}

impl<'a> Invocation<'a> {
    pub fn new(program: &'a str, args: &'a [&'a str], timeout: Duration) -> Self {
        Self {
            program,
            args,
            cwd: None,
            stdin: None,
            timeout,
        }
    }

    pub fn cwd(mut self, cwd: &'a Path) -> Self {
        self.cwd = Some(cwd);
        self
    }

    pub fn stdin(mut self, input: &'a str) -> Self {
        self.stdin = Some(input);
        self
    }

    /// Short operation label used in errors, e.g. `tmux capture-pane`.
    pub fn label(&self) -> String {
        match self.args.first() {
            Some(sub) => format!("{} {}", self.program, sub),
            None => self.program.to_string(),
        }
    }
}

/// Run a program to completion, killing it if it outlives the timeout.
///
/// A non-zero exit is not an error here; callers decide what it means.
pub async fn run_command(inv: Invocation<'_>) -> Result<ProcessOutput, TransportError> {
    let label = inv.label();
    trace!(command = %label, args = ?inv.args, "running");

    let mut cmd = Command::new(inv.program);
    cmd.args(inv.args)
        .stdin(if inv.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = inv.cwd {
        cmd.current_dir(cwd);
    }

    let mut child = cmd.spawn().map_err(|source| TransportError::Spawn {
        program: inv.program.to_string(),
        source,
    })?;

    let input = inv.stdin.map(str::to_owned);
    let stdin = child.stdin.take();
    let run = async move {
        if let (Some(mut pipe), Some(input)) = (stdin, input) {
            pipe.write_all(input.as_bytes()).await?;
            pipe.shutdown().await?;
        }
        child.wait_with_output().await
    };

    match timeout(inv.timeout, run).await {
        Ok(Ok(output)) => Ok(ProcessOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }),
        Ok(Err(e)) => Err(TransportError::failed(label, e.to_string())),
        // The child future is dropped here, and kill_on_drop reaps the process
        Err(_) => Err(TransportError::Timeout {
            op: label,
            timeout_ms: inv.timeout.as_millis() as u64,
        }),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_success() {
        let out = run_command(Invocation::new("sh", &["-c", "echo hello"], Duration::from_secs(5)))
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(out.stdout_trimmed(), "hello");
    }

    #[tokio::test]
    async fn test_run_nonzero_is_not_error() {
        let out = run_command(Invocation::new("sh", &["-c", "echo oops >&2; exit 3"], Duration::from_secs(5)))
            .await
            .unwrap();
        assert!(!out.success);
        assert_eq!(out.code, Some(3));
        let err = out.into_result("sh -c").unwrap_err();
        assert!(format!("{}", err).contains("oops"));
    }

    #[tokio::test]
    async fn test_run_stdin() {
        let out = run_command(Invocation::new("cat", &[], Duration::from_secs(5)).stdin("piped text"))
            .await
            .unwrap();
        assert_eq!(out.stdout, "piped text");
    }

    #[tokio::test]
    async fn test_run_timeout() {
        let err = run_command(Invocation::new("sleep", &["5"], Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_run_missing_program() {
        let err = run_command(Invocation::new(
            "definitely-not-a-real-program-xyz",
            &[],
            Duration::from_secs(1),
        ))
        .await
        .unwrap_err();
        assert!(err.is_tool_missing());
    }
}
