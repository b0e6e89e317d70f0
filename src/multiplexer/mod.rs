// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Terminal multiplexer abstraction.
//!
//! Agent sessions live in tmux. Everything the supervisor does to a session
//! goes through the [`Multiplexer`] trait so the monitor and lifecycle code can
//! be driven by an in-memory fake in tests.
//!
//! - [`TmuxClient`]: the real implementation, one `tmux` process per call,
//!   each bounded by a timeout.
//! - [`OutputCapture`]: read-only adapter returning a bounded tail of a
//!   session's output, or nothing when the session cannot be read.

mod capture;
mod tmux;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::TransportError;

pub use capture::OutputCapture;
pub use tmux::TmuxClient;

/// Operations the supervisor needs from a terminal multiplexer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Multiplexer: Send + Sync {
    /// Create a detached session rooted at `cwd`, optionally running `command`.
    async fn create_session(
        &self,
        name: &str,
        cwd: &Path,
        command: Option<String>,
    ) -> Result<(), TransportError>;

    /// Send key names (e.g. `Enter`, `C-c`, `y`) to the session's active pane.
    async fn send_keys(&self, name: &str, keys: &str) -> Result<(), TransportError>;

    /// Paste literal text into the session's active pane without confirming it.
    async fn send_text(&self, name: &str, text: &str) -> Result<(), TransportError>;

    /// Capture the last `lines` lines of the session's active pane.
    async fn capture_pane(&self, name: &str, lines: usize) -> Result<String, TransportError>;

    /// List the names of all live sessions.
    async fn list_sessions(&self) -> Result<Vec<String>, TransportError>;

    /// Check whether a session with exactly this name exists.
    async fn has_session(&self, name: &str) -> Result<bool, TransportError>;

    /// Terminate a session.
    async fn kill_session(&self, name: &str) -> Result<(), TransportError>;

    /// Current working directory of the session's active pane.
    async fn pane_current_path(&self, name: &str) -> Result<Option<PathBuf>, TransportError>;
}

/// Keep the last `lines` lines of `text`, ignoring trailing blank lines.
///
/// Panes are padded with empty rows below the cursor; those carry no signal.
pub fn tail_lines(text: &str, lines: usize) -> String {
    let trimmed = text.trim_end();
    if trimmed.is_empty() || lines == 0 {
        return String::new();
    }
    let all: Vec<&str> = trimmed.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

/// Send a message and confirm it with Enter.
pub async fn send_message(
    mux: &dyn Multiplexer,
    name: &str,
    message: &str,
) -> Result<(), TransportError> {
    mux.send_text(name, message).await?;
    mux.send_keys(name, "Enter").await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_lines_trims_padding() {
        let text = "a\nb\nc\n\n\n   \n";
        assert_eq!(tail_lines(text, 2), "b\nc");
        assert_eq!(tail_lines(text, 10), "a\nb\nc");
    }

    #[test]
    fn test_tail_lines_empty() {
        assert_eq!(tail_lines("", 5), "");
        assert_eq!(tail_lines("\n\n", 5), "");
        assert_eq!(tail_lines("x", 0), "");
    }

    #[tokio::test]
    async fn test_send_message_pastes_then_confirms() {
        let mut mux = MockMultiplexer::new();
        let mut seq = mockall::Sequence::new();
        mux.expect_send_text()
            .withf(|name, text| name.to_string() == "s" && text.to_string() == "continue")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        mux.expect_send_keys()
            .withf(|name, keys| name.to_string() == "s" && keys.to_string() == "Enter")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        send_message(&mux, "s", "continue").await.unwrap();
    }
}
