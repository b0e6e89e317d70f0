// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Output capture adapter.

use std::sync::Arc;

use tracing::warn;

use super::Multiplexer;

/// Reads a bounded tail of a session's output.
///
/// Failures (vanished session, timed-out or missing tmux) yield `None`;
/// the caller treats that as "could not capture", never as a stall.
#[derive(Clone)]
pub struct OutputCapture {
    mux: Arc<dyn Multiplexer>,
    max_lines: usize,
}

impl OutputCapture {
    pub fn new(mux: Arc<dyn Multiplexer>, max_lines: usize) -> Self {
        Self { mux, max_lines }
    }

    /// Number of lines requested per capture.
    pub fn max_lines(&self) -> usize {
        self.max_lines
    }

    /// Capture the session's tail with the default line budget.
    pub async fn capture(&self, session: &str) -> Option<String> {
        self.capture_lines(session, self.max_lines).await
    }

    /// Capture the last `lines` lines of the session's output.
    pub async fn capture_lines(&self, session: &str, lines: usize) -> Option<String> {
        match self.mux.capture_pane(session, lines).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(session, error = %e, "could not capture session output");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::multiplexer::MockMultiplexer;

    #[tokio::test]
    async fn test_capture_passes_line_budget() {
        let mut mux = MockMultiplexer::new();
        mux.expect_capture_pane()
            .withf(|name, lines| name.to_string() == "feat-a" && *lines == 40)
            .returning(|_, _| Ok("working".to_string()));

        let capture = OutputCapture::new(Arc::new(mux), 40);
        assert_eq!(capture.capture("feat-a").await.as_deref(), Some("working"));
    }

    #[tokio::test]
    async fn test_capture_failure_is_none() {
        let mut mux = MockMultiplexer::new();
        mux.expect_capture_pane().returning(|_, _| {
            Err(TransportError::Timeout {
                op: "tmux capture-pane".to_string(),
                timeout_ms: 3000,
            })
        });

        let capture = OutputCapture::new(Arc::new(mux), 50);
        assert!(capture.capture("gone").await.is_none());
    }
}
