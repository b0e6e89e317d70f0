// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Desktop notifications.
//!
//! Notifications are best-effort: a missing notifier or a failed delivery is
//! logged at debug level and otherwise ignored.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::TransportError;
use crate::process::{run_command, Invocation};

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Delivers a short title/body notification to the user.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, title: &str, body: &str) -> Result<(), TransportError>;
}

/// Send a notification, swallowing any failure.
pub async fn notify_quietly(notifier: &dyn Notifier, title: &str, body: &str) {
    if let Err(e) = notifier.notify(title, body).await {
        debug!(error = %e, "notification not delivered");
    }
}

/// Notifier that tries `terminal-notifier`, `osascript`, then `notify-send`.
#[derive(Debug, Clone, Default)]
pub struct DesktopNotifier;

impl DesktopNotifier {
    pub fn new() -> Self {
        Self
    }
}

/// Escape a string for an AppleScript double-quoted literal.
fn applescript_quote(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[async_trait]
impl Notifier for DesktopNotifier {
    async fn notify(&self, title: &str, body: &str) -> Result<(), TransportError> {
        let script = format!(
            "display notification \"{}\" with title \"{}\"",
            applescript_quote(body),
            applescript_quote(title)
        );
        let attempts: [(&str, Vec<&str>); 3] = [
            ("terminal-notifier", vec!["-title", title, "-message", body]),
            ("osascript", vec!["-e", script.as_str()]),
            ("notify-send", vec![title, body]),
        ];

        let mut last_err = None;
        for (program, args) in &attempts {
            match run_command(Invocation::new(program, args, NOTIFY_TIMEOUT)).await {
                Ok(out) if out.success => {
                    debug!(program, "notification delivered");
                    return Ok(());
                }
                Ok(out) => last_err = Some(TransportError::failed(*program, out.stderr.trim())),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| TransportError::failed("notify", "no notifier available")))
    }
}

/// Notifier that drops everything; used when notifications are disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, _title: &str, _body: &str) -> Result<(), TransportError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_applescript_quote() {
        assert_eq!(applescript_quote(r#"say "hi" \ bye"#), r#"say \"hi\" \\ bye"#);
    }

    #[tokio::test]
    async fn test_notify_quietly_swallows_errors() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .times(1)
            .returning(|_, _| Err(TransportError::failed("notify-send", "no display")));
        notify_quietly(&notifier, "title", "body").await;
    }

    #[tokio::test]
    async fn test_null_notifier() {
        assert!(NullNotifier.notify("t", "b").await.is_ok());
    }
}
