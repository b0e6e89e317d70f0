// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Recovery dispatch.
//!
//! The dispatcher decides nothing; it performs one recovery through a
//! [`RecoverySink`] and records what happened. Sinks are swappable per agent:
//! the default presses a single confirmation key, [`MessageSink`] pastes a
//! short instruction instead.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::classifier::{ResumeState, StallReason};
use crate::config::{RecoveryStrategy, ResolvedConfig};
use crate::error::TransportError;
use crate::multiplexer::{send_message, Multiplexer};

/// Result of one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryOutcome {
    Sent,
    Failed,
}

/// Record of one recovery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryAction {
    pub session_name: String,
    pub reason: StallReason,
    pub timestamp: DateTime<Utc>,
    pub dry_run: bool,
    pub outcome: RecoveryOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecoveryAction {
    pub fn is_sent(&self) -> bool {
        self.outcome == RecoveryOutcome::Sent
    }
}

/// Something that can nudge a stalled session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecoverySink: Send + Sync {
    async fn recover(&self, session: &str, reason: StallReason) -> Result<(), TransportError>;
}

/// Presses a single key (default `Enter`).
pub struct KeystrokeSink {
    mux: Arc<dyn Multiplexer>,
    key: String,
}

impl KeystrokeSink {
    pub fn new(mux: Arc<dyn Multiplexer>, key: impl Into<String>) -> Self {
        Self {
            mux,
            key: key.into(),
        }
    }
}

#[async_trait]
impl RecoverySink for KeystrokeSink {
    async fn recover(&self, session: &str, _reason: StallReason) -> Result<(), TransportError> {
        self.mux.send_keys(session, &self.key).await
    }
}

/// Instruction pasted by [`MessageSink`] for a stall reason.
pub fn recovery_message(reason: StallReason) -> &'static str {
    match reason {
        StallReason::RateLimit => ResumeState::RateLimit.message(),
        StallReason::RetryLoopStuck => ResumeState::ApiError.message(),
        StallReason::ErrorNoProgress | StallReason::WaitingTooLong => ResumeState::Unknown.message(),
    }
}

/// Pastes a reason-specific instruction and confirms it.
pub struct MessageSink {
    mux: Arc<dyn Multiplexer>,
}

impl MessageSink {
    pub fn new(mux: Arc<dyn Multiplexer>) -> Self {
        Self { mux }
    }
}

#[async_trait]
impl RecoverySink for MessageSink {
    async fn recover(&self, session: &str, reason: StallReason) -> Result<(), TransportError> {
        send_message(self.mux.as_ref(), session, recovery_message(reason)).await
    }
}

/// Build the sink selected by configuration.
pub fn sink_for(config: &ResolvedConfig, mux: Arc<dyn Multiplexer>) -> Arc<dyn RecoverySink> {
    match config.recovery_strategy {
        RecoveryStrategy::Keystroke => Arc::new(KeystrokeSink::new(mux, config.recovery_key.clone())),
        RecoveryStrategy::Message => Arc::new(MessageSink::new(mux)),
    }
}

/// Performs recovery actions and records their outcome.
#[derive(Clone)]
pub struct RecoveryDispatcher {
    sink: Arc<dyn RecoverySink>,
}

impl RecoveryDispatcher {
    pub fn new(sink: Arc<dyn RecoverySink>) -> Self {
        Self { sink }
    }

    /// Dispatch one recovery. Dry runs are recorded as sent without touching
    /// the sink; transport failures are recorded, never returned.
    pub async fn dispatch(&self, session: &str, reason: StallReason, dry_run: bool) -> RecoveryAction {
        let mut action = RecoveryAction {
            session_name: session.to_string(),
            reason,
            timestamp: Utc::now(),
            dry_run,
            outcome: RecoveryOutcome::Sent,
            error: None,
        };

        if dry_run {
            info!(session, %reason, "dry run: would send recovery");
            return action;
        }

        match self.sink.recover(session, reason).await {
            Ok(()) => info!(session, %reason, "recovery sent"),
            Err(e) => {
                error!(session, %reason, error = %e, "recovery failed");
                action.outcome = RecoveryOutcome::Failed;
                action.error = Some(e.to_string());
            }
        }
        action
    }
}
