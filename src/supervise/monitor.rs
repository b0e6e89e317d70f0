// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The monitor pass.
//!
//! One invocation of [`Monitor::run`] discovers sessions, captures and
//! classifies each in turn, and dispatches at most one recovery per stalled
//! session. It does not schedule itself; an external timer calls it.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::classifier::{Classifier, StallVerdict};
use super::cooldown::CooldownStore;
use super::dispatcher::{sink_for, RecoveryAction, RecoveryDispatcher, RecoveryOutcome};
use super::journal::{Journal, JournalEvent};
use super::registry::SessionRegistry;
use crate::config::ResolvedConfig;
use crate::error::{ConfigError, TransportError};
use crate::multiplexer::{Multiplexer, OutputCapture};
use crate::notify::{notify_quietly, Notifier};
use crate::telemetry::CorrelationId;

/// What happened to one session during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionStatus {
    /// Output captured and no stall found.
    Healthy,
    /// Output could not be captured; not treated as a stall.
    Unreadable,
    /// Stalled, but the same reason was retried within the cooldown window.
    CoolingDown { verdict: StallVerdict },
    /// Stalled and a recovery was dispatched.
    Recovered {
        verdict: StallVerdict,
        action: RecoveryAction,
    },
}

impl SessionStatus {
    pub fn verdict(&self) -> Option<&StallVerdict> {
        match self {
            Self::CoolingDown { verdict } | Self::Recovered { verdict, .. } => Some(verdict),
            _ => None,
        }
    }

    pub fn action(&self) -> Option<&RecoveryAction> {
        match self {
            Self::Recovered { action, .. } => Some(action),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    pub session: String,
    #[serde(flatten)]
    pub status: SessionStatus,
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            SessionStatus::Healthy => write!(f, "{}: ok", self.session),
            SessionStatus::Unreadable => write!(f, "{}: could not capture output", self.session),
            SessionStatus::CoolingDown { verdict } => {
                write!(f, "{}: stalled ({}), cooling down", self.session, verdict)
            }
            SessionStatus::Recovered { verdict, action } => {
                let outcome = match (action.outcome, action.dry_run) {
                    (RecoveryOutcome::Sent, true) => "would retry",
                    (RecoveryOutcome::Sent, false) => "retried",
                    (RecoveryOutcome::Failed, _) => "retry failed",
                };
                write!(f, "{}: stalled ({}), {}", self.session, verdict, outcome)
            }
        }
    }
}

/// Result of one monitor pass.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub correlation_id: CorrelationId,
    pub dry_run: bool,
    pub checked: usize,
    pub unreadable: usize,
    pub stalled: usize,
    pub retried: usize,
    pub failed: usize,
    pub sessions: Vec<SessionReport>,
}

impl Summary {
    fn new(correlation_id: CorrelationId, dry_run: bool) -> Self {
        Self {
            correlation_id,
            dry_run,
            checked: 0,
            unreadable: 0,
            stalled: 0,
            retried: 0,
            failed: 0,
            sessions: Vec::new(),
        }
    }

    fn add(&mut self, report: SessionReport) {
        self.checked += 1;
        match &report.status {
            SessionStatus::Healthy => {}
            SessionStatus::Unreadable => self.unreadable += 1,
            SessionStatus::CoolingDown { .. } => self.stalled += 1,
            SessionStatus::Recovered { action, .. } => {
                self.stalled += 1;
                match action.outcome {
                    RecoveryOutcome::Sent => self.retried += 1,
                    RecoveryOutcome::Failed => self.failed += 1,
                }
            }
        }
        self.sessions.push(report);
    }

    /// Summary line, followed by one line per session when `verbose`.
    pub fn render(&self, verbose: bool) -> String {
        let mut out = self.to_string();
        if verbose {
            for report in &self.sessions {
                out.push_str("\n  ");
                out.push_str(&report.to_string());
            }
        }
        out
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "checked {} session(s): {} stalled, {} retried, {} failed",
            self.checked, self.stalled, self.retried, self.failed
        )?;
        if self.unreadable > 0 {
            write!(f, ", {} unreadable", self.unreadable)?;
        }
        if self.dry_run {
            f.write_str(" (dry run)")?;
        }
        Ok(())
    }
}

/// Stall monitor over all sessions of one project.
pub struct Monitor {
    registry: SessionRegistry,
    capture: OutputCapture,
    classifier: Arc<Classifier>,
    dispatcher: RecoveryDispatcher,
    cooldown: CooldownStore,
    journal: Option<Journal>,
    notifier: Option<Arc<dyn Notifier>>,
    correlation_id: CorrelationId,
}

impl Monitor {
    pub fn new(
        registry: SessionRegistry,
        capture: OutputCapture,
        classifier: Arc<Classifier>,
        dispatcher: RecoveryDispatcher,
    ) -> Self {
        Self {
            registry,
            capture,
            classifier,
            dispatcher,
            cooldown: CooldownStore::disabled(),
            journal: None,
            notifier: None,
            correlation_id: CorrelationId::new(),
        }
    }

    /// Wire a monitor from configuration: journal, cooldown and recovery
    /// strategy all come from `config`.
    pub fn from_config(
        mux: Arc<dyn Multiplexer>,
        project: &str,
        config: &ResolvedConfig,
    ) -> Result<Self, ConfigError> {
        let registry = SessionRegistry::from_config(mux.clone(), project, config)?;
        let capture = OutputCapture::new(mux.clone(), config.capture_lines);
        let classifier = Arc::new(Classifier::new(&config.stall));
        let dispatcher = RecoveryDispatcher::new(sink_for(config, mux));
        let cooldown = CooldownStore::load(
            &config.state_dir,
            Duration::from_secs(config.retry_cooldown_secs),
        );
        Ok(Self::new(registry, capture, classifier, dispatcher)
            .with_cooldown(cooldown)
            .with_journal(Journal::new(&config.log_path, config.log_max_bytes)))
    }

    pub fn with_cooldown(mut self, cooldown: CooldownStore) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_correlation_id(mut self, id: CorrelationId) -> Self {
        self.correlation_id = id;
        self
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Capture and classify one session without acting.
    ///
    /// `None` means the output could not be captured.
    pub async fn check_session(&self, session: &str) -> Option<StallVerdict> {
        let text = self.capture.capture(session).await?;
        Some(self.classifier.classify(&text))
    }

    /// Check one session and dispatch a recovery if it is stalled.
    #[instrument(skip(self), fields(correlation_id = %self.correlation_id))]
    pub async fn process_session(&mut self, session: &str, dry_run: bool) -> SessionReport {
        let status = match self.check_session(session).await {
            None => SessionStatus::Unreadable,
            Some(verdict) => match verdict.reason() {
                None => SessionStatus::Healthy,
                Some(reason) => {
                    let now = Utc::now();
                    if self.cooldown.is_cooling(session, reason, now) {
                        debug!(session, %reason, "stalled, within cooldown window");
                        SessionStatus::CoolingDown { verdict }
                    } else {
                        let action = self.dispatcher.dispatch(session, reason, dry_run).await;
                        if action.is_sent() && !dry_run {
                            self.cooldown.record(session, reason, action.timestamp);
                        }
                        if let Some(journal) = &self.journal {
                            journal.record(self.correlation_id, JournalEvent::Recovery(action.clone()));
                        }
                        SessionStatus::Recovered { verdict, action }
                    }
                }
            },
        };
        let report = SessionReport {
            session: session.to_string(),
            status,
        };
        debug!(report = %report, "session checked");
        report
    }

    /// Run one monitor pass over every discovered session.
    ///
    /// Sessions are processed sequentially; a failure on one session is
    /// recorded in the summary and the pass continues. Only discovery itself
    /// can fail the pass.
    #[instrument(skip(self), fields(correlation_id = %self.correlation_id))]
    pub async fn run(&mut self, dry_run: bool, verbose: bool) -> Result<Summary, TransportError> {
        let discovered = self.registry.discover().await?;
        // a session appears once, so it is retried at most once per pass
        let sessions: BTreeSet<String> = discovered.into_iter().collect();
        info!(count = sessions.len(), dry_run, "monitor pass started");

        let mut summary = Summary::new(self.correlation_id, dry_run);
        for session in &sessions {
            let report = self.process_session(session, dry_run).await;
            if verbose {
                info!(report = %report, "session");
            }
            summary.add(report);
        }

        let live: Vec<String> = sessions.into_iter().collect();
        self.cooldown.prune(Utc::now(), &live);
        if let Err(e) = self.cooldown.save() {
            warn!(error = %e, "could not save cooldown store");
        }

        if let Some(journal) = &self.journal {
            journal.record(
                self.correlation_id,
                JournalEvent::MonitorSummary {
                    checked: summary.checked,
                    stalled: summary.stalled,
                    retried: summary.retried,
                    failed: summary.failed,
                    dry_run,
                },
            );
        }

        if !dry_run && (summary.retried > 0 || summary.failed > 0) {
            if let Some(notifier) = &self.notifier {
                let body = format!(
                    "Retried {} stalled session(s), {} failed",
                    summary.retried, summary.failed
                );
                notify_quietly(notifier.as_ref(), "worktree-task monitor", &body).await;
            }
        }

        info!(summary = %summary, "monitor pass finished");
        Ok(summary)
    }
}
