// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Stall detection and recovery.
//!
//! # Data flow
//!
//! ```text
//! Monitor::run
//!   └── SessionRegistry::discover      live sessions matching the pattern
//!        └── OutputCapture::capture    bounded tail, or nothing
//!             └── Classifier::classify table of StallRules -> StallVerdict
//!                  └── RecoveryDispatcher::dispatch  RecoverySink -> RecoveryAction
//!                       └── Journal    rotating JSON lines
//! ```
//!
//! Nothing here owns a session. The monitor reads output and may write a
//! single keystroke or message; sessions and worktrees belong to the
//! lifecycle controller.

pub mod classifier;
pub mod cooldown;
pub mod dispatcher;
pub mod journal;
pub mod monitor;
pub mod registry;

pub use classifier::{
    classify_resume, Classifier, ClassifierInput, ResumeState, StallReason, StallRule,
    StallVerdict,
};
pub use cooldown::CooldownStore;
pub use dispatcher::{
    sink_for, KeystrokeSink, MessageSink, RecoveryAction, RecoveryDispatcher, RecoveryOutcome,
    RecoverySink,
};
pub use journal::{Journal, JournalEntry, JournalEvent};
pub use monitor::{Monitor, SessionReport, SessionStatus, Summary};
pub use registry::{integration_session_name, normalize_component, session_name, SessionRegistry};
