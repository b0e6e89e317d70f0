// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Stall classification.
//!
//! A [`Classifier`] is a registration list of [`StallRule`]s. Every rule runs
//! against the captured output; the verdict carries each matching reason in
//! registration order, and any match means the session is stalled. Rules never
//! fail: a count that does not parse as a non-negative integer counts as zero.
//!
//! The default rules, in order:
//!
//! | Rule | Reason |
//! |---|---|
//! | rate-limit or quota marker | [`StallReason::RateLimit`] |
//! | retry attempt at or past the threshold | [`StallReason::RetryLoopStuck`] |
//! | error marker with no progress glyph in the trailing window | [`StallReason::ErrorNoProgress`] |
//! | waiting token repeated past the threshold | [`StallReason::WaitingTooLong`] |
//!
//! [`classify_resume`] is the coarser classifier used by `resume`, which also
//! recognises an agent idling at its input prompt.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::StallConfig;

/// Why a session is considered stalled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StallReason {
    RateLimit,
    RetryLoopStuck,
    ErrorNoProgress,
    WaitingTooLong,
}

impl StallReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimit => "rate_limit",
            Self::RetryLoopStuck => "retry_loop_stuck",
            Self::ErrorNoProgress => "error_no_progress",
            Self::WaitingTooLong => "waiting_too_long",
        }
    }
}

impl fmt::Display for StallReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one capture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StallVerdict {
    reasons: Vec<StallReason>,
}

impl StallVerdict {
    /// A verdict with no stall.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_reasons(reasons: Vec<StallReason>) -> Self {
        Self { reasons }
    }

    pub fn stalled(&self) -> bool {
        !self.reasons.is_empty()
    }

    /// The reported reason: the first matching rule.
    pub fn reason(&self) -> Option<StallReason> {
        self.reasons.first().copied()
    }

    /// All matching reasons in rule order.
    pub fn reasons(&self) -> &[StallReason] {
        &self.reasons
    }

    pub fn has(&self, reason: StallReason) -> bool {
        self.reasons.contains(&reason)
    }
}

impl fmt::Display for StallVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reasons.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = self.reasons.iter().map(StallReason::as_str).collect();
        f.write_str(&names.join(","))
    }
}

/// Captured output prepared once and shared by all rules.
#[derive(Debug)]
pub struct ClassifierInput<'a> {
    pub text: &'a str,
    pub lower: String,
    pub lines: Vec<&'a str>,
}

impl<'a> ClassifierInput<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            lower: text.to_lowercase(),
            lines: text.lines().collect(),
        }
    }

    /// The last `n` lines.
    pub fn tail(&self, n: usize) -> &[&'a str] {
        let start = self.lines.len().saturating_sub(n);
        &self.lines[start..]
    }
}

/// One stall heuristic.
pub trait StallRule: Send + Sync {
    /// Reason reported when the rule matches.
    fn reason(&self) -> StallReason;

    fn matches(&self, input: &ClassifierInput<'_>) -> bool;
}

/// Parse a count, treating anything but plain ASCII digits as zero.
pub fn parse_count(raw: &str) -> u32 {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return 0;
    }
    raw.parse().unwrap_or(0)
}

const RATE_LIMIT_MARKERS: &[&str] = &[
    "429",
    "rate limit",
    "rate_limit",
    "rate limited",
    "ratelimit",
    "too many requests",
    "quota exceeded",
];

static TOKEN_USAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)exceeded.*token usage").expect("valid token usage regex"));

static ATTEMPT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\battempt\s+([^\s/)]+)\s*/\s*([^\s)]+)").expect("valid attempt regex")
});

/// Rate-limit and quota markers.
#[derive(Debug, Default)]
pub struct RateLimitRule;

impl StallRule for RateLimitRule {
    fn reason(&self) -> StallReason {
        StallReason::RateLimit
    }

    fn matches(&self, input: &ClassifierInput<'_>) -> bool {
        RATE_LIMIT_MARKERS.iter().any(|m| input.lower.contains(m))
            || TOKEN_USAGE_RE.is_match(input.text)
    }
}

/// `attempt N/M` markers at or past the stuck threshold.
#[derive(Debug)]
pub struct RetryLoopRule {
    threshold: u32,
    budget: u32,
}

impl RetryLoopRule {
    pub fn new(threshold: u32, budget: u32) -> Self {
        Self { threshold, budget }
    }

    fn is_stuck(&self, attempt: u32, total: u32) -> bool {
        let total = if total == 0 { self.budget } else { total };
        let limit = match total {
            0 => self.threshold,
            t => self.threshold.min(t),
        };
        limit > 0 && attempt >= limit
    }
}

impl StallRule for RetryLoopRule {
    fn reason(&self) -> StallReason {
        StallReason::RetryLoopStuck
    }

    fn matches(&self, input: &ClassifierInput<'_>) -> bool {
        ATTEMPT_RE.captures_iter(input.text).any(|caps| {
            let attempt = caps.get(1).map_or(0, |m| parse_count(m.as_str()));
            let total = caps.get(2).map_or(0, |m| parse_count(m.as_str()));
            self.is_stuck(attempt, total)
        })
    }
}

const ERROR_MARKERS: &[&str] = &[
    "error",
    "failed to",
    "exception",
    "traceback",
    "fatal:",
    "panicked at",
];

/// An error marker with no sign of work in the trailing window.
#[derive(Debug)]
pub struct ErrorWithoutProgressRule {
    glyphs: Vec<String>,
    window: usize,
}

impl ErrorWithoutProgressRule {
    pub fn new(glyphs: Vec<String>, window: usize) -> Self {
        Self { glyphs, window }
    }
}

impl StallRule for ErrorWithoutProgressRule {
    fn reason(&self) -> StallReason {
        StallReason::ErrorNoProgress
    }

    fn matches(&self, input: &ClassifierInput<'_>) -> bool {
        if !ERROR_MARKERS.iter().any(|m| input.lower.contains(m)) {
            return false;
        }
        let progressing = input
            .tail(self.window)
            .iter()
            .any(|line| self.glyphs.iter().any(|g| line.contains(g.as_str())));
        !progressing
    }
}

/// The waiting token repeated more than `threshold` times.
#[derive(Debug)]
pub struct WaitingRule {
    token: String,
    threshold: usize,
}

impl WaitingRule {
    pub fn new(token: impl Into<String>, threshold: usize) -> Self {
        Self {
            token: token.into(),
            threshold,
        }
    }
}

impl StallRule for WaitingRule {
    fn reason(&self) -> StallReason {
        StallReason::WaitingTooLong
    }

    fn matches(&self, input: &ClassifierInput<'_>) -> bool {
        !self.token.is_empty() && input.text.matches(self.token.as_str()).count() > self.threshold
    }
}

/// Table-driven stall classifier.
pub struct Classifier {
    rules: Vec<Box<dyn StallRule>>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(&StallConfig::default())
    }
}

impl Classifier {
    /// Build the default rule set from configuration.
    pub fn new(config: &StallConfig) -> Self {
        Self::empty()
            .with_rule(RateLimitRule)
            .with_rule(RetryLoopRule::new(config.retry_threshold, config.retry_budget))
            .with_rule(ErrorWithoutProgressRule::new(
                config.progress_glyphs.clone(),
                config.progress_window,
            ))
            .with_rule(WaitingRule::new(
                config.waiting_token.clone(),
                config.waiting_threshold,
            ))
    }

    /// A classifier with no rules.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule to the registration list.
    pub fn with_rule(mut self, rule: impl StallRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Classify captured output. Blank output is never a stall.
    pub fn classify(&self, text: &str) -> StallVerdict {
        if text.trim().is_empty() {
            return StallVerdict::none();
        }
        let input = ClassifierInput::new(text);
        let reasons = self
            .rules
            .iter()
            .filter(|rule| rule.matches(&input))
            .map(|rule| rule.reason())
            .collect();
        StallVerdict::from_reasons(reasons)
    }
}

/// State of a session as seen by `resume`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeState {
    RateLimit,
    ApiError,
    Timeout,
    ConnectionError,
    WaitingInput,
    Unknown,
}

impl ResumeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimit => "rate_limit",
            Self::ApiError => "api_error",
            Self::Timeout => "timeout",
            Self::ConnectionError => "connection_error",
            Self::WaitingInput => "waiting_input",
            Self::Unknown => "unknown",
        }
    }

    /// Canned message that nudges the agent out of this state.
    pub fn message(&self) -> &'static str {
        match self {
            Self::RateLimit => "Rate limit should be reset now. Continue executing the remaining tasks from where you left off.",
            Self::ApiError => "API error may be resolved. Retry the last failed operation and continue.",
            Self::Timeout => "Timeout may be resolved. Retry the last operation and continue.",
            Self::ConnectionError => "Connection should be restored. Continue executing the remaining tasks.",
            Self::WaitingInput => "Continue executing the remaining tasks.",
            Self::Unknown => "Continue executing the remaining tasks from where you left off.",
        }
    }

    /// Whether resume has something to act on.
    pub fn is_actionable(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for ResumeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const PROMPT_MARKERS: &[char] = &['>', '❯'];

/// Classify captured output into a [`ResumeState`]; first match wins.
pub fn classify_resume(text: &str) -> ResumeState {
    let lower = text.to_lowercase();
    if RateLimitRule.matches(&ClassifierInput::new(text)) {
        ResumeState::RateLimit
    } else if lower.contains("api error") {
        ResumeState::ApiError
    } else if lower.contains("timeout") || lower.contains("timed out") {
        ResumeState::Timeout
    } else if lower.contains("connection") && lower.contains("error") {
        ResumeState::ConnectionError
    } else if text.trim_end().ends_with(PROMPT_MARKERS) {
        ResumeState::WaitingInput
    } else {
        ResumeState::Unknown
    }
}
