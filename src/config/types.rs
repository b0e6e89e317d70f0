// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.
//!
//! Defines the structure of workspace and resolved configuration,
//! supporting JSON and YAML formats.

use std::collections::BTreeMap;
use std::path::PathBuf;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Placeholder substituted with the (normalized) project name in session patterns.
pub const PROJECT_PLACEHOLDER: &str = "{project}";

/// Default session discovery pattern.
///
/// Matches the conventional branch prefixes plus the project-prefixed naming scheme.
pub const DEFAULT_SESSION_PATTERN: &str =
    r"^((feature|feat|fix|bugfix|hotfix|chore|refactor|docs|test|release|merge|rebase)-|{project}-)";

/// Workspace configuration.
/// Can be defined in .worktree-task.json or .worktree-task/config.json in the project root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    /// Regex used to discover supervised sessions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_pattern: Option<String>,

    /// Session naming scheme (prefixed or legacy)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub naming_scheme: Option<NamingScheme>,

    /// Number of trailing lines captured from a pane
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_lines: Option<usize>,

    /// Timeout for a single multiplexer call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_timeout_ms: Option<u64>,

    /// Key sent by the keystroke recovery strategy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_key: Option<String>,

    /// How stalled sessions are nudged
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_strategy: Option<RecoveryStrategy>,

    /// Minimum seconds between two recoveries of the same (session, reason)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_cooldown_secs: Option<u64>,

    /// Agent commands by name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agents: Option<BTreeMap<String, String>>,

    /// Agent used when none is selected on the command line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_agent: Option<String>,

    /// Delay after creating a session before typing into it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell_init_delay_ms: Option<u64>,

    /// Delay after starting the agent before sending the prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_start_delay_ms: Option<u64>,

    /// Delay before showing the response to a resume message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_wait_ms: Option<u64>,

    /// Maximum time a conflict-resolution session may take
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_timeout_secs: Option<u64>,

    /// Poll interval while supervising a conflict-resolution session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_poll_secs: Option<u64>,

    /// Journal file path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,

    /// Journal size that triggers rotation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_max_bytes: Option<u64>,

    /// Directory for cooldown and instruction state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,

    /// Directory holding prompt templates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_dir: Option<PathBuf>,

    /// Whether to send desktop notifications
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notifications: Option<bool>,

    /// Stall heuristics tuning
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stall: Option<StallConfigPartial>,
}

/// Session naming scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingScheme {
    /// `<project>-<branch>`
    #[default]
    Prefixed,
    /// `<branch>` only
    Legacy,
}

/// Recovery strategy for stalled sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryStrategy {
    /// Send a single confirmation key.
    #[default]
    Keystroke,
    /// Paste a reason-specific message and confirm it.
    Message,
}

/// Partial stall heuristics as read from a config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StallConfigPartial {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waiting_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waiting_threshold: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_threshold: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_budget: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_window: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_glyphs: Option<Vec<String>>,
}

/// Resolved stall heuristics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StallConfig {
    /// Literal token printed by an agent that is waiting on something.
    pub waiting_token: String,
    /// The token must appear more than this many times.
    pub waiting_threshold: usize,
    /// Retry attempt number at which the loop counts as stuck.
    pub retry_threshold: u32,
    /// Attempt budget the agent advertises.
    pub retry_budget: u32,
    /// Number of trailing lines searched for progress glyphs.
    pub progress_window: usize,
    /// Markers printed while the agent is working or done.
    pub progress_glyphs: Vec<String>,
}

impl Default for StallConfig {
    fn default() -> Self {
        Self {
            waiting_token: "Waiting…".to_string(),
            waiting_threshold: 10,
            retry_threshold: 5,
            retry_budget: 10,
            progress_window: 20,
            progress_glyphs: ["✻", "✽", "✶", "✳", "✢", "⏺", "⎿", "✓", "✔", "esc to interrupt"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Fully resolved configuration with defaults applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConfig {
    pub session_pattern: String,
    pub naming_scheme: NamingScheme,
    pub capture_lines: usize,
    pub capture_timeout_ms: u64,
    pub recovery_key: String,
    pub recovery_strategy: RecoveryStrategy,
    pub retry_cooldown_secs: u64,
    pub agents: BTreeMap<String, String>,
    pub default_agent: String,
    pub shell_init_delay_ms: u64,
    pub agent_start_delay_ms: u64,
    pub response_wait_ms: u64,
    pub resolution_timeout_secs: u64,
    pub resolution_poll_secs: u64,
    pub log_path: PathBuf,
    pub log_max_bytes: u64,
    pub state_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_dir: Option<PathBuf>,
    pub notifications: bool,
    pub stall: StallConfig,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        let base = super::loader::get_global_config_dir()
            .unwrap_or_else(|| std::env::temp_dir().join("worktree-task"));

        let mut agents = BTreeMap::new();
        agents.insert(
            "claude".to_string(),
            "claude --dangerously-skip-permissions".to_string(),
        );
        agents.insert("codex".to_string(), "codex --full-auto".to_string());

        Self {
            session_pattern: DEFAULT_SESSION_PATTERN.to_string(),
            naming_scheme: NamingScheme::default(),
            capture_lines: 50,
            capture_timeout_ms: 3_000,
            recovery_key: "Enter".to_string(),
            recovery_strategy: RecoveryStrategy::default(),
            retry_cooldown_secs: 0,
            agents,
            default_agent: "claude".to_string(),
            shell_init_delay_ms: 1_000,
            agent_start_delay_ms: 3_000,
            response_wait_ms: 5_000,
            resolution_timeout_secs: 1_800,
            resolution_poll_secs: 15,
            log_path: base.join("logs").join("monitor.log"),
            log_max_bytes: 1024 * 1024,
            state_dir: base.join("state"),
            template_dir: None,
            notifications: true,
            stall: StallConfig::default(),
        }
    }
}

impl ResolvedConfig {
    /// Compile the session discovery pattern for a project.
    ///
    /// `{project}` is replaced with the escaped project name before compiling.
    pub fn session_regex(&self, project: &str) -> Result<Regex, ConfigError> {
        let pattern = self
            .session_pattern
            .replace(PROJECT_PLACEHOLDER, &regex::escape(project));
        Regex::new(&pattern).map_err(|e| ConfigError::InvalidValue {
            field: "sessionPattern".to_string(),
            message: e.to_string(),
        })
    }

    /// Look up the command for an agent, falling back to the default agent.
    pub fn agent_command(&self, agent: Option<&str>) -> Option<&str> {
        let name = agent.unwrap_or(&self.default_agent);
        self.agents.get(name).map(String::as_str)
    }
}
