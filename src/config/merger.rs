// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration merging.
//!
//! Handles merging configurations from different sources with proper precedence.

use std::path::PathBuf;

use super::types::{ResolvedConfig, StallConfigPartial, WorkspaceConfig};

/// Environment variable overriding the session discovery pattern.
pub const SESSION_PATTERN_ENV: &str = "WORKTREE_TASK_SESSION_PATTERN";

/// Environment variable overriding the journal path.
pub const LOG_PATH_ENV: &str = "WORKTREE_TASK_LOG";

/// CLI options that can override configuration.
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    pub session_pattern: Option<String>,
    pub agent: Option<String>,
    pub log_path: Option<PathBuf>,
}

/// Overrides read from the process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub session_pattern: Option<String>,
    pub log_path: Option<PathBuf>,
}

impl EnvOverrides {
    /// Read overrides from the current process environment.
    ///
    /// Empty values are ignored.
    pub fn from_env() -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            session_pattern: non_empty(SESSION_PATTERN_ENV),
            log_path: non_empty(LOG_PATH_ENV).map(PathBuf::from),
        }
    }
}

/// Default configuration values.
pub fn default_config() -> ResolvedConfig {
    ResolvedConfig::default()
}

/// Merge multiple configurations with precedence.
///
/// Precedence (highest to lowest):
/// 1. CLI options
/// 2. Environment
/// 3. Local config (.worktree-task.local.json)
/// 4. Workspace config (.worktree-task.json)
/// 5. Global config (~/.worktree-task/config.json)
/// 6. Default values
pub fn merge_config(
    global: Option<WorkspaceConfig>,
    workspace: Option<WorkspaceConfig>,
    local: Option<WorkspaceConfig>,
    env: EnvOverrides,
    cli: CliOptions,
) -> ResolvedConfig {
    let mut result = default_config();

    for config in [global, workspace, local].into_iter().flatten() {
        apply_workspace_config(&mut result, &config);
    }

    if let Some(pattern) = env.session_pattern {
        result.session_pattern = pattern;
    }
    if let Some(path) = env.log_path {
        result.log_path = path;
    }

    if let Some(pattern) = cli.session_pattern {
        result.session_pattern = pattern;
    }
    if let Some(agent) = cli.agent {
        result.default_agent = agent;
    }
    if let Some(path) = cli.log_path {
        result.log_path = path;
    }

    result
}

fn apply_workspace_config(result: &mut ResolvedConfig, config: &WorkspaceConfig) {
    macro_rules! take {
        ($field:ident) => {
            if let Some(v) = &config.$field {
                result.$field = v.clone();
            }
        };
    }

    take!(session_pattern);
    take!(naming_scheme);
    take!(capture_lines);
    take!(capture_timeout_ms);
    take!(recovery_key);
    take!(recovery_strategy);
    take!(retry_cooldown_secs);
    take!(default_agent);
    take!(shell_init_delay_ms);
    take!(agent_start_delay_ms);
    take!(response_wait_ms);
    take!(resolution_timeout_secs);
    take!(resolution_poll_secs);
    take!(log_path);
    take!(log_max_bytes);
    take!(state_dir);
    take!(notifications);

    if let Some(dir) = &config.template_dir {
        result.template_dir = Some(dir.clone());
    }

    // Agents merge by name so a workspace can add one without repeating the defaults
    if let Some(agents) = &config.agents {
        for (name, command) in agents {
            result.agents.insert(name.clone(), command.clone());
        }
    }

    if let Some(stall) = &config.stall {
        apply_stall_config(result, stall);
    }
}

fn apply_stall_config(result: &mut ResolvedConfig, stall: &StallConfigPartial) {
    let target = &mut result.stall;
    if let Some(token) = &stall.waiting_token {
        target.waiting_token = token.clone();
    }
    if let Some(n) = stall.waiting_threshold {
        target.waiting_threshold = n;
    }
    if let Some(n) = stall.retry_threshold {
        target.retry_threshold = n;
    }
    if let Some(n) = stall.retry_budget {
        target.retry_budget = n;
    }
    if let Some(n) = stall.progress_window {
        target.progress_window = n;
    }
    if let Some(glyphs) = &stall.progress_glyphs {
        target.progress_glyphs = glyphs.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{NamingScheme, RecoveryStrategy};
    use std::collections::BTreeMap;

    #[test]
    fn test_merge_defaults() {
        let config = merge_config(None, None, None, EnvOverrides::default(), CliOptions::default());
        assert_eq!(config.capture_lines, 50);
        assert_eq!(config.naming_scheme, NamingScheme::Prefixed);
        assert_eq!(config.retry_cooldown_secs, 0);
    }

    #[test]
    fn test_merge_precedence() {
        let global = WorkspaceConfig {
            capture_lines: Some(10),
            recovery_key: Some("y".to_string()),
            ..Default::default()
        };
        let workspace = WorkspaceConfig {
            capture_lines: Some(20),
            recovery_strategy: Some(RecoveryStrategy::Message),
            ..Default::default()
        };
        let local = WorkspaceConfig {
            capture_lines: Some(30),
            ..Default::default()
        };

        let config = merge_config(
            Some(global),
            Some(workspace),
            Some(local),
            EnvOverrides::default(),
            CliOptions::default(),
        );
        assert_eq!(config.capture_lines, 30);
        assert_eq!(config.recovery_key, "y");
        assert_eq!(config.recovery_strategy, RecoveryStrategy::Message);
    }

    #[test]
    fn test_env_and_cli_override_pattern() {
        let workspace = WorkspaceConfig {
            session_pattern: Some("^ws-".to_string()),
            ..Default::default()
        };
        let env = EnvOverrides {
            session_pattern: Some("^env-".to_string()),
            log_path: None,
        };

        let config = merge_config(None, Some(workspace.clone()), None, env.clone(), CliOptions::default());
        assert_eq!(config.session_pattern, "^env-");

        let cli = CliOptions {
            session_pattern: Some("^cli-".to_string()),
            ..Default::default()
        };
        let config = merge_config(None, Some(workspace), None, env, cli);
        assert_eq!(config.session_pattern, "^cli-");
    }

    #[test]
    fn test_agents_merge_by_name() {
        let mut agents = BTreeMap::new();
        agents.insert("aider".to_string(), "aider --yes".to_string());
        let workspace = WorkspaceConfig {
            agents: Some(agents),
            ..Default::default()
        };

        let config = merge_config(None, Some(workspace), None, EnvOverrides::default(), CliOptions::default());
        assert_eq!(config.agent_command(Some("aider")), Some("aider --yes"));
        assert!(config.agent_command(Some("claude")).is_some());
    }

    #[test]
    fn test_stall_partial_merge() {
        let workspace = WorkspaceConfig {
            stall: Some(StallConfigPartial {
                waiting_token: Some("⏳".to_string()),
                retry_threshold: Some(3),
                ..Default::default()
            }),
            ..Default::default()
        };
        let config = merge_config(None, Some(workspace), None, EnvOverrides::default(), CliOptions::default());
        assert_eq!(config.stall.waiting_token, "⏳");
        assert_eq!(config.stall.retry_threshold, 3);
        assert_eq!(config.stall.waiting_threshold, 10);
    }
}
