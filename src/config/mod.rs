// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration module.
//!
//! Handles loading, merging, and validation of configuration from multiple sources:
//! - Global config: ~/.worktree-task/config.json
//! - Workspace config: .worktree-task.json, .worktree-task/config.json, or worktree-task.config.json
//! - Local config: .worktree-task.local.json (gitignored, for personal overrides)
//! - Environment: `WORKTREE_TASK_SESSION_PATTERN`, `WORKTREE_TASK_LOG`
//! - CLI options: command-line arguments
//!
//! Configuration is merged with precedence (CLI > env > local > workspace > global > defaults).

mod loader;
mod merger;
mod types;

pub use loader::{
    get_example_config, get_global_config_dir, get_global_config_path, init_config,
    load_config_file, load_global_config, load_local_config, load_workspace_config, CONFIG_FILES,
    GLOBAL_CONFIG_DIR, GLOBAL_CONFIG_FILE, LOCAL_CONFIG_FILE,
};

pub use merger::{default_config, merge_config, CliOptions, EnvOverrides, LOG_PATH_ENV, SESSION_PATTERN_ENV};

pub use types::{
    NamingScheme, RecoveryStrategy, ResolvedConfig, StallConfig, StallConfigPartial,
    WorkspaceConfig, DEFAULT_SESSION_PATTERN, PROJECT_PLACEHOLDER,
};

use crate::error::ConfigError;
use std::path::Path;

/// Load and merge all configuration sources for a repository.
///
/// This is the main entry point for configuration loading. The merged
/// session pattern is validated before returning.
pub fn load_config(
    workspace_root: &Path,
    cli_options: CliOptions,
) -> Result<ResolvedConfig, ConfigError> {
    let global = load_global_config()?;
    let workspace = load_workspace_config(workspace_root)?;
    let local = load_local_config(workspace_root)?;

    let config = merge_config(global, workspace, local, EnvOverrides::from_env(), cli_options);
    config.session_regex("project")?;
    Ok(config)
}
