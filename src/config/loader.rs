// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Config file discovery.
//!
//! Three layers are read from disk: the global file under the home directory,
//! the first workspace file found in the primary repository root, and a local
//! override next to it. `.yaml`/`.yml` files are parsed as YAML, anything
//! else as JSON.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::types::WorkspaceConfig;

/// Workspace config candidates, first match wins.
pub const CONFIG_FILES: &[&str] = &[
    ".worktree-task.json",
    ".worktree-task/config.json",
    ".worktree-task/config.yaml",
    "worktree-task.config.json",
];

/// Uncommitted per-checkout overrides.
pub const LOCAL_CONFIG_FILE: &str = ".worktree-task.local.json";

pub const GLOBAL_CONFIG_DIR: &str = ".worktree-task";

pub const GLOBAL_CONFIG_FILE: &str = "config.json";

/// `~/.worktree-task`, also the default home of journal and state files.
pub fn get_global_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(GLOBAL_CONFIG_DIR))
}

pub fn get_global_config_path() -> Option<PathBuf> {
    get_global_config_dir().map(|dir| dir.join(GLOBAL_CONFIG_FILE))
}

fn load_if_present(path: &Path) -> Result<Option<WorkspaceConfig>, ConfigError> {
    if path.is_file() {
        load_config_file(path).map(Some)
    } else {
        Ok(None)
    }
}

pub fn load_global_config() -> Result<Option<WorkspaceConfig>, ConfigError> {
    match get_global_config_path() {
        Some(path) => load_if_present(&path),
        None => Ok(None),
    }
}

/// First of [`CONFIG_FILES`] present under `repo_root`.
pub fn load_workspace_config(repo_root: &Path) -> Result<Option<WorkspaceConfig>, ConfigError> {
    match CONFIG_FILES
        .iter()
        .map(|name| repo_root.join(name))
        .find(|path| path.is_file())
    {
        Some(path) => load_config_file(&path).map(Some),
        None => Ok(None),
    }
}

pub fn load_local_config(repo_root: &Path) -> Result<Option<WorkspaceConfig>, ConfigError> {
    load_if_present(&repo_root.join(LOCAL_CONFIG_FILE))
}

pub fn load_config_file(path: &Path) -> Result<WorkspaceConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));

    if is_yaml {
        serde_yaml::from_str(&content).map_err(ConfigError::from)
    } else {
        serde_json::from_str(&content).map_err(ConfigError::from)
    }
}

/// Write a starter workspace config into `repo_root`.
///
/// Refuses to replace a workspace config that is already there.
pub fn init_config(repo_root: &Path) -> Result<PathBuf, ConfigError> {
    if let Some(existing) = CONFIG_FILES
        .iter()
        .map(|name| repo_root.join(name))
        .find(|path| path.is_file())
    {
        return Err(ConfigError::InvalidValue {
            field: "config".to_string(),
            message: format!("{} already exists", existing.display()),
        });
    }
    let path = repo_root.join(CONFIG_FILES[0]);
    let content = serde_json::to_string_pretty(&get_example_config())?;
    std::fs::write(&path, content)?;
    Ok(path)
}

/// Starter config: the settings most projects end up touching.
pub fn get_example_config() -> WorkspaceConfig {
    WorkspaceConfig {
        default_agent: Some("claude".to_string()),
        capture_lines: Some(50),
        retry_cooldown_secs: Some(300),
        ..Default::default()
    }
}
