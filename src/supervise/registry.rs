// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session naming and discovery.

use std::sync::Arc;

use regex::Regex;
use tracing::debug;

use crate::config::{NamingScheme, ResolvedConfig};
use crate::error::{ConfigError, TransportError};
use crate::multiplexer::Multiplexer;
use crate::workspace::GitOperation;

/// Normalize a name component: lowercase, path separators, dots, colons and
/// whitespace become `-`.
pub fn normalize_component(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '/' | '\\' | '.' | ':' => '-',
            c if c.is_whitespace() => '-',
            c => c,
        })
        .collect::<String>()
        .to_lowercase()
}

/// Deterministic session name for a task.
pub fn session_name(project: &str, branch: &str, scheme: NamingScheme) -> String {
    let branch = normalize_component(branch);
    match scheme {
        NamingScheme::Prefixed => format!("{}-{}", normalize_component(project), branch),
        NamingScheme::Legacy => branch,
    }
}

/// Session name for a supervised conflict-resolution session.
///
/// `merge-<feature>-to-<target>` or `rebase-<target>-onto-<feature>`.
pub fn integration_session_name(
    project: &str,
    op: GitOperation,
    feature: &str,
    target: &str,
    scheme: NamingScheme,
) -> String {
    let logical = match op {
        GitOperation::Merge => format!("merge-{}-to-{}", feature, target),
        GitOperation::Rebase => format!("rebase-{}-onto-{}", target, feature),
    };
    session_name(project, &logical, scheme)
}

/// Stateless view over the live session list.
///
/// Every call goes to the multiplexer; nothing is cached between calls.
#[derive(Clone)]
pub struct SessionRegistry {
    mux: Arc<dyn Multiplexer>,
    project: String,
    scheme: NamingScheme,
    pattern: Regex,
}

impl SessionRegistry {
    pub fn new(
        mux: Arc<dyn Multiplexer>,
        project: impl Into<String>,
        scheme: NamingScheme,
        pattern: Regex,
    ) -> Self {
        Self {
            mux,
            project: project.into(),
            scheme,
            pattern,
        }
    }

    /// Build a registry from configuration. The pattern's `{project}`
    /// placeholder is filled with the normalized project name so that names
    /// produced by [`resolve`](Self::resolve) are discoverable.
    pub fn from_config(
        mux: Arc<dyn Multiplexer>,
        project: &str,
        config: &ResolvedConfig,
    ) -> Result<Self, ConfigError> {
        let pattern = config.session_regex(&normalize_component(project))?;
        Ok(Self::new(mux, project, config.naming_scheme, pattern))
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn scheme(&self) -> NamingScheme {
        self.scheme
    }

    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    /// Live sessions matching the configured pattern.
    pub async fn discover(&self) -> Result<Vec<String>, TransportError> {
        self.discover_matching(&self.pattern).await
    }

    /// Live sessions matching `pattern`.
    pub async fn discover_matching(&self, pattern: &Regex) -> Result<Vec<String>, TransportError> {
        let all = self.mux.list_sessions().await?;
        let total = all.len();
        let matched: Vec<String> = all.into_iter().filter(|s| pattern.is_match(s)).collect();
        debug!(total, matched = matched.len(), pattern = %pattern, "discovered sessions");
        Ok(matched)
    }

    /// Session name for `branch` in this project.
    pub fn resolve(&self, branch: &str) -> String {
        session_name(&self.project, branch, self.scheme)
    }

    /// Session name for a conflict-resolution session.
    pub fn resolve_integration(&self, op: GitOperation, feature: &str, target: &str) -> String {
        integration_session_name(&self.project, op, feature, target, self.scheme)
    }

    pub async fn exists(&self, name: &str) -> Result<bool, TransportError> {
        self.mux.has_session(name).await
    }
}
