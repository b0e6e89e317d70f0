// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Append-only JSON-lines journal with size-bounded rotation.
//!
//! Each entry is written with a single `write_all` on a file opened in append
//! mode, so entries from overlapping invocations interleave whole. When the
//! file grows past the size limit it is renamed to `<name>.1` before the next
//! write; a writer still holding the old handle finishes into the rotated file.

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::dispatcher::RecoveryAction;
use crate::telemetry::CorrelationId;

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum JournalEvent {
    Recovery(RecoveryAction),
    MonitorSummary {
        checked: usize,
        stalled: usize,
        retried: usize,
        failed: usize,
        dry_run: bool,
    },
    Launch {
        session: String,
        branch: String,
        worktree: PathBuf,
        agent: String,
    },
    Resume {
        session: String,
        state: String,
        retry: bool,
    },
    Cleanup {
        session: String,
        found: bool,
        worktree_removed: bool,
    },
    Integration {
        operation: String,
        feature: String,
        target: String,
        outcome: String,
    },
}

/// One journal line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub logged_at: DateTime<Utc>,
    pub correlation_id: CorrelationId,
    #[serde(flatten)]
    pub event: JournalEvent,
}

impl JournalEntry {
    pub fn new(correlation_id: CorrelationId, event: JournalEvent) -> Self {
        Self {
            logged_at: Utc::now(),
            correlation_id,
            event,
        }
    }
}

/// Rotating JSON-lines log file.
#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
    max_bytes: u64,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            path: path.into(),
            max_bytes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path the current file is renamed to on rotation.
    pub fn rotated_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".1");
        self.path.with_file_name(name)
    }

    fn rotate_if_needed(&self) -> io::Result<()> {
        let size = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        if self.max_bytes > 0 && size > self.max_bytes {
            match fs::rename(&self.path, self.rotated_path()) {
                Ok(()) => debug!(path = %self.path.display(), size, "rotated journal"),
                // another invocation rotated first
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Append one entry.
    pub fn append(&self, entry: &JournalEntry) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.rotate_if_needed()?;

        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }

    /// Append, logging instead of failing.
    pub fn record(&self, correlation_id: CorrelationId, event: JournalEvent) {
        if let Err(e) = self.append(&JournalEntry::new(correlation_id, event)) {
            warn!(path = %self.path.display(), error = %e, "could not write journal entry");
        }
    }

    /// Read the entries of the current file, skipping malformed lines.
    pub fn read_entries(&self) -> io::Result<Vec<JournalEntry>> {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => debug!(error = %e, "skipping malformed journal line"),
            }
        }
        Ok(entries)
    }
}
