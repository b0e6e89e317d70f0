// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Durable retry cooldown.
//!
//! Remembers when each `(session, reason)` pair was last retried so a session
//! that stays stalled is not nudged on every monitor pass. A zero window
//! disables the store and every stall is retried.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::classifier::StallReason;

/// File name of the store inside the state directory.
pub const COOLDOWN_FILE: &str = "cooldown.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct CooldownFile {
    #[serde(default)]
    last_retry: BTreeMap<String, DateTime<Utc>>,
}

/// `(session, reason) -> last retry` with a cooldown window.
#[derive(Debug)]
pub struct CooldownStore {
    path: PathBuf,
    window: Duration,
    entries: BTreeMap<String, DateTime<Utc>>,
    dirty: bool,
}

fn key(session: &str, reason: StallReason) -> String {
    format!("{session}|{reason}")
}

impl CooldownStore {
    /// Load the store from `state_dir`. A missing or unreadable file starts empty.
    pub fn load(state_dir: &Path, window: Duration) -> Self {
        let path = state_dir.join(COOLDOWN_FILE);
        let entries = if window.is_zero() {
            BTreeMap::new()
        } else {
            match std::fs::read_to_string(&path) {
                Ok(content) => match serde_json::from_str::<CooldownFile>(&content) {
                    Ok(file) => file.last_retry,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "ignoring corrupt cooldown store");
                        BTreeMap::new()
                    }
                },
                Err(_) => BTreeMap::new(),
            }
        };
        Self {
            path,
            window,
            entries,
            dirty: false,
        }
    }

    /// A store that never suppresses retries and never touches disk.
    pub fn disabled() -> Self {
        Self {
            path: PathBuf::new(),
            window: Duration::ZERO,
            entries: BTreeMap::new(),
            dirty: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.window.is_zero()
    }

    /// Whether a retry for this pair happened within the window before `now`.
    pub fn is_cooling(&self, session: &str, reason: StallReason, now: DateTime<Utc>) -> bool {
        if !self.is_enabled() {
            return false;
        }
        match self.entries.get(&key(session, reason)) {
            Some(last) => match (now - *last).to_std() {
                Ok(elapsed) => elapsed < self.window,
                // last retry is in the future (clock skew): treat as cooling
                Err(_) => true,
            },
            None => false,
        }
    }

    pub fn record(&mut self, session: &str, reason: StallReason, at: DateTime<Utc>) {
        if !self.is_enabled() {
            return;
        }
        self.entries.insert(key(session, reason), at);
        self.dirty = true;
    }

    /// Drop entries whose window has passed or whose session is gone.
    pub fn prune(&mut self, now: DateTime<Utc>, live_sessions: &[String]) {
        let window = self.window;
        let before = self.entries.len();
        self.entries.retain(|k, last| {
            let session = k.rsplit_once('|').map_or(k.as_str(), |(s, _)| s);
            let fresh = matches!((now - *last).to_std(), Ok(e) if e < window)
                || now < *last;
            fresh && live_sessions.iter().any(|l| l == session)
        });
        if self.entries.len() != before {
            self.dirty = true;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Persist changes, replacing the file atomically.
    pub fn save(&mut self) -> std::io::Result<()> {
        if !self.is_enabled() || !self.dirty {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = CooldownFile {
            last_retry: self.entries.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        self.dirty = false;
        debug!(path = %self.path.display(), entries = self.entries.len(), "saved cooldown store");
        Ok(())
    }
}
