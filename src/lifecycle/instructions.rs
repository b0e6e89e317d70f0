// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Last instruction sent to each session, kept so `resume --retry` can
//! resend it verbatim.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Sent by `resume --retry` when nothing was recorded for the session.
pub const RETRY_FALLBACK: &str =
    "Retry the last instruction you were given and continue executing the remaining tasks.";

/// One text file per session under a state directory.
#[derive(Debug, Clone)]
pub struct InstructionStore {
    dir: PathBuf,
}

impl InstructionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, session: &str) -> PathBuf {
        let file: String = session
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{file}.txt"))
    }

    pub fn save(&self, session: &str, instruction: &str) -> io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(session);
        std::fs::write(&path, instruction)?;
        debug!(session, path = %path.display(), "recorded instruction");
        Ok(())
    }

    pub fn load(&self, session: &str) -> Option<String> {
        std::fs::read_to_string(self.path_for(session))
            .ok()
            .filter(|s| !s.trim().is_empty())
    }

    /// Forget a session's instruction. Missing entries are not an error.
    pub fn forget(&self, session: &str) -> io::Result<()> {
        match std::fs::remove_file(self.path_for(session)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_load_forget() {
        let temp = TempDir::new().unwrap();
        let store = InstructionStore::new(temp.path().join("instructions"));

        assert!(store.load("app-feat-a").is_none());
        store.save("app-feat-a", "do the thing").unwrap();
        assert_eq!(store.load("app-feat-a").as_deref(), Some("do the thing"));

        store.save("app-feat-a", "do the next thing").unwrap();
        assert_eq!(store.load("app-feat-a").as_deref(), Some("do the next thing"));

        store.forget("app-feat-a").unwrap();
        store.forget("app-feat-a").unwrap();
        assert!(store.load("app-feat-a").is_none());
    }

    #[test]
    fn test_unsafe_names_stay_in_dir() {
        let temp = TempDir::new().unwrap();
        let store = InstructionStore::new(temp.path());
        let path = store.path_for("../escape");
        assert_eq!(path.parent().unwrap(), temp.path());
    }
}
