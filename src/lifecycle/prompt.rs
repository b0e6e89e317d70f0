// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Prompt templates.
//!
//! Templates are plain text with `$NAME` placeholders. A file in the
//! configured template directory overrides the built-in text.

use std::path::Path;

use tracing::{debug, warn};

/// Task description placeholder.
pub const TASK_DESCRIPTION: &str = "$TASK_DESCRIPTION";
/// Worktree directory placeholder.
pub const WORKTREE_DIR: &str = "$WORKTREE_DIR";
pub const FEATURE_BRANCH: &str = "$FEATURE_BRANCH";
pub const TARGET_BRANCH: &str = "$TARGET_BRANCH";
/// One-line description of where the conflicts are.
pub const WORKTREE_INFO: &str = "$WORKTREE_INFO";
/// `merge` or `rebase`.
pub const OPERATION: &str = "$OPERATION";
/// Newline-separated list of conflicted files.
pub const CONFLICTED_FILES: &str = "$CONFLICTED_FILES";
/// Command that finishes the operation once conflicts are resolved.
pub const CONTINUE_COMMAND: &str = "$CONTINUE_COMMAND";

const TASK_TEMPLATE: &str = "\
You are executing a large task autonomously in the git worktree at $WORKTREE_DIR.

## Your Task
$TASK_DESCRIPTION

## Working Rules
- Split the work into phases and track them in a todo list.
- Run each phase as a separate sub-task so context does not overflow.
- Commit after every completed phase with a clear message.
- Do not stop to ask for confirmation; make reasonable decisions and note them.

Start by reading the relevant specs and code, then plan, then execute.
";

const CONFLICT_TEMPLATE: &str = "\
You are resolving git conflicts left by an automated $OPERATION.

## Task
Integrate branch `$FEATURE_BRANCH` with `$TARGET_BRANCH`.

## Location
$WORKTREE_INFO

## Conflicted files
$CONFLICTED_FILES

## Steps
1. Read each conflicted file and understand both sides.
2. Resolve every conflict, keeping both changes where they are compatible.
3. Build and run the tests if the project has them.
4. Stage the resolved files with `git add`.
5. Finish with `$CONTINUE_COMMAND`. Repeat for any further conflicts.

Do not abort the $OPERATION and do not switch branches. Report when done.
";

/// Which built-in template to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Task,
    Conflict,
}

impl TemplateKind {
    /// File name looked up in the template directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Task => "task-prompt-template.md",
            Self::Conflict => "merge-rebase-prompt-template.md",
        }
    }

    pub fn builtin(&self) -> &'static str {
        match self {
            Self::Task => TASK_TEMPLATE,
            Self::Conflict => CONFLICT_TEMPLATE,
        }
    }
}

/// Load a template, preferring `<dir>/<file_name>` when it exists.
pub fn load_template(kind: TemplateKind, dir: Option<&Path>) -> String {
    if let Some(dir) = dir {
        let path = dir.join(kind.file_name());
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                debug!(path = %path.display(), "using template override");
                return text;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "could not read template"),
        }
    }
    kind.builtin().to_string()
}

/// Substitute `(placeholder, value)` pairs.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter()
        .fold(template.to_string(), |text, (key, value)| text.replace(key, value))
}

/// Render the launch prompt for a task.
pub fn task_prompt(dir: Option<&Path>, description: &str, worktree: &Path) -> String {
    let worktree = worktree.to_string_lossy();
    render(
        &load_template(TemplateKind::Task, dir),
        &[(TASK_DESCRIPTION, description), (WORKTREE_DIR, worktree.as_ref())],
    )
}

/// Inputs for a conflict-resolution prompt.
#[derive(Debug, Clone)]
pub struct ConflictPrompt<'a> {
    pub operation: &'a str,
    pub feature: &'a str,
    pub target: &'a str,
    pub location: &'a Path,
    /// Worktree of the feature branch, when it has one.
    pub worktree: Option<&'a Path>,
    pub files: &'a [String],
    pub continue_command: &'a str,
}

impl ConflictPrompt<'_> {
    pub fn render(&self, dir: Option<&Path>) -> String {
        let location = self.location.to_string_lossy();
        let info = match self.worktree {
            Some(path) => format!(
                "Worktree exists at: {}\nConflicts are in: {}",
                path.display(),
                location
            ),
            None => format!("No worktree (direct {}) in: {}", self.operation, location),
        };
        let files = if self.files.is_empty() {
            "(run `git status` to list them)".to_string()
        } else {
            self.files
                .iter()
                .map(|f| format!("- {f}"))
                .collect::<Vec<_>>()
                .join("\n")
        };
        render(
            &load_template(TemplateKind::Conflict, dir),
            &[
                (OPERATION, self.operation),
                (FEATURE_BRANCH, self.feature),
                (TARGET_BRANCH, self.target),
                (WORKTREE_INFO, &info),
                (WORKTREE_DIR, location.as_ref()),
                (CONFLICTED_FILES, &files),
                (CONTINUE_COMMAND, self.continue_command),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_task_prompt_builtin() {
        let prompt = task_prompt(None, "Implement the proxy", Path::new("/code/app-feat"));
        assert!(prompt.contains("Implement the proxy"));
        assert!(prompt.contains("/code/app-feat"));
        assert!(!prompt.contains('$'));
    }

    #[test]
    fn test_template_override() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("task-prompt-template.md"),
            "DO: $TASK_DESCRIPTION @ $WORKTREE_DIR",
        )
        .unwrap();
        let prompt = task_prompt(Some(temp.path()), "x", Path::new("/w"));
        assert_eq!(prompt, "DO: x @ /w");
    }

    #[test]
    fn test_missing_override_falls_back() {
        let temp = TempDir::new().unwrap();
        assert_eq!(
            load_template(TemplateKind::Conflict, Some(temp.path())),
            CONFLICT_TEMPLATE
        );
    }

    #[test]
    fn test_conflict_prompt() {
        let files = vec!["src/lib.rs".to_string()];
        let prompt = ConflictPrompt {
            operation: "rebase",
            feature: "feat/x",
            target: "main",
            location: Path::new("/code/app-feat-x"),
            worktree: Some(Path::new("/code/app-feat-x")),
            files: &files,
            continue_command: "git rebase --continue",
        }
        .render(None);
        assert!(prompt.contains("automated rebase"));
        assert!(prompt.contains("`feat/x` with `main`"));
        assert!(prompt.contains("- src/lib.rs"));
        assert!(prompt.contains("Worktree exists at: /code/app-feat-x"));
        assert!(prompt.contains("`git rebase --continue`"));
        assert!(!prompt.contains('$'));
    }
}
