//! Detection of recorded Claude CLI conversations for a working directory.
//!
//! The Claude CLI stores transcripts under `~/.claude/projects/<encoded cwd>`
//! as `.jsonl` files. Resume flags are only meaningful when at least one such
//! transcript exists; the dispatcher strips them otherwise.

use std::fs;
use std::path::{Path, PathBuf};

/// Encode a working directory the way the Claude CLI names its per-project
/// transcript directories: every character outside `[a-zA-Z0-9._-]` becomes
/// a dash.
pub fn encode_project_path(cwd: &str) -> String {
    cwd.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Whether any transcript exists for `cwd`.
pub fn has_recorded_conversations(cwd: &str) -> bool {
    let Some(home) = dirs::home_dir() else {
        return false;
    };
    has_recorded_conversations_in(&home.join(".claude").join("projects"), cwd)
}

pub fn has_recorded_conversations_in(projects_dir: &Path, cwd: &str) -> bool {
    let dir: PathBuf = projects_dir.join(encode_project_path(cwd));
    match fs::read_dir(&dir) {
        Ok(entries) => entries
            .flatten()
            .any(|e| e.path().extension().is_some_and(|ext| ext == "jsonl")),
        Err(_) => false,
    }
}
