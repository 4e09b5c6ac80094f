//! Directory autocomplete for the session creation form.

use std::fs;
use std::path::{Path, PathBuf};

/// Suggest directories matching a partially typed path.
///
/// A leading `~` is expanded against the home directory and re-abbreviated in
/// the results. Only real directories are suggested, hidden ones are skipped,
/// and any filesystem error yields an empty list.
pub fn autocomplete(partial: &str) -> Vec<String> {
    autocomplete_with_home(partial, dirs::home_dir().as_deref())
}

fn autocomplete_with_home(partial: &str, home: Option<&Path>) -> Vec<String> {
    let expanded = match (partial.strip_prefix('~'), home) {
        (Some(rest), Some(home)) => format!("{}{}", home.to_string_lossy(), rest),
        _ => partial.to_string(),
    };

    // "/foo/ba" completes entries of /foo starting with "ba";
    // "/foo/" completes everything directly under /foo.
    let (parent, prefix) = if expanded.ends_with('/') {
        (PathBuf::from(&expanded), String::new())
    } else {
        let path = PathBuf::from(&expanded);
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));
        let prefix = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        (parent, prefix)
    };

    let Ok(entries) = fs::read_dir(&parent) else {
        return Vec::new();
    };

    let mut candidates: Vec<String> = entries
        .flatten()
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || !name.starts_with(&prefix) {
                return None;
            }
            let full = parent.join(&name).to_string_lossy().to_string();
            Some(match (partial.starts_with('~'), home) {
                (true, Some(home)) => full.replacen(&*home.to_string_lossy(), "~", 1),
                _ => full,
            })
        })
        .collect();

    candidates.sort();
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        for dir in ["projects", "photos", "misc", ".cache"] {
            fs::create_dir(tmp.path().join(dir)).unwrap();
        }
        fs::write(tmp.path().join("prose.txt"), "file, not dir").unwrap();
        tmp
    }

    #[test]
    fn completes_by_prefix() {
        let tmp = fixture();
        let partial = format!("{}/p", tmp.path().display());
        let got = autocomplete_with_home(&partial, None);
        assert_eq!(
            got,
            vec![
                format!("{}/photos", tmp.path().display()),
                format!("{}/projects", tmp.path().display()),
            ]
        );
    }

    #[test]
    fn trailing_slash_lists_all_visible_dirs() {
        let tmp = fixture();
        let partial = format!("{}/", tmp.path().display());
        let got = autocomplete_with_home(&partial, None);
        assert_eq!(got.len(), 3);
        assert!(got.iter().all(|c| !c.contains("/.cache")));
        assert!(got.iter().all(|c| !c.ends_with("prose.txt")));
    }

    #[test]
    fn tilde_is_expanded_and_reabbreviated() {
        let tmp = fixture();
        let got = autocomplete_with_home("~/pr", Some(tmp.path()));
        assert_eq!(got, vec!["~/projects".to_string()]);
    }

    #[test]
    fn unreadable_parent_yields_empty() {
        assert!(autocomplete_with_home("/no/such/dir/pre", None).is_empty());
    }

    #[test]
    fn sorted_output() {
        let tmp = fixture();
        let partial = format!("{}/", tmp.path().display());
        let got = autocomplete_with_home(&partial, None);
        let mut sorted = got.clone();
        sorted.sort();
        assert_eq!(got, sorted);
    }
}
