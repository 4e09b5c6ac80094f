//! Notification hook installer for the Claude CLI.
//!
//! Writes `~/.claude/hooks/deck-notify.sh` and registers it under the
//! `hooks.Notification` array in `~/.claude/settings.json`. The script posts
//! `{panelId, message}` back to this server over raw bash TCP when the CLI
//! wants the user's attention. Registration is idempotent: stale deck entries
//! are removed first, so re-registering after a port change just replaces the
//! old entry.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::{Value, json};

use deck_pty::PANEL_ID_ENV;

const SCRIPT_NAME: &str = "deck-notify.sh";

fn build_script(port: u16) -> String {
    format!(
        "#!/bin/bash\n\
         cat > /dev/null\n\
         B='{{\"panelId\":\"'$DECK_PANEL_ID'\",\"message\":\"input\"}}'\n\
         exec 3<>/dev/tcp/127.0.0.1/{port} 2>/dev/null && \
         printf 'POST /hook/notify HTTP/1.0\\r\\nContent-Type: application/json\\r\\nContent-Length: %s\\r\\n\\r\\n%s' \
         \"${{#B}}\" \"$B\" >&3 && exec 3>&-\n"
    )
}

fn claude_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|h| h.join(".claude"))
        .context("home directory not found")
}

/// Install the hook script and register it in settings.json.
pub fn register(port: u16) -> Result<()> {
    register_in(&claude_dir()?, port)
}

/// Whether a deck notification hook is currently registered.
pub fn check() -> bool {
    claude_dir().map(|dir| check_in(&dir)).unwrap_or(false)
}

fn register_in(dir: &Path, port: u16) -> Result<()> {
    let script_path = dir.join("hooks").join(SCRIPT_NAME);
    fs::create_dir_all(dir.join("hooks"))
        .with_context(|| format!("creating {}", dir.join("hooks").display()))?;
    fs::write(&script_path, build_script(port))
        .with_context(|| format!("writing {}", script_path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&script_path, fs::Permissions::from_mode(0o755))?;
    }

    let settings_path = dir.join("settings.json");
    let mut settings = read_settings(&settings_path);

    if let Some(root) = settings.as_object_mut() {
        let hooks = root.entry("hooks").or_insert_with(|| json!({}));
        if !hooks.is_object() {
            *hooks = json!({});
        }
        if let Some(hooks) = hooks.as_object_mut() {
            let mut entries: Vec<Value> = match hooks.get("Notification") {
                Some(Value::Array(arr)) => arr.clone(),
                _ => Vec::new(),
            };
            entries.retain(|e| !entry_has_deck_hook(e));
            entries.push(json!({
                "hooks": [{ "type": "command", "command": script_path.to_string_lossy() }],
            }));
            hooks.insert("Notification".to_string(), Value::Array(entries));
        }
    }

    let rendered = serde_json::to_string_pretty(&settings)?;
    fs::write(&settings_path, format!("{rendered}\n"))
        .with_context(|| format!("writing {}", settings_path.display()))?;
    Ok(())
}

fn check_in(dir: &Path) -> bool {
    let settings = read_settings(&dir.join("settings.json"));
    settings
        .get("hooks")
        .and_then(|h| h.get("Notification"))
        .and_then(Value::as_array)
        .is_some_and(|entries| entries.iter().any(entry_has_deck_hook))
}

/// Existing settings, or an empty object when missing or unparseable.
fn read_settings(path: &Path) -> Value {
    fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .filter(Value::is_object)
        .unwrap_or_else(|| json!({}))
}

fn is_deck_command(command: &str) -> bool {
    command.contains(PANEL_ID_ENV) || command.contains(SCRIPT_NAME)
}

/// Both the current settings format (`{ hooks: [{ command }] }`) and the
/// legacy flat one (`{ type: "command", command }`) are recognized.
fn entry_has_deck_hook(entry: &Value) -> bool {
    if let Some(hooks) = entry.get("hooks").and_then(Value::as_array) {
        return hooks
            .iter()
            .filter_map(|h| h.get("command").and_then(Value::as_str))
            .any(is_deck_command);
    }
    entry
        .get("command")
        .and_then(Value::as_str)
        .is_some_and(is_deck_command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_writes_executable_script() {
        let tmp = tempfile::tempdir().unwrap();
        register_in(tmp.path(), 3000).unwrap();

        let script_path = tmp.path().join("hooks").join(SCRIPT_NAME);
        let script = fs::read_to_string(&script_path).unwrap();
        assert!(script.starts_with("#!/bin/bash"));
        assert!(script.contains("/dev/tcp/127.0.0.1/3000"));
        assert!(script.contains("POST /hook/notify"));
        assert!(script.contains("$DECK_PANEL_ID"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&script_path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn register_creates_settings_from_scratch() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(!check_in(tmp.path()));

        register_in(tmp.path(), 3000).unwrap();
        assert!(check_in(tmp.path()));

        let settings: Value =
            serde_json::from_str(&fs::read_to_string(tmp.path().join("settings.json")).unwrap())
                .unwrap();
        let entries = settings["hooks"]["Notification"].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        let command = entries[0]["hooks"][0]["command"].as_str().unwrap();
        assert!(command.ends_with(SCRIPT_NAME));
    }

    #[test]
    fn register_preserves_foreign_settings_and_hooks() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("settings.json"),
            r#"{
                "model": "opus",
                "hooks": {
                    "Notification": [
                        { "hooks": [{ "type": "command", "command": "say done" }] }
                    ],
                    "PreToolUse": [{ "hooks": [{ "type": "command", "command": "lint" }] }]
                }
            }"#,
        )
        .unwrap();

        register_in(tmp.path(), 3000).unwrap();

        let settings: Value =
            serde_json::from_str(&fs::read_to_string(tmp.path().join("settings.json")).unwrap())
                .unwrap();
        assert_eq!(settings["model"], "opus");
        assert!(settings["hooks"]["PreToolUse"].is_array());
        let entries = settings["hooks"]["Notification"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["hooks"][0]["command"], "say done");
    }

    #[test]
    fn register_is_idempotent_and_replaces_stale_entries() {
        let tmp = tempfile::tempdir().unwrap();
        // Legacy flat format entry from an earlier install.
        fs::write(
            tmp.path().join("settings.json"),
            r#"{"hooks":{"Notification":[{"type":"command","command":"curl -d $DECK_PANEL_ID localhost:9999"}]}}"#,
        )
        .unwrap();

        register_in(tmp.path(), 3000).unwrap();
        register_in(tmp.path(), 4000).unwrap();

        let settings: Value =
            serde_json::from_str(&fs::read_to_string(tmp.path().join("settings.json")).unwrap())
                .unwrap();
        let entries = settings["hooks"]["Notification"].as_array().unwrap();
        assert_eq!(entries.len(), 1);

        let script = fs::read_to_string(tmp.path().join("hooks").join(SCRIPT_NAME)).unwrap();
        assert!(script.contains("/dev/tcp/127.0.0.1/4000"));
    }

    #[test]
    fn corrupt_settings_are_replaced_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("settings.json"), "{broken").unwrap();

        register_in(tmp.path(), 3000).unwrap();
        assert!(check_in(tmp.path()));
    }
}
