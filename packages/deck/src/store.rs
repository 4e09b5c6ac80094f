//! JSON-file persistence for presets and the last session layout.
//!
//! Everything lives under the deck data directory (`~/.deck` by default).
//! Reads degrade to empty on any failure so a corrupt or missing file never
//! takes the server down; writes replace the file wholesale.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

const PRESETS_FILE: &str = "presets.json";
const SESSION_FILE: &str = "session.json";

/// One panel of a layout: which CLI to run, where, and with what options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PresetPanel {
    pub cli: String,
    pub path: String,
    #[serde(default)]
    pub options: String,
}

/// A named, user-saved layout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    pub panels: Vec<PresetPanel>,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

/// The automatically persisted layout of the most recent session set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub panels: Vec<PresetPanel>,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
}

pub struct SessionStore {
    base_dir: PathBuf,
}

impl SessionStore {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn load_presets(&self) -> Vec<Preset> {
        read_json(&self.base_dir.join(PRESETS_FILE)).unwrap_or_default()
    }

    /// Insert or replace a preset by name.
    pub fn save_preset(&self, preset: Preset) -> Result<()> {
        let mut presets = self.load_presets();
        presets.retain(|p| p.name != preset.name);
        presets.push(preset);
        self.write_presets(&presets)
    }

    /// Replace the preset stored under `original_name`, allowing a rename.
    /// Unknown names fall through to an insert.
    pub fn update_preset(&self, original_name: &str, preset: Preset) -> Result<()> {
        let mut presets = self.load_presets();
        presets.retain(|p| p.name != original_name && p.name != preset.name);
        presets.push(preset);
        self.write_presets(&presets)
    }

    pub fn delete_preset(&self, name: &str) -> Result<()> {
        let mut presets = self.load_presets();
        presets.retain(|p| p.name != name);
        self.write_presets(&presets)
    }

    pub fn load_session(&self) -> Option<SessionState> {
        read_json(&self.base_dir.join(SESSION_FILE))
    }

    /// Overwrite the persisted layout with the current one.
    pub fn save_session(&self, panels: Vec<PresetPanel>) -> Result<()> {
        let state = SessionState {
            panels,
            updated_at: chrono::Utc::now().to_rfc3339(),
        };
        self.write_json(SESSION_FILE, &state)
    }

    fn write_presets(&self, presets: &[Preset]) -> Result<()> {
        self.write_json(PRESETS_FILE, &presets)
    }

    fn write_json<T: Serialize>(&self, file: &str, value: &T) -> Result<()> {
        fs::create_dir_all(&self.base_dir)
            .with_context(|| format!("creating {}", self.base_dir.display()))?;
        let path = self.base_dir.join(file);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Option<T> {
    let raw = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("ignoring unreadable {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, SessionStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::new(tmp.path().join("deck"));
        (tmp, store)
    }

    fn preset(name: &str) -> Preset {
        Preset {
            name: name.to_string(),
            panels: vec![PresetPanel {
                cli: "claude".to_string(),
                path: "/home/me/project".to_string(),
                options: "--model opus".to_string(),
            }],
            created_at: "2025-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn presets_round_trip() {
        let (_tmp, store) = store();
        store.save_preset(preset("work")).unwrap();
        store.save_preset(preset("play")).unwrap();

        let loaded = store.load_presets();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.iter().any(|p| p.name == "work"));
    }

    #[test]
    fn save_preset_replaces_same_name() {
        let (_tmp, store) = store();
        store.save_preset(preset("work")).unwrap();
        let mut updated = preset("work");
        updated.panels[0].options = "-c".to_string();
        store.save_preset(updated).unwrap();

        let loaded = store.load_presets();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].panels[0].options, "-c");
    }

    #[test]
    fn update_preset_can_rename() {
        let (_tmp, store) = store();
        store.save_preset(preset("old")).unwrap();
        store.update_preset("old", preset("new")).unwrap();

        let loaded = store.load_presets();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "new");
    }

    #[test]
    fn delete_preset_filters_by_name() {
        let (_tmp, store) = store();
        store.save_preset(preset("keep")).unwrap();
        store.save_preset(preset("drop")).unwrap();
        store.delete_preset("drop").unwrap();

        let loaded = store.load_presets();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "keep");
        // Deleting again is harmless.
        store.delete_preset("drop").unwrap();
    }

    #[test]
    fn missing_files_degrade_to_empty() {
        let (_tmp, store) = store();
        assert!(store.load_presets().is_empty());
        assert!(store.load_session().is_none());
    }

    #[test]
    fn corrupt_files_degrade_to_empty() {
        let (_tmp, store) = store();
        store.save_preset(preset("x")).unwrap();
        let base = store.base_dir.clone();
        fs::write(base.join(PRESETS_FILE), "{not json").unwrap();
        fs::write(base.join(SESSION_FILE), "[]").unwrap();

        assert!(store.load_presets().is_empty());
        assert!(store.load_session().is_none());
    }

    #[test]
    fn session_is_overwritten_wholesale() {
        let (_tmp, store) = store();
        store
            .save_session(vec![PresetPanel {
                cli: "claude".to_string(),
                path: "/a".to_string(),
                options: String::new(),
            }])
            .unwrap();
        store.save_session(vec![]).unwrap();

        let state = store.load_session().unwrap();
        assert!(state.panels.is_empty());
        assert!(!state.updated_at.is_empty());
    }
}
