//! Configuration loading.
//!
//! Layering, lowest precedence first: built-in defaults, `config.toml` in the
//! data directory, `DECK_*` environment variables (`__` separates sections,
//! e.g. `DECK_SERVER__PORT=4000`), then explicit command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub server: ServerSection,
    pub sessions: SessionsSection,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    pub static_dir: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsSection {
    pub max_sessions: usize,
    pub batch_window_ms: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            static_dir: None,
        }
    }
}

impl Default for SessionsSection {
    fn default() -> Self {
        Self {
            max_sessions: 4,
            batch_window_ms: 16,
        }
    }
}

/// Fully resolved runtime configuration.
#[derive(Clone, Debug)]
pub struct DeckConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: PathBuf,
    pub data_dir: PathBuf,
    pub max_sessions: usize,
    pub batch_window: Duration,
}

pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".deck")
}

pub fn load(data_dir: &Path) -> Result<FileConfig> {
    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("DECK_").split("__"))
        .extract()
        .context("loading configuration")
}

impl DeckConfig {
    pub fn resolve(
        file: FileConfig,
        data_dir: PathBuf,
        host: Option<String>,
        port: Option<u16>,
        static_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            host: host.unwrap_or(file.server.host),
            port: port.unwrap_or(file.server.port),
            static_dir: static_dir
                .or(file.server.static_dir)
                .unwrap_or_else(|| PathBuf::from("frontend/dist")),
            data_dir,
            max_sessions: file.sessions.max_sessions,
            batch_window: Duration::from_millis(file.sessions.batch_window_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_any_sources() {
        let tmp = tempfile::tempdir().unwrap();
        let file = load(&tmp.path().join("does-not-exist")).unwrap();
        assert_eq!(file.server.host, "127.0.0.1");
        assert_eq!(file.server.port, 3000);
        assert_eq!(file.server.static_dir, None);
        assert_eq!(file.sessions.max_sessions, 4);
        assert_eq!(file.sessions.batch_window_ms, 16);
    }

    #[test]
    fn file_overrides_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "[server]\nport = 4000\n\n[sessions]\nmax_sessions = 2\n",
        )
        .unwrap();

        let file = load(tmp.path()).unwrap();
        assert_eq!(file.server.port, 4000);
        assert_eq!(file.sessions.max_sessions, 2);
        assert_eq!(file.server.host, "127.0.0.1");
    }

    #[test]
    fn cli_flags_win_over_everything() {
        let file = FileConfig::default();
        let config = DeckConfig::resolve(
            file,
            PathBuf::from("/data"),
            Some("0.0.0.0".to_string()),
            Some(8080),
            None,
        );
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.static_dir, PathBuf::from("frontend/dist"));
        assert_eq!(config.batch_window, Duration::from_millis(16));
    }
}
