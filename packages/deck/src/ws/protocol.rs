//! Wire protocol for the control WebSocket.
//!
//! Every frame is a JSON object tagged with a `type` field. Identifier fields
//! use camelCase on the wire (`panelId`, `exitCode`) to match the frontend.

use serde::{Deserialize, Serialize};

use crate::store::PresetPanel;

/// Messages the client sends to the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Start a new session running `cli` in `path` with the given options.
    #[serde(rename = "create")]
    Create {
        cli: String,
        path: String,
        #[serde(default)]
        options: String,
        #[serde(rename = "panelId", default, skip_serializing_if = "Option::is_none")]
        panel_id: Option<String>,
    },

    /// Keystrokes for a session's terminal.
    #[serde(rename = "input")]
    Input {
        #[serde(rename = "panelId")]
        panel_id: String,
        data: String,
    },

    #[serde(rename = "resize")]
    Resize {
        #[serde(rename = "panelId")]
        panel_id: String,
        cols: u16,
        rows: u16,
    },

    #[serde(rename = "kill")]
    Kill {
        #[serde(rename = "panelId")]
        panel_id: String,
    },

    /// Re-bind a surviving session after reconnect: resize it to the new
    /// terminal and replay its scrollback.
    #[serde(rename = "attach")]
    Attach {
        #[serde(rename = "panelId")]
        panel_id: String,
        cols: u16,
        rows: u16,
    },

    /// Directory suggestions for a partially typed path.
    #[serde(rename = "autocomplete")]
    Autocomplete {
        #[serde(rename = "panelId")]
        panel_id: String,
        partial: String,
    },

    /// Install the notification hook for the Claude CLI.
    #[serde(rename = "register-hook")]
    RegisterHook {
        #[serde(rename = "panelId")]
        panel_id: String,
    },
}

/// Messages the server sends to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "created")]
    Created {
        #[serde(rename = "panelId")]
        panel_id: String,
    },

    /// One flush window's worth of terminal output.
    #[serde(rename = "output")]
    Output {
        #[serde(rename = "panelId")]
        panel_id: String,
        data: String,
    },

    /// Final message for a session. Carries the child's exit code (0 for a
    /// clean exit, shell convention 128+signal such as 130/137/143 for
    /// signal deaths), or -1 when the process could not be spawned at all.
    #[serde(rename = "exited")]
    Exited {
        #[serde(rename = "panelId")]
        panel_id: String,
        #[serde(rename = "exitCode")]
        exit_code: i32,
    },

    /// Greeting when sessions are still running: the client re-attaches to
    /// these instead of restoring a saved layout.
    #[serde(rename = "sync")]
    Sync { sessions: Vec<SyncSession> },

    /// Greeting when nothing is running but a saved layout exists. `source`
    /// names where the layout came from: a preset name, or "last-session"
    /// for the automatically persisted one.
    #[serde(rename = "restore-session")]
    RestoreSession {
        panels: Vec<PresetPanel>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },

    #[serde(rename = "autocomplete-result")]
    AutocompleteResult {
        #[serde(rename = "panelId")]
        panel_id: String,
        candidates: Vec<String>,
    },

    #[serde(rename = "hook-status")]
    HookStatus {
        #[serde(rename = "panelId")]
        panel_id: String,
        connected: bool,
    },

    /// Forwarded notification from the CLI's hook script.
    #[serde(rename = "hook-notify")]
    HookNotify {
        #[serde(rename = "panelId")]
        panel_id: String,
        message: String,
    },

    /// `panel_id` is empty when the error is not tied to a session.
    #[serde(rename = "error")]
    Error {
        #[serde(rename = "panelId")]
        panel_id: String,
        message: String,
    },
}

/// A running session as described in the `sync` greeting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncSession {
    pub id: String,
    pub cwd: String,
    pub cli: String,
    pub options: String,
}
