//! Control message dispatcher.
//!
//! Parses inbound frames, applies them to the session manager and the
//! collaborators, and queues replies onto the connection's outbound channel.
//! Every failure becomes a structured `error` reply; nothing here tears down
//! the connection.

use tokio::sync::mpsc;
use tracing::debug;

use deck_pty::CreateSession;

use super::broker::OutboundFrame;
use super::protocol::{ClientMessage, ServerMessage};
use crate::store::PresetPanel;
use crate::{AppState, conversations, directory, hook};

/// Terminal geometry before the client attaches and reports the real one.
const DEFAULT_COLS: u16 = 80;
const DEFAULT_ROWS: u16 = 24;

const CLAUDE_CLI: &str = "claude";
const RESUME_FLAGS: &[&str] = &["-c", "--continue", "-r", "--resume"];

const KNOWN_TYPES: &[&str] = &[
    "create",
    "input",
    "resize",
    "kill",
    "attach",
    "autocomplete",
    "register-hook",
];

pub(crate) async fn handle_raw_message(
    state: &AppState,
    tx: &mpsc::Sender<OutboundFrame>,
    raw: &str,
) {
    match serde_json::from_str::<ClientMessage>(raw) {
        Ok(msg) => dispatch_client_message(state, tx, msg).await,
        Err(e) => {
            debug!("rejecting client frame: {}", e);
            reply(tx, parse_error_reply(raw)).await;
        }
    }
}

/// A frame that fails to parse as a [`ClientMessage`] is either a recognized
/// kind with a broken shape or an unknown kind; the two get distinct errors.
fn parse_error_reply(raw: &str) -> ServerMessage {
    let kind = serde_json::from_str::<serde_json::Value>(raw)
        .ok()
        .and_then(|v| v.get("type").and_then(|t| t.as_str().map(str::to_string)));
    let message = match kind {
        Some(kind) if !KNOWN_TYPES.contains(&kind.as_str()) => "unknown message type",
        _ => "invalid message",
    };
    ServerMessage::Error {
        panel_id: String::new(),
        message: message.to_string(),
    }
}

pub(crate) async fn dispatch_client_message(
    state: &AppState,
    tx: &mpsc::Sender<OutboundFrame>,
    msg: ClientMessage,
) {
    match msg {
        ClientMessage::Create {
            cli,
            path,
            options,
            panel_id,
        } => {
            let options = degrade_resume(&cli, &path, options);
            let args: Vec<String> = options.split_whitespace().map(str::to_string).collect();
            let result = state.sessions.create(CreateSession {
                command: cli.clone(),
                args,
                cwd: path,
                cols: DEFAULT_COLS,
                rows: DEFAULT_ROWS,
                panel_id,
                cli,
                options,
            });
            match result {
                Ok(id) => {
                    reply(tx, ServerMessage::Created { panel_id: id }).await;
                    persist_active_set(state);
                }
                Err(e) => {
                    reply(
                        tx,
                        ServerMessage::Error {
                            panel_id: String::new(),
                            message: e.to_string(),
                        },
                    )
                    .await;
                }
            }
        }

        ClientMessage::Input { panel_id, data } => {
            if let Err(e) = state.sessions.write(&panel_id, data.as_bytes()) {
                reply(
                    tx,
                    ServerMessage::Error {
                        panel_id,
                        message: e.to_string(),
                    },
                )
                .await;
            }
        }

        ClientMessage::Resize {
            panel_id,
            cols,
            rows,
        } => {
            if let Err(e) = state.sessions.resize(&panel_id, cols, rows) {
                reply(
                    tx,
                    ServerMessage::Error {
                        panel_id,
                        message: e.to_string(),
                    },
                )
                .await;
            }
        }

        ClientMessage::Kill { panel_id } => {
            state.sessions.kill(&panel_id);
            persist_active_set(state);
        }

        ClientMessage::Attach {
            panel_id,
            cols,
            rows,
        } => {
            // Resize doubles as the existence check; PTY-level refusals are
            // already swallowed by the manager.
            if let Err(e) = state.sessions.resize(&panel_id, cols, rows) {
                reply(
                    tx,
                    ServerMessage::Error {
                        panel_id,
                        message: e.to_string(),
                    },
                )
                .await;
                return;
            }
            if let Ok(data) = state.sessions.scrollback(&panel_id) {
                if !data.is_empty() {
                    reply(
                        tx,
                        ServerMessage::Output {
                            panel_id,
                            data: String::from_utf8_lossy(&data).to_string(),
                        },
                    )
                    .await;
                }
            }
        }

        ClientMessage::Autocomplete { panel_id, partial } => {
            let candidates = directory::autocomplete(&partial);
            reply(
                tx,
                ServerMessage::AutocompleteResult {
                    panel_id,
                    candidates,
                },
            )
            .await;
        }

        ClientMessage::RegisterHook { panel_id } => match hook::register(state.config.port) {
            Ok(()) => {
                reply(
                    tx,
                    ServerMessage::HookStatus {
                        panel_id,
                        connected: true,
                    },
                )
                .await;
            }
            Err(e) => {
                reply(
                    tx,
                    ServerMessage::Error {
                        panel_id,
                        message: format!("failed to register hook: {e}"),
                    },
                )
                .await;
            }
        },
    }
}

/// Persist the current set of running sessions as the restorable layout.
pub(crate) fn persist_active_set(state: &AppState) {
    let panels: Vec<PresetPanel> = state
        .sessions
        .list()
        .into_iter()
        .map(|s| PresetPanel {
            cli: s.cli,
            path: s.cwd,
            options: s.options,
        })
        .collect();
    if let Err(e) = state.store.save_session(panels) {
        debug!("failed to persist session layout: {}", e);
    }
}

/// Resume flags on the Claude CLI abort when no prior conversation exists for
/// the working directory. Strip them in that case so the session still opens,
/// just without resuming.
fn degrade_resume(cli: &str, cwd: &str, options: String) -> String {
    if !is_claude_cli(cli) || !wants_resume(&options) {
        return options;
    }
    if conversations::has_recorded_conversations(cwd) {
        return options;
    }
    debug!(cwd, "no recorded conversations, dropping resume flags");
    strip_resume_flags(&options)
}

fn is_claude_cli(cli: &str) -> bool {
    cli == CLAUDE_CLI
        || std::path::Path::new(cli)
            .file_name()
            .is_some_and(|name| name == CLAUDE_CLI)
}

fn wants_resume(options: &str) -> bool {
    options
        .split_whitespace()
        .any(|token| RESUME_FLAGS.contains(&token))
}

fn strip_resume_flags(options: &str) -> String {
    options
        .split_whitespace()
        .filter(|token| !RESUME_FLAGS.contains(token))
        .collect::<Vec<_>>()
        .join(" ")
}

async fn reply(tx: &mpsc::Sender<OutboundFrame>, msg: ServerMessage) {
    let _ = tx.send(OutboundFrame::Message(msg)).await;
}
