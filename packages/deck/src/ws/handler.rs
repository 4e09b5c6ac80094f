//! WebSocket connection lifecycle.
//!
//! Each upgraded socket is authorized with the broker (evicting any previous
//! connection), greeted with either `sync` or `restore-session`, then served
//! by a writer task draining the outbound queue while this task parses
//! inbound frames.

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::broker::OutboundFrame;
use super::dispatch;
use super::protocol::{ServerMessage, SyncSession};
use crate::AppState;

/// Outbound frames buffered per connection before the broker starts dropping.
const OUTBOUND_QUEUE: usize = 256;

/// `GET /ws?preset=<name>` asks for that preset as the restore greeting
/// instead of the last persisted session.
#[derive(Debug, Default, Deserialize)]
pub struct GreetingParams {
    pub preset: Option<String>,
}

pub async fn websocket_handler(
    State(state): State<AppState>,
    Query(params): Query<GreetingParams>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params))
}

async fn handle_socket(socket: WebSocket, state: AppState, params: GreetingParams) {
    let (tx, mut rx) = mpsc::channel::<OutboundFrame>(OUTBOUND_QUEUE);
    let token = state.broker.authorize(tx.clone());
    info!(conn = %token, "websocket connection authorized");

    send_greeting(&state, &tx, params.preset.as_deref()).await;

    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match frame {
                OutboundFrame::Message(msg) => {
                    let json = match serde_json::to_string(&msg) {
                        Ok(json) => json,
                        Err(e) => {
                            error!("failed to serialize server message: {}", e);
                            continue;
                        }
                    };
                    if ws_tx.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                OutboundFrame::Close { code, reason } => {
                    let _ = ws_tx
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => dispatch::handle_raw_message(&state, &tx, &text).await,
            Ok(Message::Binary(bytes)) => {
                let text = String::from_utf8_lossy(&bytes).to_string();
                dispatch::handle_raw_message(&state, &tx, &text).await;
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    // Stale for an evicted connection: the broker ignores it then.
    state.broker.release(&token);
    writer.abort();
    info!(conn = %token, "websocket connection closed");
}

/// Running sessions win over any saved layout: the client must reattach,
/// not respawn. An idle server restores the requested preset if one was
/// named, falling back to the last persisted session otherwise.
pub(crate) async fn send_greeting(
    state: &AppState,
    tx: &mpsc::Sender<OutboundFrame>,
    preset: Option<&str>,
) {
    let running = state.sessions.list();
    let greeting = if !running.is_empty() {
        Some(ServerMessage::Sync {
            sessions: running
                .into_iter()
                .map(|s| SyncSession {
                    id: s.id,
                    cwd: s.cwd,
                    cli: s.cli,
                    options: s.options,
                })
                .collect(),
        })
    } else {
        restore_greeting(state, preset)
    };

    if let Some(greeting) = greeting {
        let _ = tx.send(OutboundFrame::Message(greeting)).await;
    }
}

fn restore_greeting(state: &AppState, preset: Option<&str>) -> Option<ServerMessage> {
    if let Some(name) = preset {
        let found = state
            .store
            .load_presets()
            .into_iter()
            .find(|p| p.name == name);
        match found {
            Some(p) if !p.panels.is_empty() => {
                return Some(ServerMessage::RestoreSession {
                    panels: p.panels,
                    source: Some(p.name),
                });
            }
            _ => warn!(preset = %name, "requested preset not found, falling back to last session"),
        }
    }

    state
        .store
        .load_session()
        .filter(|saved| !saved.panels.is_empty())
        .map(|saved| ServerMessage::RestoreSession {
            panels: saved.panels,
            source: Some("last-session".to_string()),
        })
}
