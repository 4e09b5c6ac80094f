//! Control channel: wire protocol, connection broker, dispatcher, handler.

pub mod broker;
pub mod dispatch;
pub mod handler;
pub mod protocol;

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use deck_pty::{SessionEvent, SessionManager};

use broker::ConnectionBroker;
use protocol::ServerMessage;

/// Forward batched session events to whichever connection is authorized.
/// Events arriving while no client is connected are dropped, not queued.
pub fn spawn_event_forwarder(sessions: Arc<SessionManager>, broker: Arc<ConnectionBroker>) {
    let mut rx = sessions.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(SessionEvent::Output { id, data }) => {
                    broker.send(ServerMessage::Output {
                        panel_id: id,
                        data: String::from_utf8_lossy(&data).to_string(),
                    });
                }
                Ok(SessionEvent::Exited { id, exit_code }) => {
                    broker.send(ServerMessage::Exited {
                        panel_id: id,
                        exit_code,
                    });
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("session event stream lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}
