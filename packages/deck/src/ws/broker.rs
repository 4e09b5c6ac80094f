//! Single-connection broker.
//!
//! The deck UI is a single local client, so exactly one WebSocket connection
//! is authorized at a time. A newer connection supersedes the current one,
//! which is told apart from a network drop by a dedicated close code so the
//! evicted tab does not fight back with reconnect attempts. Running sessions
//! are untouched by eviction.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use super::protocol::ServerMessage;

/// Close code sent to a displaced connection.
pub const SUPERSEDED_CLOSE_CODE: u16 = 4001;
pub const SUPERSEDED_REASON: &str = "superseded";

/// Frames queued toward one WebSocket connection.
#[derive(Debug)]
pub enum OutboundFrame {
    Message(ServerMessage),
    Close { code: u16, reason: &'static str },
}

struct ActiveConnection {
    id: String,
    tx: mpsc::Sender<OutboundFrame>,
}

#[derive(Default)]
pub struct ConnectionBroker {
    current: Mutex<Option<ActiveConnection>>,
}

impl ConnectionBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `tx` the authorized connection, evicting any previous one, and
    /// return the token to pass back to [`ConnectionBroker::release`].
    pub fn authorize(&self, tx: mpsc::Sender<OutboundFrame>) -> String {
        let id = Uuid::new_v4().to_string();
        let mut guard = self.lock();
        if let Some(prev) = guard.take() {
            info!(conn = %prev.id, "superseding connection");
            let _ = prev.tx.try_send(OutboundFrame::Close {
                code: SUPERSEDED_CLOSE_CODE,
                reason: SUPERSEDED_REASON,
            });
        }
        *guard = Some(ActiveConnection { id: id.clone(), tx });
        id
    }

    /// Clear the slot, but only if `id` still owns it. A release from an
    /// evicted connection arriving late must not knock out its successor.
    pub fn release(&self, id: &str) {
        let mut guard = self.lock();
        if guard.as_ref().is_some_and(|c| c.id == id) {
            *guard = None;
        }
    }

    /// Send to the authorized connection, if any. Returns whether the frame
    /// was queued; with no client connected events are simply dropped.
    pub fn send(&self, msg: ServerMessage) -> bool {
        let guard = self.lock();
        match guard.as_ref() {
            Some(conn) => match conn.tx.try_send(OutboundFrame::Message(msg)) {
                Ok(()) => true,
                Err(e) => {
                    debug!("dropping frame for slow or gone connection: {}", e);
                    false
                }
            },
            None => false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActiveConnection>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
