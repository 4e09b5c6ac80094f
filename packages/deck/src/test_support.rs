//! Shared fixtures for handler and dispatcher tests.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use deck_pty::{EventSink, ProcessHandle, ProcessSpawner, PtyError, SessionManager, SpawnSpec};

use crate::AppState;
use crate::config::DeckConfig;
use crate::store::SessionStore;
use crate::ws::broker::{ConnectionBroker, OutboundFrame};
use crate::ws::protocol::ServerMessage;

/// Spawner whose processes accept everything and never produce output.
pub struct NullSpawner;

struct NullProcess;

impl ProcessSpawner for NullSpawner {
    fn spawn(
        &self,
        _spec: &SpawnSpec,
        _events: EventSink,
    ) -> Result<Box<dyn ProcessHandle>, PtyError> {
        Ok(Box::new(NullProcess))
    }
}

impl ProcessHandle for NullProcess {
    fn write(&mut self, _data: &[u8]) -> Result<(), PtyError> {
        Ok(())
    }

    fn resize(&mut self, _cols: u16, _rows: u16) -> Result<(), PtyError> {
        Ok(())
    }

    fn kill(&mut self) {}
}

/// App state backed by a temp data directory and the null spawner.
pub fn test_state() -> (AppState, tempfile::TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let config = DeckConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        static_dir: tmp.path().join("static"),
        data_dir: tmp.path().to_path_buf(),
        max_sessions: 4,
        batch_window: Duration::from_millis(16),
    };
    let sessions =
        SessionManager::with_limits(Arc::new(NullSpawner), config.max_sessions, config.batch_window);
    let state = AppState {
        sessions,
        broker: Arc::new(ConnectionBroker::new()),
        store: Arc::new(SessionStore::new(tmp.path().join("deck"))),
        config: Arc::new(config),
    };
    (state, tmp)
}

/// Next outbound frame, which must be a regular message.
pub async fn recv_message(rx: &mut mpsc::Receiver<OutboundFrame>) -> ServerMessage {
    match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
        Ok(Some(OutboundFrame::Message(msg))) => msg,
        other => panic!("expected a message frame, got {other:?}"),
    }
}
