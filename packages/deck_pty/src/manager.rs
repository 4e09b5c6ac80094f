use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::process::{EventSink, ProcessHandle, ProcessSpawner, RawEvent, SpawnSpec};

/// Environment variable a child can use to identify its own panel, and the
/// marker the notification hook script reads back.
pub const PANEL_ID_ENV: &str = "DECK_PANEL_ID";

/// Sentinel exit code reported when the child could not be spawned at all.
pub const SPAWN_FAILED_EXIT_CODE: i32 = -1;

const DEFAULT_MAX_SESSIONS: usize = 4;
const DEFAULT_BATCH_WINDOW: Duration = Duration::from_millis(16);

/// Per-session scrollback retained for attach replay. Oldest bytes are
/// discarded beyond this.
const SCROLLBACK_LIMIT: usize = 256 * 1024;

/// Request to start a new session.
#[derive(Clone, Debug)]
pub struct CreateSession {
    /// Executable to launch.
    pub command: String,
    pub args: Vec<String>,
    pub cwd: String,
    pub cols: u16,
    pub rows: u16,
    /// Caller-chosen id; a fresh one is allocated when absent.
    pub panel_id: Option<String>,
    /// Display name of the CLI, echoed back verbatim on reconnect sync.
    pub cli: String,
    /// Original option string, echoed back verbatim on reconnect sync.
    pub options: String,
}

/// Descriptive attributes of a running session.
#[derive(Clone, Debug)]
pub struct SessionInfo {
    pub id: String,
    pub cli: String,
    pub options: String,
    pub cwd: String,
    pub cols: u16,
    pub rows: u16,
}

/// Events fanned out to subscribers after batching. `Output` carries all
/// bytes a session produced within one flush window. With no subscribers
/// events are dropped, never queued.
#[derive(Clone, Debug)]
pub enum SessionEvent {
    Output { id: String, data: Vec<u8> },
    Exited { id: String, exit_code: i32 },
}

struct SessionEntry {
    handle: Box<dyn ProcessHandle>,
    info: SessionInfo,
    scrollback: Vec<u8>,
}

struct Inner {
    sessions: HashMap<String, SessionEntry>,
    /// Pending output per session, drained on each flush.
    accumulators: HashMap<String, Vec<u8>>,
    /// Whether a flush is already scheduled. One timer serves all sessions.
    flush_armed: bool,
}

/// Owns all running sessions and their output batching.
///
/// All mutation happens under one lock, so the capacity check plus insert in
/// [`SessionManager::create`] is atomic, and a flush never interleaves with
/// writes to the accumulators.
pub struct SessionManager {
    inner: Arc<Mutex<Inner>>,
    spawner: Arc<dyn ProcessSpawner>,
    raw_tx: mpsc::UnboundedSender<RawEvent>,
    event_tx: broadcast::Sender<SessionEvent>,
    max_sessions: usize,
    batch_window: Duration,
}

impl SessionManager {
    pub fn new(spawner: Arc<dyn ProcessSpawner>) -> Arc<Self> {
        Self::with_limits(spawner, DEFAULT_MAX_SESSIONS, DEFAULT_BATCH_WINDOW)
    }

    /// Must be called from within a tokio runtime; the event pump task is
    /// spawned here.
    pub fn with_limits(
        spawner: Arc<dyn ProcessSpawner>,
        max_sessions: usize,
        batch_window: Duration,
    ) -> Arc<Self> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(1024);

        let manager = Arc::new(Self {
            inner: Arc::new(Mutex::new(Inner {
                sessions: HashMap::new(),
                accumulators: HashMap::new(),
                flush_armed: false,
            })),
            spawner,
            raw_tx,
            event_tx,
            max_sessions,
            batch_window,
        });

        tokio::spawn(pump(
            manager.inner.clone(),
            raw_rx,
            manager.event_tx.clone(),
            manager.batch_window,
        ));

        manager
    }

    /// Subscribe to batched session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Start a new session and return its id.
    ///
    /// Fails with [`SessionError::Capacity`] when the running-session limit
    /// is reached. A spawn failure is not an error: the id is returned and an
    /// `Exited` event with [`SPAWN_FAILED_EXIT_CODE`] follows immediately.
    pub fn create(&self, req: CreateSession) -> Result<String, SessionError> {
        let id = req
            .panel_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let spec = SpawnSpec {
            command: req.command.clone(),
            args: req.args,
            cwd: req.cwd.clone(),
            cols: req.cols,
            rows: req.rows,
            env: vec![
                (PANEL_ID_ENV.to_string(), id.clone()),
                // Cleared so a nested agent CLI does not think it is running
                // inside another agent session.
                ("CLAUDECODE".to_string(), String::new()),
            ],
        };
        let sink = EventSink::new(id.clone(), self.raw_tx.clone());

        let mut guard = self.lock();
        if guard.sessions.len() >= self.max_sessions {
            return Err(SessionError::Capacity {
                max: self.max_sessions,
            });
        }

        match self.spawner.spawn(&spec, sink) {
            Ok(handle) => {
                info!(session = %id, command = %req.command, "session started");
                guard.sessions.insert(
                    id.clone(),
                    SessionEntry {
                        handle,
                        info: SessionInfo {
                            id: id.clone(),
                            cli: req.cli,
                            options: req.options,
                            cwd: req.cwd,
                            cols: req.cols,
                            rows: req.rows,
                        },
                        scrollback: Vec::new(),
                    },
                );
                Ok(id)
            }
            Err(e) => {
                warn!(session = %id, "spawn failed: {}", e);
                let _ = self.raw_tx.send(RawEvent::Exited {
                    id: id.clone(),
                    exit_code: SPAWN_FAILED_EXIT_CODE,
                });
                Ok(id)
            }
        }
    }

    /// Feed input bytes to a session's terminal.
    pub fn write(&self, id: &str, data: &[u8]) -> Result<(), SessionError> {
        let mut guard = self.lock();
        let entry = guard
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        entry.handle.write(data)?;
        Ok(())
    }

    /// Resize a session's terminal. Unknown ids are an error; a resize
    /// refused by the PTY itself is not, since the process may be mid-exit.
    pub fn resize(&self, id: &str, cols: u16, rows: u16) -> Result<(), SessionError> {
        let mut guard = self.lock();
        let entry = guard
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        match entry.handle.resize(cols, rows) {
            Ok(()) => {
                entry.info.cols = cols;
                entry.info.rows = rows;
            }
            Err(e) => debug!(session = %id, "resize ignored: {}", e),
        }
        Ok(())
    }

    /// Terminate a session. A no-op for unknown or already-exited ids. The
    /// `Exited` event is emitted later, once the child actually dies.
    pub fn kill(&self, id: &str) {
        let mut guard = self.lock();
        if let Some(mut entry) = guard.sessions.remove(id) {
            info!(session = %id, "killing session");
            entry.handle.kill();
        }
    }

    /// Terminate every session and discard all pending output. Used at
    /// server shutdown.
    pub fn kill_all(&self) {
        let mut guard = self.lock();
        guard.accumulators.clear();
        let drained: Vec<(String, SessionEntry)> = guard.sessions.drain().collect();
        drop(guard);
        for (id, mut entry) in drained {
            info!(session = %id, "killing session");
            entry.handle.kill();
        }
    }

    pub fn has(&self, id: &str) -> bool {
        self.lock().sessions.contains_key(id)
    }

    pub fn count(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Snapshot of all running sessions.
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self
            .lock()
            .sessions
            .values()
            .map(|e| e.info.clone())
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    /// Retained output of a running session, for replay on attach.
    pub fn scrollback(&self, id: &str) -> Result<Vec<u8>, SessionError> {
        let guard = self.lock();
        guard
            .sessions
            .get(id)
            .map(|e| e.scrollback.clone())
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drains raw process events into accumulators and schedules flushes.
async fn pump(
    inner: Arc<Mutex<Inner>>,
    mut raw_rx: mpsc::UnboundedReceiver<RawEvent>,
    event_tx: broadcast::Sender<SessionEvent>,
    window: Duration,
) {
    while let Some(event) = raw_rx.recv().await {
        match event {
            RawEvent::Data { id, bytes } => {
                let arm = {
                    let mut guard = inner.lock().unwrap_or_else(PoisonError::into_inner);
                    if let Some(entry) = guard.sessions.get_mut(&id) {
                        push_scrollback(&mut entry.scrollback, &bytes);
                    }
                    guard
                        .accumulators
                        .entry(id)
                        .or_default()
                        .extend_from_slice(&bytes);
                    !std::mem::replace(&mut guard.flush_armed, true)
                };
                if arm {
                    let inner = inner.clone();
                    let event_tx = event_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(window).await;
                        flush_all(&inner, &event_tx);
                    });
                }
            }
            RawEvent::Exited { id, exit_code } => {
                // Flush what the child wrote in its final window before
                // announcing the exit, so no output is ever lost or
                // delivered after `Exited`. Both sends happen under the
                // lock (broadcast send never blocks) so a concurrent
                // shared flush cannot slip its `Output` in after our
                // `Exited`: whoever claims the accumulator also emits.
                let mut guard = inner.lock().unwrap_or_else(PoisonError::into_inner);
                guard.sessions.remove(&id);
                if let Some(data) = guard.accumulators.remove(&id) {
                    if !data.is_empty() {
                        let _ = event_tx.send(SessionEvent::Output {
                            id: id.clone(),
                            data,
                        });
                    }
                }
                info!(session = %id, exit_code, "session exited");
                let _ = event_tx.send(SessionEvent::Exited { id, exit_code });
            }
        }
    }
}

fn flush_all(inner: &Arc<Mutex<Inner>>, event_tx: &broadcast::Sender<SessionEvent>) {
    // Drain and emit under one lock acquisition. Emitting after release
    // would let the exit path observe an already-drained accumulator and
    // send `Exited` before the claimed bytes go out.
    let mut guard = inner.lock().unwrap_or_else(PoisonError::into_inner);
    guard.flush_armed = false;
    for (id, data) in guard.accumulators.drain() {
        if !data.is_empty() {
            let _ = event_tx.send(SessionEvent::Output { id, data });
        }
    }
}

fn push_scrollback(scrollback: &mut Vec<u8>, bytes: &[u8]) {
    scrollback.extend_from_slice(bytes);
    if scrollback.len() > SCROLLBACK_LIMIT {
        let excess = scrollback.len() - SCROLLBACK_LIMIT;
        scrollback.drain(..excess);
    }
}
