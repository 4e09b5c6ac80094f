//! Child process abstraction.
//!
//! [`PtySpawner`] is the production implementation on top of portable-pty.
//! Tests swap in fakes that implement the same traits.

use std::io::{Read, Write};

use portable_pty::{ChildKiller, CommandBuilder, MasterPty, PtySize, native_pty_system};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::PtyError;

/// What to launch and the initial terminal geometry.
#[derive(Clone, Debug)]
pub struct SpawnSpec {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: String,
    pub cols: u16,
    pub rows: u16,
    /// Extra environment entries layered on top of the inherited ones.
    pub env: Vec<(String, String)>,
}

/// Events flowing from a child process into the session manager, before
/// batching. For a given session every `Data` precedes the final `Exited`.
#[derive(Debug)]
pub enum RawEvent {
    Data { id: String, bytes: Vec<u8> },
    Exited { id: String, exit_code: i32 },
}

/// Sink a spawner reports through, tagged with the owning session id.
#[derive(Clone)]
pub struct EventSink {
    id: String,
    tx: mpsc::UnboundedSender<RawEvent>,
}

impl EventSink {
    pub(crate) fn new(id: String, tx: mpsc::UnboundedSender<RawEvent>) -> Self {
        Self { id, tx }
    }

    pub fn data(&self, bytes: Vec<u8>) {
        let _ = self.tx.send(RawEvent::Data {
            id: self.id.clone(),
            bytes,
        });
    }

    pub fn exited(&self, exit_code: i32) {
        let _ = self.tx.send(RawEvent::Exited {
            id: self.id.clone(),
            exit_code,
        });
    }
}

/// A live child process bound to a pseudo-terminal.
pub trait ProcessHandle: Send {
    fn write(&mut self, data: &[u8]) -> Result<(), PtyError>;
    fn resize(&mut self, cols: u16, rows: u16) -> Result<(), PtyError>;
    /// Request termination. Must be safe to call on an already-dead process.
    fn kill(&mut self);
}

/// Spawns child processes for the session manager.
pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self, spec: &SpawnSpec, events: EventSink) -> Result<Box<dyn ProcessHandle>, PtyError>;
}

/// Production spawner backed by the platform PTY.
pub struct PtySpawner;

struct PtyProcess {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    killer: Box<dyn ChildKiller + Send + Sync>,
    pid: Option<u32>,
}

impl ProcessSpawner for PtySpawner {
    fn spawn(&self, spec: &SpawnSpec, events: EventSink) -> Result<Box<dyn ProcessHandle>, PtyError> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: spec.rows,
                cols: spec.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::OpenFailed(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&spec.command);
        for arg in &spec.args {
            cmd.arg(arg);
        }
        cmd.cwd(&spec.cwd);
        cmd.env("TERM", "xterm-256color");
        cmd.env("COLORTERM", "truecolor");
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::SpawnFailed {
                command: spec.command.clone(),
                reason: e.to_string(),
            })?;
        drop(pair.slave);

        let pid = child.process_id();
        let killer = child.clone_killer();
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::OpenFailed(e.to_string()))?;
        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::OpenFailed(e.to_string()))?;

        // A single thread drains the PTY to EOF, then reaps the child.
        // Emitting `Exited` from the same thread keeps it ordered after
        // every `Data` event for this session.
        std::thread::spawn(move || {
            let mut buf = vec![0u8; 8192];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => events.data(buf[..n].to_vec()),
                    Err(e) => {
                        debug!("pty read ended: {}", e);
                        break;
                    }
                }
            }
            let exit_code = match child.wait() {
                Ok(status) => status.exit_code() as i32,
                Err(e) => {
                    warn!("failed to reap child: {}", e);
                    -1
                }
            };
            events.exited(exit_code);
        });

        Ok(Box::new(PtyProcess {
            master: pair.master,
            writer,
            killer,
            pid,
        }))
    }
}

impl ProcessHandle for PtyProcess {
    fn write(&mut self, data: &[u8]) -> Result<(), PtyError> {
        self.writer
            .write_all(data)
            .and_then(|()| self.writer.flush())
            .map_err(|e| PtyError::WriteFailed(e.to_string()))
    }

    fn resize(&mut self, cols: u16, rows: u16) -> Result<(), PtyError> {
        self.master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::ResizeFailed(e.to_string()))
    }

    fn kill(&mut self) {
        // SIGTERM first so shells and CLIs get a chance to clean up. The
        // reader thread observes EOF and reports the real exit code.
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;
            if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok() {
                return;
            }
        }
        if let Err(e) = self.killer.kill() {
            debug!("kill failed, process likely already gone: {}", e);
        }
    }
}
