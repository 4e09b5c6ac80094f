use thiserror::Error;

/// Errors from the PTY layer itself.
#[derive(Debug, Error)]
pub enum PtyError {
    #[error("failed to open pty: {0}")]
    OpenFailed(String),

    #[error("failed to spawn '{command}': {reason}")]
    SpawnFailed { command: String, reason: String },

    #[error("failed to write to pty: {0}")]
    WriteFailed(String),

    #[error("failed to resize pty: {0}")]
    ResizeFailed(String),
}

/// Errors surfaced by [`crate::SessionManager`] operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session limit reached ({max} running sessions)")]
    Capacity { max: usize },

    #[error("no such session: {0}")]
    NotFound(String),

    #[error(transparent)]
    Pty(#[from] PtyError),
}
