//! PTY session management for deck.
//!
//! A [`SessionManager`] owns up to a fixed number of child processes, each
//! attached to its own pseudo-terminal. Output from every child is coalesced
//! on a shared flush window and fanned out as [`SessionEvent`]s over a
//! broadcast channel. Spawning is abstracted behind [`process::ProcessSpawner`]
//! so the manager can be driven by fakes in tests.

mod error;
mod manager;
pub mod process;

pub use error::{PtyError, SessionError};
pub use manager::{
    CreateSession, PANEL_ID_ENV, SPAWN_FAILED_EXIT_CODE, SessionEvent, SessionInfo,
    SessionManager,
};
pub use process::{EventSink, ProcessHandle, ProcessSpawner, PtySpawner, RawEvent, SpawnSpec};
