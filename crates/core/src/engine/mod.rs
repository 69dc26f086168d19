//! The seam between a session and a concrete analysis engine.
//!
//! A session talks to its engine only through [`Engine`]: open a target, send one
//! textual command, get the textual reply. JSON decoding, the analysis gate and the
//! view caches all live above this layer.

use std::time::Duration;

use crate::error::SessionResult;
use crate::model::Perm;

#[cfg(feature = "rizin-backend")]
pub mod rizin;

#[cfg(feature = "rizin-backend")]
pub use rizin::RizinPipe;

/// What to open and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenTarget {
    /// File path, or `malloc://<len>` for a memory-backed buffer.
    pub uri: String,
    pub perm: Perm,
    /// Address the resource is mapped at.
    pub load_addr: u64,
    /// Base address for loading binary metadata; `None` lets the engine pick.
    pub base_addr: Option<u64>,
    /// How long the engine may take to load the target; `None` waits indefinitely.
    pub startup_timeout: Option<Duration>,
}

/// A single-threaded analysis engine instance driven by textual commands.
///
/// Implementations are not expected to be internally synchronized; the owning
/// session serializes every call.
pub trait Engine: Send {
    /// Human-readable engine name for logs.
    fn name(&self) -> &'static str;

    /// Open `target` and load its binary metadata. Called once, before any command.
    fn open(&mut self, target: &OpenTarget) -> SessionResult<()>;

    /// Send one command and block until its reply arrives or `timeout` elapses.
    fn cmd(&mut self, command: &str, timeout: Option<Duration>) -> SessionResult<String>;

    /// Release the engine instance. Must tolerate being called more than once.
    fn close(&mut self) -> SessionResult<()>;
}
