//! Blocking-work offload for filesystem operations.
//!
//! The dump manager is called from cooperative tasks that must never block
//! on disk. Every filesystem-touching operation hands a closure to the
//! [`FsTaskProcessor`] and awaits its completion.

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinError;

/// Error produced when an offloaded filesystem task does not complete.
#[derive(Debug, Error)]
#[error("filesystem task \"{name}\" did not complete: {source}")]
pub struct TaskError {
    pub name: &'static str,
    #[source]
    pub source: JoinError,
}

/// Runs named blocking closures on the runtime's blocking pool.
///
/// The caller awaits the result cooperatively. Dropping the returned future
/// does not interrupt the closure: the filesystem work runs to completion
/// and its result is dropped.
#[derive(Debug, Clone)]
pub struct FsTaskProcessor {
    handle: Handle,
}

impl FsTaskProcessor {
    /// Capture the current runtime's handle.
    ///
    /// Panics when called outside a tokio runtime, like `Handle::current`.
    pub fn new() -> Self {
        Self {
            handle: Handle::current(),
        }
    }

    /// Build from an explicit runtime handle.
    pub fn from_handle(handle: Handle) -> Self {
        Self { handle }
    }

    /// Run `f` on the blocking pool and await its result.
    pub async fn run<T, F>(&self, name: &'static str, f: F) -> Result<T, TaskError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.handle
            .spawn_blocking(f)
            .await
            .map_err(|source| TaskError { name, source })
    }
}

impl Default for FsTaskProcessor {
    fn default() -> Self {
        Self::new()
    }
}
