//! Session errors.

use pytecode_core::{
    BackendState, RunOutput,
    traits::{BackendError, StorageError},
};
use thiserror::Error;

/// The user's source raised, or the run could not complete.
///
/// The session stays ready; `output` holds everything the run produced,
/// including the error text.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ExecutionError {
    pub message: String,
    pub output: RunOutput,
}

/// Session error.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Runtime or library loading failed; the session is `Failed` until
    /// initialized again.
    #[error("Backend initialization failed: {0}")]
    BackendInit(#[source] BackendError),
    #[error("Backend is not ready (state: {0})")]
    BackendNotReady(BackendState),
    #[error("A run is already in progress")]
    ConcurrentRunRejected,
    #[error("Initialization is already in progress")]
    InitializationInProgress,
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl SessionError {
    /// Whether the session needs an explicit re-initialize.
    #[must_use]
    pub const fn requires_reinitialize(&self) -> bool {
        matches!(self, Self::BackendInit(_))
    }
}
