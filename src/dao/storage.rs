use std::error::Error;
use thiserror::Error;
use uuid::Uuid;

use crate::dao::models::LifecycleState;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or rejected the operation.
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// No backend is installed; the service runs in degraded mode.
    #[error("no storage backend installed")]
    Degraded,
    /// The targeted record does not exist in the store.
    #[error("record `{id}` not found")]
    NotFound { id: Uuid },
    /// A draft write was rejected because the record left its drafting states.
    #[error("record `{id}` is {state:?} and no longer accepts drafts")]
    DraftingClosed { id: Uuid, state: LifecycleState },
    /// A final write was rejected because the stored lifecycle state moved on.
    #[error("record `{id}` is {actual:?}, expected {expected:?}")]
    StateConflict {
        id: Uuid,
        expected: LifecycleState,
        actual: LifecycleState,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}
