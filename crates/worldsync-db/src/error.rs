//! Error types for the persistence layer.
//!
//! Backends fail with [`StoreError`]. The save worker wraps those into
//! [`PersistError`] together with the store name and batch size, and the
//! simulation thread receives them from
//! [`AsyncSaveStorage::tick`](crate::AsyncSaveStorage::tick).

use std::path::PathBuf;

use worldsync_types::SnapshotError;

/// Errors raised by a [`SaveStorage`](crate::SaveStorage) backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A snapshot could not be encoded or a stored document could not be
    /// decoded.
    #[error("snapshot codec error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// A filesystem operation failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The file or directory involved.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// The backend was configured incorrectly.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors surfaced by the asynchronous save pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// A batch could not be written. Its completion callback never fires.
    #[error("store {store:?} failed to save a batch of {batch_len} change forms: {source}")]
    Upsert {
        /// Name of the failing storage.
        store: String,
        /// Number of slots in the failed batch.
        batch_len: usize,
        /// What the backend reported.
        source: StoreError,
    },

    /// The worker thread could not be started.
    #[error("failed to spawn save worker: {0}")]
    Spawn(std::io::Error),

    /// The worker thread stopped while batches were still expected.
    #[error("save worker for {0:?} has stopped")]
    WorkerGone(String),
}
