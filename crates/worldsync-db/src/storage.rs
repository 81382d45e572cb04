//! The backend trait every change form store implements.

use worldsync_types::ChangeForm;

use crate::error::StoreError;

/// A batch of snapshots to write. `None` slots are skipped, which lets a
/// caller drop an entry without reshuffling the buffer.
pub type ChangeFormBatch = Vec<Option<ChangeForm>>;

/// A durable home for change forms, keyed by their `formDesc`.
///
/// Backends are used from one thread at a time: the save worker during
/// normal operation, or the loader during startup.
pub trait SaveStorage: Send {
    /// Insert or replace every `Some` snapshot of `batch`.
    ///
    /// Returns the number of snapshots written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend rejects the write. A failed
    /// batch may have been partially applied.
    fn upsert(&mut self, batch: ChangeFormBatch) -> Result<usize, StoreError>;

    /// Visit every stored snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend cannot be read or a document
    /// does not decode.
    fn iterate(&mut self, visit: &mut dyn FnMut(ChangeForm)) -> Result<(), StoreError>;

    /// Hand back an emptied batch buffer for reuse, if the backend kept one.
    fn recycled_buffer(&mut self) -> Option<ChangeFormBatch> {
        None
    }

    /// Human-readable backend name for logs.
    fn name(&self) -> &str;
}
