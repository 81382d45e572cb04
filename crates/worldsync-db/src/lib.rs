//! Persistence layer for the Worldsync server.
//!
//! Snapshots of changed references ([`ChangeForm`](worldsync_types::ChangeForm))
//! are written in batches to a [`SaveStorage`] backend. The simulation never
//! talks to a backend directly: it hands batches to [`AsyncSaveStorage`],
//! which writes them on a dedicated worker thread and reports completions
//! and faults back on the next [`AsyncSaveStorage::tick`].
//!
//! # Architecture
//!
//! ```text
//! Simulation thread                      Worker thread
//!     |                                       |
//!     +-- upsert(batch, callback) --task-->   +-- SaveStorage::upsert
//!     |                                       |
//!     +-- tick() <------report---------------+
//!         |-- fault?   -> Err(PersistError), one per tick
//!         +-- callbacks fired, counter advanced
//! ```
//!
//! # Modules
//!
//! - [`storage`] -- The [`SaveStorage`] backend trait
//! - [`memory_store`] -- In-memory backend for tests and throwaway servers
//! - [`file_store`] -- One JSON document per reference under a directory
//! - [`postgres`] -- `PostgreSQL` backend, one `JSONB` row per reference
//! - [`async_storage`] -- The background save worker
//! - [`error`] -- Shared error types

pub mod async_storage;
pub mod error;
pub mod file_store;
pub mod memory_store;
pub mod postgres;
pub mod storage;

// Re-export primary types for convenience.
pub use async_storage::{AsyncSaveStorage, DEFAULT_POLL_INTERVAL, UpsertCallback};
pub use error::{PersistError, StoreError};
pub use file_store::FileStore;
pub use memory_store::InMemoryStore;
pub use postgres::{PostgresConfig, PostgresStore};
pub use storage::{ChangeFormBatch, SaveStorage};
