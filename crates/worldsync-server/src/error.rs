//! Error types for the server binary.
//!
//! [`ServerError`] wraps every failure mode of startup, the run loop, and
//! the shutdown flush.

/// Top-level error for the server binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: worldsync_core::ConfigError,
    },

    /// The snapshot store could not be opened.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: worldsync_db::StoreError,
    },

    /// The save worker could not be started or failed during shutdown.
    #[error("persistence error: {source}")]
    Persist {
        /// The underlying persistence error.
        #[from]
        source: worldsync_db::PersistError,
    },

    /// Loading or flushing the world failed.
    #[error("simulation error: {source}")]
    Simulation {
        /// The underlying simulation error.
        #[from]
        source: worldsync_core::SimulationError,
    },

    /// The run loop stopped on a persistence fault.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        #[from]
        source: worldsync_core::RunnerError,
    },

    /// The async runtime could not be built.
    #[error("runtime error: {source}")]
    Runtime {
        /// The underlying I/O error.
        source: std::io::Error,
    },
}
