//! Server binary for Worldsync.
//!
//! Wires the live world to its snapshot store and runs frames until
//! Ctrl-C or the configured tick limit, then flushes every pending save
//! before exiting.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `worldsync-config.yaml` (or the path given
//!    as the first argument)
//! 2. Initialize structured logging (tracing)
//! 3. Build the async runtime
//! 4. Open the configured snapshot store and start the save worker
//! 5. Restore stored snapshots into the world
//! 6. Run the server loop until stopped
//! 7. Log the result and flush pending saves
//!
//! The store is opened, loaded, and flushed outside the runtime's
//! `block_on` because the `PostgreSQL` store blocks on a runtime handle
//! from synchronous code.

mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use worldsync_core::config::{LoggingConfig, PersistenceConfig, StoreKind};
use worldsync_core::{ServerConfig, Simulation, log_run_end, run_server};
use worldsync_db::{AsyncSaveStorage, FileStore, InMemoryStore, PostgresConfig, PostgresStore};
use worldsync_world::{Collaborators, WorldState};

use crate::error::ServerError;

const DEFAULT_CONFIG_PATH: &str = "worldsync-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if any startup step, the run loop, or the shutdown
/// flush fails.
fn main() -> anyhow::Result<()> {
    let config_path = std::env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let found = config_path.exists();
    let config = load_config(&config_path, found)
        .with_context(|| format!("loading {}", config_path.display()))?;

    init_logging(&config.logging);
    info!(config = %config_path.display(), "worldsync-server starting");
    if !found {
        info!("Config file not found, using defaults");
    }

    run(config).context("worldsync-server failed")
}

fn run(config: ServerConfig) -> Result<(), ServerError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("worldsync-rt")
        .build()
        .map_err(|source| ServerError::Runtime { source })?;

    let storage = open_storage(&config.persistence, runtime.handle())?;
    info!(
        store = storage.name(),
        kind = ?config.persistence.kind,
        poll_interval_ms = config.persistence.poll_interval_ms,
        "Save pipeline ready"
    );

    let world = WorldState::new(config.world, Collaborators::default());
    let mut sim = Simulation::new(world, storage);
    let loaded = sim.load()?;
    info!(
        read = loaded.read,
        applied = loaded.applied,
        placed = loaded.placed,
        skipped = loaded.skipped,
        "World restored"
    );

    let stop = Arc::new(AtomicBool::new(false));
    let signal_stop = Arc::clone(&stop);
    runtime.spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, stopping after the current frame");
                signal_stop.store(true, Ordering::Release);
            }
            Err(e) => warn!(error = %e, "failed to listen for Ctrl-C"),
        }
    });

    let result = runtime.block_on(run_server(&mut sim, &config.server, &stop));
    match &result {
        Ok(run_result) => log_run_end(run_result),
        Err(e) => warn!(error = %e, "Server loop stopped on a persistence fault"),
    }

    // Flush even when the loop failed so queued saves are not lost.
    sim.shutdown()?;
    result?;

    info!("worldsync-server shutdown complete");
    Ok(())
}

/// Load configuration from `path`, or defaults (with environment
/// overrides) when the file does not exist.
fn load_config(path: &Path, found: bool) -> Result<ServerConfig, ServerError> {
    if found {
        Ok(ServerConfig::from_file(path)?)
    } else {
        Ok(ServerConfig::parse("")?)
    }
}

fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn open_storage(
    config: &PersistenceConfig,
    runtime: &tokio::runtime::Handle,
) -> Result<AsyncSaveStorage, ServerError> {
    let poll = config.poll_interval();
    let storage = match config.kind {
        StoreKind::Memory => {
            AsyncSaveStorage::with_poll_interval(InMemoryStore::new(), &config.name, poll)?
        }
        StoreKind::File => {
            let store = FileStore::open(&config.directory)?;
            AsyncSaveStorage::with_poll_interval(store, &config.name, poll)?
        }
        StoreKind::Postgres => {
            let store =
                PostgresStore::connect(&PostgresConfig::new(&config.postgres_url), runtime.clone())?;
            AsyncSaveStorage::with_poll_interval(store, &config.name, poll)?
        }
    };
    Ok(storage)
}
