//! The per-frame tick that couples the world to the save pipeline.
//!
//! One frame:
//!
//! 1. fire every world timer whose deadline has passed;
//! 2. drain the world's pending saves into one batch and enqueue it;
//! 3. tick the save pipeline, which re-raises at most one persistence
//!    fault and otherwise fires the callbacks of finished batches.

use worldsync_db::{AsyncSaveStorage, PersistError, StoreError};
use worldsync_world::{WorldError, WorldState};

use crate::loader::{self, LoadSummary};

/// Errors that can occur while driving the simulation.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    /// The world rejected an operation or broke an invariant.
    #[error("world error: {0}")]
    World(#[from] WorldError),

    /// The save pipeline reported a fault.
    #[error("persistence error: {0}")]
    Persist(#[from] PersistError),

    /// Reading the store during startup failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl SimulationError {
    /// Whether continuing would risk persisting corrupt state.
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::World(e) => e.is_fatal(),
            Self::Persist(_) | Self::Store(_) => false,
        }
    }
}

/// What one frame did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameSummary {
    /// Frame number, starting at 1.
    pub frame: u64,
    /// World timers fired.
    pub timers_fired: usize,
    /// Snapshots handed to the save worker.
    pub saves_queued: usize,
}

/// The live world together with its save pipeline.
#[derive(Debug)]
pub struct Simulation {
    world: WorldState,
    storage: AsyncSaveStorage,
    frame: u64,
}

impl Simulation {
    /// Couple `world` to `storage`.
    pub const fn new(world: WorldState, storage: AsyncSaveStorage) -> Self {
        Self {
            world,
            storage,
            frame: 0,
        }
    }

    /// The live world.
    pub const fn world(&self) -> &WorldState {
        &self.world
    }

    /// The live world, for applying client and script actions between
    /// frames.
    pub const fn world_mut(&mut self) -> &mut WorldState {
        &mut self.world
    }

    /// The save pipeline.
    pub const fn storage(&self) -> &AsyncSaveStorage {
        &self.storage
    }

    /// Frames run so far.
    pub const fn frame(&self) -> u64 {
        self.frame
    }

    /// Restore every stored snapshot into the world. Call once, before the
    /// first frame.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::Store`] if the store cannot be read, or
    /// [`SimulationError::World`] if restoring breaks a world invariant.
    pub fn load(&mut self) -> Result<LoadSummary, SimulationError> {
        loader::load_world(&mut self.world, &self.storage)
    }

    /// Run one frame.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::World`] for a broken world invariant, or
    /// [`SimulationError::Persist`] for a fault raised by the save worker.
    pub fn tick(&mut self) -> Result<FrameSummary, SimulationError> {
        self.frame = self.frame.saturating_add(1);
        let frame = self.frame;

        let timers_fired = self.world.tick()?;
        let saves_queued = self.flush_pending_saves();
        self.storage.tick()?;

        Ok(FrameSummary {
            frame,
            timers_fired,
            saves_queued,
        })
    }

    /// Save everything still pending and stop the save worker once it has
    /// written it.
    ///
    /// # Errors
    ///
    /// Returns the oldest persistence fault still outstanding.
    pub fn shutdown(mut self) -> Result<(), SimulationError> {
        let saves = self.flush_pending_saves();
        tracing::info!(frame = self.frame, final_saves = saves, "flushing world before shutdown");
        self.world.log_summary();
        self.storage.close()?;
        Ok(())
    }

    fn flush_pending_saves(&mut self) -> usize {
        if self.world.pending_save_count() == 0 {
            return 0;
        }
        let mut batch = self.storage.recycled_buffer().unwrap_or_default();
        self.world.drain_pending_saves_into(&mut batch);
        let queued = batch.len();

        let frame = self.frame;
        self.storage.upsert(batch, move || {
            tracing::trace!(frame, "save batch durable");
        });
        tracing::debug!(frame, queued, "save batch queued");
        queued
    }
}
