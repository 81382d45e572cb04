//! Entity registry and area-of-interest engine for the Worldsync server.
//!
//! This crate owns the live world: every placed reference, which clients
//! can see it, and the guarded path through which its persistent snapshot
//! changes. It never performs I/O itself; persistence happens by draining
//! [`WorldState::take_pending_saves`], and everything outward-facing goes
//! through the traits in [`collaborators`].
//!
//! # Modules
//!
//! - [`world_state`] -- [`WorldState`], the aggregate root: lookup,
//!   lifecycle, guarded snapshot edits, indices, and the timer tick.
//! - [`subscription`] -- Proximity-driven listener/emitter edges and
//!   trigger-volume overlap tracking.
//! - [`grid`] -- [`SpatialGrid`] bucketing references into 4096-unit cells.
//! - [`change_form_guard`] -- The mutation guard and save-mode decisions.
//! - [`object_ref`] -- [`ObjectReference`] runtime state and base types.
//! - [`reloot`] -- Reloot scheduling and container refill.
//! - [`activation`] -- Activation-children index and delayed propagation.
//! - [`interaction`] -- Activation, occupancy, and item-transfer rules.
//! - [`timer`] -- Deadline-ordered one-shot tasks.
//! - [`clock`] -- Injected time source.
//! - [`collaborators`] -- Transport, script events, and record lookup.
//! - [`config`] -- [`WorldConfig`].
//! - [`error`] -- [`WorldError`] and [`InvariantViolation`].

pub mod activation;
pub mod change_form_guard;
pub mod clock;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod grid;
pub mod interaction;
pub mod object_ref;
pub mod reloot;
pub mod subscription;
pub mod timer;
pub mod world_state;

// Re-export primary types at crate root.
pub use activation::ActivationChildrenIndex;
pub use change_form_guard::{ChangeFormGuard, SaveMode, SetPosMode};
pub use clock::{Clock, ManualClock, SystemClock};
pub use collaborators::{
    ActivationParent, Collaborators, EventSink, NullEventSink, NullRecordSource, NullTransport,
    RecordSource, RecordingEventSink, RecordingTransport, ScriptEvent, Transport, TransportCall,
};
pub use config::WorldConfig;
pub use error::{InvariantViolation, WorldError};
pub use grid::{CELL_SIZE, CellKey, SpatialGrid, cell_key};
pub use object_ref::{BaseType, ObjectReference, TriggerVolume};
pub use timer::{TimerQueue, TimerTask, TriggerTransition};
pub use world_state::{NewRef, PRIVATE_INDEXED_PREFIX, WorldState};
