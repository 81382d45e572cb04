//! Error types for the `worldsync-world` crate.
//!
//! All fallible operations in this crate return [`WorldError`]. Variants
//! fall into two groups: recoverable interaction rejections, which the
//! caller logs and moves on from, and [`InvariantViolation`]s, after which
//! in-memory state can no longer be trusted to match what is persisted.

use worldsync_types::{FormDesc, FormDescError, InventoryError, RefId};

/// Broken internal invariants. Never recoverable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    /// A stored snapshot was applied to a reference whose live properties
    /// were already mutated directly.
    #[error("snapshot applied to {0} after a direct property mutation")]
    ApplyAfterSetProperty(RefId),

    /// An edit tried to reassign the identity of a snapshot.
    #[error("snapshot identity changed from {from} to {to}")]
    FormDescChanged {
        /// Identity before the edit.
        from: FormDesc,
        /// Identity the edit tried to assign.
        to: FormDesc,
    },

    /// A stored snapshot describes a different reference than the one it
    /// is applied to.
    #[error("snapshot {found} applied to reference described as {expected}")]
    FormDescMismatch {
        /// Identity of the live reference.
        expected: FormDesc,
        /// Identity stored in the snapshot.
        found: FormDesc,
    },
}

/// Errors that can occur during world operations.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// No reference with this id exists.
    #[error("reference not found: {0}")]
    RefNotFound(RefId),

    /// A reference with this id already exists.
    #[error("duplicate reference id: {0}")]
    DuplicateRef(RefId),

    /// Target and source are in different worldspaces or cells.
    #[error("{source_ref} cannot interact with {target} in another world")]
    CrossWorldInteraction {
        /// The reference being interacted with.
        target: RefId,
        /// The reference performing the interaction.
        source_ref: RefId,
    },

    /// The target is occupied by someone else.
    #[error("{target} is occupied by {occupant}")]
    AlreadyOccupied {
        /// The container or furniture.
        target: RefId,
        /// The current occupant.
        occupant: RefId,
    },

    /// Item transfer attempted by an actor that does not occupy the target.
    #[error("{actor} does not occupy {target}")]
    NotOccupant {
        /// The container.
        target: RefId,
        /// The actor attempting the transfer.
        actor: RefId,
    },

    /// Profile ids must be non-negative.
    #[error("invalid profile id {0}")]
    InvalidProfileId(i32),

    /// No more runtime ids can be allocated.
    #[error("runtime form id space exhausted")]
    RuntimeIdsExhausted,

    /// An item transfer failed.
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// A form descriptor could not be resolved.
    #[error(transparent)]
    FormDesc(#[from] FormDescError),

    /// A broken invariant. The process must not continue.
    #[error("invariant violation: {0}")]
    Invariant(#[from] InvariantViolation),
}

impl WorldError {
    /// Whether the error leaves the world in a state that must not be
    /// persisted or simulated further.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Invariant(_))
    }
}
