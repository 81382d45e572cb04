//! Shared type definitions for the Worldsync server.
//!
//! This crate is the single source of truth for the persistent shape of a
//! world entity. Every other crate in the workspace speaks in these types:
//! the world crate mutates them, the storage crate writes them, and the
//! snapshot document codec defined here is the boundary format between the
//! two.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe numeric wrappers for runtime identifiers
//! - [`form_desc`] -- Load-order independent form descriptors
//! - [`geometry`] -- Positions, rotations, and locational data
//! - [`inventory`] -- Item containers carried by entities
//! - [`dynamic_fields`] -- Ordered, string-keyed property bag
//! - [`change_form`] -- The persistent snapshot of one entity
//! - [`error`] -- Parse and codec errors

pub mod change_form;
pub mod dynamic_fields;
pub mod error;
pub mod form_desc;
pub mod geometry;
pub mod ids;
pub mod inventory;

// Re-export all public types at crate root for convenience.
pub use change_form::{ChangeForm, Faction, RecType};
pub use dynamic_fields::DynamicFields;
pub use error::{FormDescError, InventoryError, SnapshotError};
pub use form_desc::FormDesc;
pub use geometry::{LocationalData, Vec3};
pub use ids::{BaseId, FIRST_RUNTIME_FORM_ID, RefId};
pub use inventory::{Inventory, InventoryEntry};
