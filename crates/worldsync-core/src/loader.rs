//! Startup load of stored snapshots into the world.
//!
//! Every stored change form is resolved back to its session id through the
//! configured load order. A reference already placed from game records
//! gets the snapshot applied; anything else is placed from the snapshot's
//! own location. Snapshots whose file is no longer in the load order are
//! skipped, as are deleted runtime-created references.

use worldsync_db::AsyncSaveStorage;
use worldsync_types::{BaseId, ChangeForm, RecType, RefId};
use worldsync_world::{BaseType, NewRef, WorldState};

use crate::simulation::SimulationError;

/// Counts from one startup load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Snapshots read from the store.
    pub read: usize,
    /// Snapshots applied to references that already existed.
    pub applied: usize,
    /// References placed from their snapshot.
    pub placed: usize,
    /// Snapshots left out.
    pub skipped: usize,
}

/// Restore every snapshot in `storage` into `world`.
///
/// # Errors
///
/// Returns [`SimulationError::Store`] if the store cannot be read, or
/// [`SimulationError::World`] for a snapshot the world rejects.
pub fn load_world(
    world: &mut WorldState,
    storage: &AsyncSaveStorage,
) -> Result<LoadSummary, SimulationError> {
    let mut forms = Vec::new();
    storage.iterate_sync(&mut |form| forms.push(form))?;

    let mut summary = LoadSummary {
        read: forms.len(),
        ..LoadSummary::default()
    };
    for form in forms {
        match restore(world, form)? {
            Restored::Applied => summary.applied = summary.applied.saturating_add(1),
            Restored::Placed => summary.placed = summary.placed.saturating_add(1),
            Restored::Skipped => summary.skipped = summary.skipped.saturating_add(1),
        }
    }

    tracing::info!(
        store = storage.name(),
        read = summary.read,
        applied = summary.applied,
        placed = summary.placed,
        skipped = summary.skipped,
        "change forms loaded"
    );
    Ok(summary)
}

enum Restored {
    Applied,
    Placed,
    Skipped,
}

fn restore(world: &mut WorldState, form: ChangeForm) -> Result<Restored, SimulationError> {
    let id = match world.resolve(&form.form_desc) {
        Ok(raw) => RefId::new(raw),
        Err(e) => {
            tracing::warn!(form_desc = %form.form_desc, error = %e, "skipping change form");
            return Ok(Restored::Skipped);
        }
    };

    if world.lookup(id).is_some() {
        world.apply_change_form(id, form)?;
        return Ok(Restored::Applied);
    }

    if form.is_deleted && id.is_runtime_created() {
        tracing::debug!(ref_id = %id, "skipping deleted runtime reference");
        return Ok(Restored::Skipped);
    }

    let base_id = match world.resolve(&form.base_desc) {
        Ok(raw) => BaseId::new(raw),
        Err(e) => {
            tracing::warn!(ref_id = %id, base_desc = %form.base_desc, error = %e, "skipping change form");
            return Ok(Restored::Skipped);
        }
    };
    let is_actor = form.rec_type == RecType::Actor;
    let base_type = if is_actor {
        BaseType::Npc
    } else {
        world.records().base_type(base_id)
    };

    world.add_ref(
        NewRef {
            id,
            base_id,
            base_type,
            is_actor,
            location: form.location(),
            trigger_volume: None,
        },
        Some(form),
    )?;
    Ok(Restored::Placed)
}
