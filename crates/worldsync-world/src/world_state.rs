//! The aggregate root of the simulation.
//!
//! [`WorldState`] owns every [`ObjectReference`], the per-world spatial
//! grids, the lookup indices, the timer queue, and the set of snapshots
//! waiting to be saved. It is driven from a single simulation thread and
//! takes its collaborators explicitly at construction.
//!
//! Subscription management, reloot, activation propagation, and interaction
//! rules are implemented as further `impl WorldState` blocks in their own
//! modules.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;
use tracing::{debug, info, trace};
use worldsync_types::{
    BaseId, ChangeForm, FIRST_RUNTIME_FORM_ID, FormDesc, Inventory, LocationalData, RecType, RefId,
    Vec3,
};

use crate::activation::ActivationChildrenIndex;
use crate::change_form_guard::{SaveMode, SetPosMode};
use crate::clock::{Clock, unix_seconds};
use crate::collaborators::{Collaborators, EventSink, RecordSource, ScriptEvent, Transport};
use crate::config::WorldConfig;
use crate::error::{InvariantViolation, WorldError};
use crate::grid::{SpatialGrid, cell_key};
use crate::object_ref::{BaseType, ObjectReference, TriggerVolume};
use crate::timer::{TimerQueue, TimerTask, TriggerTransition};

/// Dynamic fields with this prefix are indexed for reverse lookup.
pub const PRIVATE_INDEXED_PREFIX: &str = "private.indexed.";

/// Dynamic fields with this prefix are never sent to clients.
const PRIVATE_PREFIX: &str = "private.";

/// Description of a reference to place in the world.
#[derive(Debug, Clone)]
pub struct NewRef {
    /// Session id.
    pub id: RefId,
    /// Template form.
    pub base_id: BaseId,
    /// Template record type.
    pub base_type: BaseType,
    /// Whether the reference is an actor.
    pub is_actor: bool,
    /// Initial placement.
    pub location: LocationalData,
    /// Trigger volume owned by the reference.
    pub trigger_volume: Option<TriggerVolume>,
}

/// Every reference in the simulation, plus the indices over them.
pub struct WorldState {
    pub(crate) config: WorldConfig,
    pub(crate) refs: BTreeMap<RefId, ObjectReference>,
    pub(crate) grids: BTreeMap<FormDesc, SpatialGrid>,
    pending_saves: BTreeMap<RefId, ChangeForm>,
    actors_by_profile_id: BTreeMap<i32, BTreeSet<RefId>>,
    refs_by_private_indexed: BTreeMap<String, BTreeSet<RefId>>,
    pub(crate) activation_children: ActivationChildrenIndex,
    pub(crate) timers: TimerQueue,
    next_runtime_id: u32,
    pub(crate) clock: Box<dyn Clock>,
    pub(crate) transport: Box<dyn Transport>,
    pub(crate) events: Box<dyn EventSink>,
    pub(crate) records: Box<dyn RecordSource>,
}

impl core::fmt::Debug for WorldState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorldState")
            .field("refs", &self.refs.len())
            .field("grids", &self.grids.len())
            .field("pending_saves", &self.pending_saves.len())
            .field("timers", &self.timers.len())
            .finish_non_exhaustive()
    }
}

impl WorldState {
    /// Create an empty world.
    pub fn new(config: WorldConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            clock,
            transport,
            events,
            records,
        } = collaborators;
        Self {
            config,
            refs: BTreeMap::new(),
            grids: BTreeMap::new(),
            pending_saves: BTreeMap::new(),
            actors_by_profile_id: BTreeMap::new(),
            refs_by_private_indexed: BTreeMap::new(),
            activation_children: ActivationChildrenIndex::new(),
            timers: TimerQueue::new(),
            next_runtime_id: FIRST_RUNTIME_FORM_ID,
            clock,
            transport,
            events,
            records,
        }
    }

    // -------------------------------------------------------------------
    // Lookup
    // -------------------------------------------------------------------

    /// World parameters.
    pub const fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Current time according to the injected clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Resolve a reference by id.
    pub fn lookup(&self, id: RefId) -> Option<&ObjectReference> {
        self.refs.get(&id)
    }

    /// Snapshot of a reference.
    pub fn change_form(&self, id: RefId) -> Option<&ChangeForm> {
        self.refs.get(&id).map(ObjectReference::change_form)
    }

    /// Ids of every reference, in order.
    pub fn ids(&self) -> impl Iterator<Item = RefId> + '_ {
        self.refs.keys().copied()
    }

    /// Number of references.
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    /// Whether the world holds no references.
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Spatial grid of a worldspace or cell.
    pub fn grid(&self, world: &FormDesc) -> Option<&SpatialGrid> {
        self.grids.get(world)
    }

    /// Static game records the world was built with.
    pub fn records(&self) -> &dyn RecordSource {
        self.records.as_ref()
    }

    /// Waiting deferred tasks.
    pub const fn timers(&self) -> &TimerQueue {
        &self.timers
    }

    /// The numeric session id a stored descriptor refers to.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::FormDesc`] if the descriptor's file is not in
    /// the configured load order.
    pub fn resolve(&self, desc: &FormDesc) -> Result<u32, WorldError> {
        Ok(desc.to_form_id(&self.config.load_order)?)
    }

    pub(crate) fn get(&self, id: RefId) -> Result<&ObjectReference, WorldError> {
        self.refs.get(&id).ok_or(WorldError::RefNotFound(id))
    }

    pub(crate) fn get_mut(&mut self, id: RefId) -> Result<&mut ObjectReference, WorldError> {
        self.refs.get_mut(&id).ok_or(WorldError::RefNotFound(id))
    }

    // -------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------

    /// Place a reference in the world, optionally restoring a stored
    /// snapshot.
    ///
    /// Runtime-created references without a snapshot are saved right away.
    /// Record-backed references register their activation parents.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::DuplicateRef`] if the id is taken, or any error
    /// of [`WorldState::apply_change_form`].
    pub fn add_ref(
        &mut self,
        new: NewRef,
        snapshot: Option<ChangeForm>,
    ) -> Result<RefId, WorldError> {
        let id = new.id;
        if self.refs.contains_key(&id) {
            return Err(WorldError::DuplicateRef(id));
        }

        let load_order = &self.config.load_order;
        let form = ChangeForm {
            rec_type: if new.is_actor {
                RecType::Actor
            } else {
                RecType::Refr
            },
            form_desc: FormDesc::from_form_id(id.into_inner(), load_order),
            base_desc: FormDesc::from_form_id(new.base_id.into_inner(), load_order),
            position: new.location.pos,
            angle: new.location.rot,
            world_or_cell_desc: new.location.cell_or_world_desc,
            ..ChangeForm::default()
        };
        let obj = ObjectReference::new(
            id,
            new.base_id,
            new.base_type,
            new.is_actor,
            new.trigger_volume,
            form,
        );
        self.refs.insert(id, obj);

        if id.is_runtime_created() {
            self.next_runtime_id = self
                .next_runtime_id
                .max(id.into_inner().saturating_add(1));
        } else {
            for link in self.records.activation_parents(id) {
                self.activation_children
                    .insert(link.parent, id, link.delay_secs);
            }
        }

        match snapshot {
            Some(snapshot) => self.apply_change_form(id, snapshot)?,
            None if id.is_runtime_created() => {
                self.edit_change_form(id, SaveMode::RequestSave, |_| {})?;
            }
            None => {}
        }

        if !self.get(id)?.is_disabled() {
            self.force_subscriptions_update(id)?;
        }

        debug!(ref_id = %id, base_id = %new.base_id, is_actor = new.is_actor, "reference added");
        Ok(id)
    }

    /// Create a new runtime reference with a freshly allocated id.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::RuntimeIdsExhausted`] if no id is left.
    pub fn create_ref(
        &mut self,
        base_id: BaseId,
        base_type: BaseType,
        is_actor: bool,
        location: LocationalData,
    ) -> Result<RefId, WorldError> {
        let id = self.allocate_runtime_id()?;
        self.add_ref(
            NewRef {
                id,
                base_id,
                base_type,
                is_actor,
                location,
                trigger_volume: None,
            },
            None,
        )
    }

    fn allocate_runtime_id(&mut self) -> Result<RefId, WorldError> {
        let mut candidate = self.next_runtime_id;
        while self.refs.contains_key(&RefId::new(candidate)) {
            candidate = candidate
                .checked_add(1)
                .ok_or(WorldError::RuntimeIdsExhausted)?;
        }
        self.next_runtime_id = candidate.saturating_add(1);
        Ok(RefId::new(candidate))
    }

    /// Remove a reference from the world entirely.
    ///
    /// Subscriptions are torn down, anything it occupies is released, and
    /// every index forgets it. A pending save stays queued.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::RefNotFound`] for an unknown id.
    pub fn destroy_ref(&mut self, id: RefId) -> Result<(), WorldError> {
        self.get(id)?;
        self.remove_from_grid_and_unsubscribe_all(id);

        for other in self.refs.values_mut() {
            if other.occupant == Some(id) {
                other.occupant = None;
            }
        }

        let Some(obj) = self.refs.remove(&id) else {
            return Err(WorldError::RefNotFound(id));
        };
        let form = obj.change_form();
        if form.profile_id >= 0 {
            self.unindex_profile_id(id, form.profile_id);
        }
        for (name, value) in form.dynamic_fields.iter() {
            if name.starts_with(PRIVATE_INDEXED_PREFIX) {
                self.unindex_private_property(id, name, value);
            }
        }
        self.activation_children.remove_ref(id);

        debug!(ref_id = %id, "reference destroyed");
        Ok(())
    }

    // -------------------------------------------------------------------
    // Snapshot mutation
    // -------------------------------------------------------------------

    /// Mutate a reference's snapshot through its guard.
    ///
    /// A save request puts the new snapshot into the pending-save set. An
    /// edit without one still refreshes a pending entry, so the next flush
    /// writes the latest state.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::RefNotFound`], or [`WorldError::Invariant`] if
    /// the edit reassigns the snapshot's identity.
    pub fn edit_change_form(
        &mut self,
        id: RefId,
        mode: SaveMode,
        mutate: impl FnOnce(&mut ChangeForm),
    ) -> Result<(), WorldError> {
        let now = self.clock.now();
        let obj = self.refs.get_mut(&id).ok_or(WorldError::RefNotFound(id))?;
        let requested = obj.guard.edit(mode, now, mutate)?;
        if requested {
            self.pending_saves.insert(id, obj.guard.form().clone());
            trace!(ref_id = %id, "save requested");
        } else if let Some(pending) = self.pending_saves.get_mut(&id) {
            pending.clone_from(obj.guard.form());
        }
        Ok(())
    }

    /// Restore a stored snapshot onto a live reference.
    ///
    /// Save requests are suppressed while applying. The profile id and
    /// indexed properties are registered again, a reloot deadline that
    /// elapsed while offline is rescheduled 1 ms from now, and non-actors
    /// are placed in the grid according to the stored location. Actors are
    /// moved to the stored world's grid when it differs from their current
    /// one.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::Invariant`] if properties of the reference were
    /// already set directly, or if the snapshot describes a different
    /// reference.
    pub fn apply_change_form(
        &mut self,
        id: RefId,
        snapshot: ChangeForm,
    ) -> Result<(), WorldError> {
        let obj = self.get_mut(id)?;
        if obj.set_property_called {
            return Err(InvariantViolation::ApplyAfterSetProperty(id).into());
        }
        let expected = &obj.change_form().form_desc;
        if snapshot.form_desc != *expected {
            return Err(InvariantViolation::FormDescMismatch {
                expected: expected.clone(),
                found: snapshot.form_desc,
            }
            .into());
        }

        obj.guard.set_block_saving(true);
        let result = self.apply_unsaved(id, snapshot);
        if let Some(obj) = self.refs.get_mut(&id) {
            obj.guard.set_block_saving(false);
        }
        result
    }

    fn apply_unsaved(&mut self, id: RefId, snapshot: ChangeForm) -> Result<(), WorldError> {
        let obj = self.get(id)?;
        let is_actor = obj.is_actor;
        let old_profile = obj.change_form().profile_id;
        let old_world = obj.cell_or_world().clone();

        let deadline = snapshot.next_reloot_datetime;
        let new_profile = snapshot.profile_id;
        let indexed: Vec<(String, Value)> = snapshot
            .dynamic_fields
            .iter()
            .filter(|(name, _)| name.starts_with(PRIVATE_INDEXED_PREFIX))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        self.edit_change_form(id, SaveMode::NoRequestSave, move |form| {
            *form = snapshot;
            form.next_reloot_datetime = 0;
        })?;

        if old_profile >= 0 {
            self.unindex_profile_id(id, old_profile);
        }
        if new_profile >= 0 {
            self.index_profile_id(id, new_profile);
        }
        for (name, value) in &indexed {
            self.index_private_property(id, name, value);
        }

        if deadline != 0 {
            let now_secs = unix_seconds(self.clock.now());
            let remaining = deadline
                .checked_sub(now_secs)
                .filter(|secs| *secs > 0)
                .and_then(|secs| i64::try_from(secs).ok())
                .and_then(TimeDelta::try_seconds)
                .unwrap_or_else(|| TimeDelta::milliseconds(1));
            self.request_reloot(id, Some(remaining))?;
        }

        let obj = self.get(id)?;
        let new_world = obj.cell_or_world().clone();
        let disabled = obj.is_disabled();
        let world_changed = new_world != old_world;
        if world_changed {
            if let Some(grid) = self.grids.get_mut(&old_world) {
                grid.forget(id);
            }
        }
        // Actors are otherwise placed by their own movement updates.
        if is_actor && !world_changed {
            return Ok(());
        }
        if disabled {
            self.remove_from_grid_and_unsubscribe_all(id);
        } else {
            self.force_subscriptions_update(id)?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------
    // Transform
    // -------------------------------------------------------------------

    /// Move a reference.
    ///
    /// Movement updates are kept in memory unless the location-save
    /// throttle has elapsed. Subscriptions are recomputed when the grid
    /// cell changes, and trigger volumes tracking the reference are
    /// re-evaluated.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::RefNotFound`] for an unknown id.
    pub fn set_pos(&mut self, id: RefId, pos: Vec3, mode: SetPosMode) -> Result<(), WorldError> {
        let now = self.clock.now();
        let throttle = self.config.location_save_throttle();
        let obj = self.get(id)?;
        let old_key = cell_key(obj.pos());
        let save = obj.guard.location_save_mode(mode, now, throttle);
        let ever_subscribed = obj.ever_subscribed_or_listened;

        self.edit_change_form(id, save, |form| form.position = pos)?;

        if old_key != cell_key(pos) || !ever_subscribed {
            self.force_subscriptions_update(id)?;
        }
        self.update_trigger_overlaps(id);
        Ok(())
    }

    /// Rotate a reference. Saved under the same rules as [`Self::set_pos`].
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::RefNotFound`] for an unknown id.
    pub fn set_angle(&mut self, id: RefId, angle: Vec3, mode: SetPosMode) -> Result<(), WorldError> {
        let now = self.clock.now();
        let throttle = self.config.location_save_throttle();
        let save = self.get(id)?.guard.location_save_mode(mode, now, throttle);
        self.edit_change_form(id, save, |form| form.angle = angle)
    }

    /// Move a reference to another worldspace or cell.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::RefNotFound`] for an unknown id.
    pub fn set_cell_or_world(&mut self, id: RefId, world: FormDesc) -> Result<(), WorldError> {
        let old_world = self.get(id)?.cell_or_world().clone();
        if old_world == world {
            return Ok(());
        }
        if let Some(grid) = self.grids.get_mut(&old_world) {
            grid.forget(id);
        }
        self.edit_change_form(id, SaveMode::RequestSave, |form| {
            form.world_or_cell_desc = world;
        })?;
        self.force_subscriptions_update(id)
    }

    // -------------------------------------------------------------------
    // Flags
    // -------------------------------------------------------------------

    /// Hide a reference.
    ///
    /// Runtime-created references and actors leave the grid and lose all
    /// subscriptions. Record-backed objects stay visible to their
    /// listeners, who are told about the flag.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::RefNotFound`] for an unknown id.
    pub fn disable(&mut self, id: RefId) -> Result<(), WorldError> {
        let obj = self.get(id)?;
        if obj.is_disabled() {
            return Ok(());
        }
        let leaves_grid = !obj.is_record_backed() || obj.is_actor;
        self.edit_change_form(id, SaveMode::RequestSave, |form| form.is_disabled = true)?;
        if leaves_grid {
            self.remove_from_grid_and_unsubscribe_all(id);
        } else {
            self.broadcast_property(id, "isDisabled", &Value::Bool(true));
        }
        Ok(())
    }

    /// Show a previously disabled reference.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::RefNotFound`] for an unknown id.
    pub fn enable(&mut self, id: RefId) -> Result<(), WorldError> {
        if !self.get(id)?.is_disabled() {
            return Ok(());
        }
        self.edit_change_form(id, SaveMode::RequestSave, |form| form.is_disabled = false)?;
        self.broadcast_property(id, "isDisabled", &Value::Bool(false));
        self.force_subscriptions_update(id)
    }

    /// Soft-delete a runtime-created reference.
    ///
    /// Record-backed references cannot be deleted; the call is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::RefNotFound`] for an unknown id.
    pub fn delete(&mut self, id: RefId) -> Result<(), WorldError> {
        if self.get(id)?.is_record_backed() {
            debug!(ref_id = %id, "ignoring delete of record-backed reference");
            return Ok(());
        }
        self.edit_change_form(id, SaveMode::RequestSave, |form| form.is_deleted = true)?;
        self.remove_from_grid_and_unsubscribe_all(id);
        Ok(())
    }

    /// Mark a reference harvested or not.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::RefNotFound`] for an unknown id.
    pub fn set_harvested(&mut self, id: RefId, harvested: bool) -> Result<(), WorldError> {
        if self.get(id)?.change_form().is_harvested == harvested {
            return Ok(());
        }
        self.edit_change_form(id, SaveMode::RequestSave, |form| {
            form.is_harvested = harvested;
        })?;
        self.broadcast_property(id, "isHarvested", &Value::Bool(harvested));
        Ok(())
    }

    /// Open or close a door or container.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::RefNotFound`] for an unknown id.
    pub fn set_open(&mut self, id: RefId, open: bool) -> Result<(), WorldError> {
        if self.get(id)?.change_form().is_open == open {
            return Ok(());
        }
        self.edit_change_form(id, SaveMode::RequestSave, |form| form.is_open = open)?;
        self.broadcast_property(id, "isOpen", &Value::Bool(open));
        Ok(())
    }

    /// Suppress or restore default activation processing.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::RefNotFound`] for an unknown id.
    pub fn set_activation_blocked(&mut self, id: RefId, blocked: bool) -> Result<(), WorldError> {
        self.get_mut(id)?.activation_blocked = blocked;
        Ok(())
    }

    /// Override the reloot delay of one reference.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::RefNotFound`] for an unknown id.
    pub fn set_reloot_time_override(
        &mut self,
        id: RefId,
        time: Option<TimeDelta>,
    ) -> Result<(), WorldError> {
        self.get_mut(id)?.reloot_time_override = time;
        Ok(())
    }

    // -------------------------------------------------------------------
    // Properties and indices
    // -------------------------------------------------------------------

    /// Set a script-visible property directly on a live reference.
    ///
    /// After this, applying a stored snapshot to the reference is an
    /// invariant violation. Indexed properties update the reverse index;
    /// non-private properties are sent to actor listeners.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::RefNotFound`] for an unknown id.
    pub fn set_property(&mut self, id: RefId, name: &str, value: Value) -> Result<(), WorldError> {
        let obj = self.get_mut(id)?;
        obj.set_property_called = true;
        let previous = obj.change_form().dynamic_fields.get(name).cloned();

        let stored = value.clone();
        self.edit_change_form(id, SaveMode::RequestSave, |form| {
            form.dynamic_fields.set(name, stored);
        })?;

        if name.starts_with(PRIVATE_INDEXED_PREFIX) {
            if let Some(previous) = previous {
                self.unindex_private_property(id, name, &previous);
            }
            self.index_private_property(id, name, &value);
        }
        if !name.starts_with(PRIVATE_PREFIX) {
            self.broadcast_property(id, name, &value);
        }
        Ok(())
    }

    /// Attach a reference to a user profile.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::InvalidProfileId`] for a negative profile id,
    /// or [`WorldError::RefNotFound`] for an unknown reference.
    pub fn register_profile_id(&mut self, id: RefId, profile_id: i32) -> Result<(), WorldError> {
        if profile_id < 0 {
            return Err(WorldError::InvalidProfileId(profile_id));
        }
        let old = self.get(id)?.change_form().profile_id;
        self.edit_change_form(id, SaveMode::RequestSave, |form| form.profile_id = profile_id)?;
        if old >= 0 {
            self.unindex_profile_id(id, old);
        }
        self.index_profile_id(id, profile_id);
        Ok(())
    }

    /// References attached to a user profile.
    pub fn actors_by_profile_id(&self, profile_id: i32) -> Vec<RefId> {
        self.actors_by_profile_id
            .get(&profile_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// References whose indexed property `name` currently equals `value`.
    pub fn refs_by_private_indexed_property(&self, name: &str, value: &Value) -> Vec<RefId> {
        self.refs_by_private_indexed
            .get(&private_index_key(name, value))
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    fn index_profile_id(&mut self, id: RefId, profile_id: i32) {
        self.actors_by_profile_id
            .entry(profile_id)
            .or_default()
            .insert(id);
    }

    fn unindex_profile_id(&mut self, id: RefId, profile_id: i32) {
        if let Some(ids) = self.actors_by_profile_id.get_mut(&profile_id) {
            ids.remove(&id);
            if ids.is_empty() {
                self.actors_by_profile_id.remove(&profile_id);
            }
        }
    }

    fn index_private_property(&mut self, id: RefId, name: &str, value: &Value) {
        self.refs_by_private_indexed
            .entry(private_index_key(name, value))
            .or_default()
            .insert(id);
    }

    fn unindex_private_property(&mut self, id: RefId, name: &str, value: &Value) {
        let key = private_index_key(name, value);
        if let Some(ids) = self.refs_by_private_indexed.get_mut(&key) {
            ids.remove(&id);
            if ids.is_empty() {
                self.refs_by_private_indexed.remove(&key);
            }
        }
    }

    /// Send a property of `id` to each of its actor listeners.
    pub(crate) fn broadcast_property(&mut self, id: RefId, name: &str, value: &Value) {
        let Some(obj) = self.refs.get(&id) else {
            return;
        };
        for &listener in &obj.actor_listeners {
            self.transport.send_property(listener, id, name, value);
        }
    }

    // -------------------------------------------------------------------
    // Inventory
    // -------------------------------------------------------------------

    /// Add items to a reference's inventory.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::RefNotFound`] for an unknown id.
    pub fn add_items(&mut self, id: RefId, items: &Inventory) -> Result<(), WorldError> {
        self.edit_change_form(id, SaveMode::RequestSave, |form| form.inv.add_items(items))?;
        self.send_inventory_if_actor(id);
        Ok(())
    }

    /// Remove items from a reference's inventory.
    ///
    /// A container left empty requests a reloot.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::Inventory`] if the items are not all present,
    /// leaving the inventory unchanged.
    pub fn remove_items(&mut self, id: RefId, items: &Inventory) -> Result<(), WorldError> {
        let obj = self.get(id)?;
        let mut inv = obj.change_form().inv.clone();
        inv.remove_items(items)?;
        let emptied_container = obj.base_type == BaseType::Cont && inv.is_empty();

        self.edit_change_form(id, SaveMode::RequestSave, |form| form.inv = inv)?;
        self.send_inventory_if_actor(id);
        if emptied_container {
            self.request_reloot(id, None)?;
        }
        Ok(())
    }

    fn send_inventory_if_actor(&mut self, id: RefId) {
        if let Some(obj) = self.refs.get(&id) {
            if obj.is_actor {
                self.transport.send_inventory(id, &obj.change_form().inv);
            }
        }
    }

    // -------------------------------------------------------------------
    // Tick and persistence hand-off
    // -------------------------------------------------------------------

    /// Fire every timer whose deadline has passed.
    ///
    /// Returns how many timers fired.
    ///
    /// # Errors
    ///
    /// Only invariant violations are returned; rejected interactions from
    /// timer callbacks are logged and dropped.
    pub fn tick(&mut self) -> Result<usize, WorldError> {
        let due = self.timers.pop_due(self.clock.now());
        let fired = due.len();
        for task in due {
            self.run_timer(task)?;
        }
        Ok(fired)
    }

    fn run_timer(&mut self, task: TimerTask) -> Result<(), WorldError> {
        match task {
            TimerTask::Reloot(id) => {
                if self.refs.contains_key(&id) {
                    self.do_reloot(id)?;
                } else {
                    debug!(ref_id = %id, "reloot target no longer exists");
                }
            }
            TimerTask::ActivateChild { child, parent } => {
                self.fire_activation_child(child, parent)?;
            }
            TimerTask::TriggerEvent {
                volume,
                other,
                transition,
            } => {
                if !self.refs.contains_key(&volume) || !self.refs.contains_key(&other) {
                    debug!(volume = %volume, other = %other, "trigger event for a gone reference");
                    return Ok(());
                }
                let event = match transition {
                    TriggerTransition::Enter => ScriptEvent::TriggerEnter { other },
                    TriggerTransition::Leave => ScriptEvent::TriggerLeave { other },
                };
                self.events.send_event(volume, event);
            }
        }
        Ok(())
    }

    /// Drain the pending-save set into a batch for the store.
    pub fn take_pending_saves(&mut self) -> Vec<Option<ChangeForm>> {
        let mut batch = Vec::with_capacity(self.pending_saves.len());
        self.drain_pending_saves_into(&mut batch);
        batch
    }

    /// Drain the pending-save set onto the end of `batch`, reusing its
    /// allocation.
    pub fn drain_pending_saves_into(&mut self, batch: &mut Vec<Option<ChangeForm>>) {
        batch.extend(
            core::mem::take(&mut self.pending_saves)
                .into_values()
                .map(Some),
        );
    }

    /// Number of references waiting to be saved.
    pub fn pending_save_count(&self) -> usize {
        self.pending_saves.len()
    }

    /// Log a one-line summary of the world's size.
    pub fn log_summary(&self) {
        info!(
            refs = self.refs.len(),
            worlds = self.grids.len(),
            pending_saves = self.pending_saves.len(),
            timers = self.timers.len(),
            "world summary"
        );
    }
}

fn private_index_key(name: &str, value: &Value) -> String {
    format!("{name}:{value}")
}
