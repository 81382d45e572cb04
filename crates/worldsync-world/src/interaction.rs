//! Activation and item-transfer rules.
//!
//! Rejections come back as ordinary [`WorldError`]s and are logged at
//! `warn`; the simulation carries on.

use tracing::{debug, warn};
use worldsync_types::{Inventory, RefId};

use crate::collaborators::ScriptEvent;
use crate::error::WorldError;
use crate::object_ref::BaseType;
use crate::world_state::WorldState;

impl WorldState {
    /// `source` activates `target`.
    ///
    /// Default processing depends on the target's base type: harvestables
    /// are harvested into the source's inventory, doors toggle, containers
    /// and furniture are occupied. Unless activation is blocked, the
    /// target's activation children are then scheduled. Scripts always
    /// receive the activation.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::CrossWorldInteraction`] if the two are in
    /// different worlds, or [`WorldError::AlreadyOccupied`] if the target
    /// is in use.
    pub fn activate(&mut self, target: RefId, source: RefId) -> Result<(), WorldError> {
        self.check_interaction_ability(target, source)?;

        let obj = self.get(target)?;
        let blocked = obj.activation_blocked;
        let base_type = obj.base_type.clone();
        if blocked {
            debug!(target = %target, source = %source, "activation blocked, notifying scripts only");
            self.events
                .send_event(target, ScriptEvent::Activate { caster: source });
            return Ok(());
        }

        match base_type {
            BaseType::Flor | BaseType::Tree | BaseType::Item(_) => {
                self.harvest(target, source)?;
            }
            BaseType::Door => {
                let open = !self.get(target)?.change_form().is_open;
                self.set_open(target, open)?;
                if open {
                    self.request_reloot(target, None)?;
                }
            }
            BaseType::Cont => {
                self.check_if_object_can_start_occupy(target, source)?;
                self.get_mut(target)?.occupant = Some(source);
                self.ensure_base_container_added(target)?;
                self.set_open(target, true)?;
            }
            BaseType::Furn => {
                self.check_if_object_can_start_occupy(target, source)?;
                self.get_mut(target)?.occupant = Some(source);
            }
            BaseType::Acti | BaseType::Npc | BaseType::Other(_) => {}
        }

        self.events
            .send_event(target, ScriptEvent::Activate { caster: source });
        self.activate_children(target);
        Ok(())
    }

    /// `source` stops using `target`: closes a container or leaves
    /// furniture. Ignored unless `source` is the occupant.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::RefNotFound`] for an unknown target.
    pub fn activate_second(&mut self, target: RefId, source: RefId) -> Result<(), WorldError> {
        let obj = self.get(target)?;
        if obj.occupant != Some(source) {
            return Ok(());
        }
        let is_container = obj.base_type == BaseType::Cont;
        self.get_mut(target)?.occupant = None;
        if is_container {
            self.set_open(target, false)?;
        }
        debug!(target = %target, source = %source, "occupancy released");
        Ok(())
    }

    /// Move items from `actor` into the container it occupies.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::NotOccupant`] if `actor` does not occupy
    /// `target`, or [`WorldError::Inventory`] if the actor lacks the items.
    pub fn put_item(
        &mut self,
        target: RefId,
        actor: RefId,
        items: &Inventory,
    ) -> Result<(), WorldError> {
        self.require_occupant(target, actor)?;
        self.remove_items(actor, items)?;
        self.add_items(target, items)
    }

    /// Move items from the container `actor` occupies into its inventory.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::NotOccupant`] if `actor` does not occupy
    /// `target`, or [`WorldError::Inventory`] if the container lacks the
    /// items.
    pub fn take_item(
        &mut self,
        target: RefId,
        actor: RefId,
        items: &Inventory,
    ) -> Result<(), WorldError> {
        self.require_occupant(target, actor)?;
        self.remove_items(target, items)?;
        self.add_items(actor, items)
    }

    /// Whether `source` may start using `target`.
    ///
    /// A current occupant that no longer exists, is disabled, has wandered
    /// out of reach, or is in another world loses its claim. Furniture
    /// cannot be re-activated by its own occupant.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::AlreadyOccupied`] when the target stays in use.
    pub fn check_if_object_can_start_occupy(
        &mut self,
        target: RefId,
        source: RefId,
    ) -> Result<(), WorldError> {
        let obj = self.get(target)?;
        let Some(reach) = obj.base_type.occupancy_reach() else {
            return Ok(());
        };
        let Some(occupant) = obj.occupant else {
            return Ok(());
        };
        let is_furniture = obj.base_type == BaseType::Furn;

        let released = self.refs.get(&occupant).is_none_or(|occ| {
            occ.is_disabled()
                || occ.pos().distance(obj.pos()) > reach
                || occ.cell_or_world() != obj.cell_or_world()
        });
        if released {
            self.get_mut(target)?.occupant = None;
            debug!(target = %target, occupant = %occupant, "stale occupant released");
            return Ok(());
        }

        if occupant == source && !is_furniture {
            return Ok(());
        }
        warn!(target = %target, occupant = %occupant, source = %source, "target already occupied");
        Err(WorldError::AlreadyOccupied { target, occupant })
    }

    fn check_interaction_ability(&self, target: RefId, source: RefId) -> Result<(), WorldError> {
        let t = self.get(target)?;
        let s = self.get(source)?;
        if t.cell_or_world() != s.cell_or_world() {
            warn!(target = %target, source = %source, "cross-world interaction rejected");
            return Err(WorldError::CrossWorldInteraction {
                target,
                source_ref: source,
            });
        }
        Ok(())
    }

    fn require_occupant(&self, target: RefId, actor: RefId) -> Result<(), WorldError> {
        if self.get(target)?.occupant != Some(actor) {
            warn!(target = %target, actor = %actor, "item transfer by non-occupant rejected");
            return Err(WorldError::NotOccupant { target, actor });
        }
        Ok(())
    }

    fn harvest(&mut self, target: RefId, source: RefId) -> Result<(), WorldError> {
        let obj = self.get(target)?;
        if obj.change_form().is_harvested {
            return Ok(());
        }
        let is_item = matches!(obj.base_type, BaseType::Item(_));
        let remove_after = is_item && !obj.is_record_backed();
        let items = if is_item {
            let mut items = Inventory::new();
            items.add_item(obj.base_id, obj.change_form().count);
            items
        } else {
            self.records.harvest_result(obj.base_id)
        };

        self.add_items(source, &items)?;
        self.set_harvested(target, true)?;
        self.request_reloot(target, None)?;
        if remove_after {
            self.delete(target)?;
        }
        Ok(())
    }
}
