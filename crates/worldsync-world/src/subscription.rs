//! Area-of-interest subscription management.
//!
//! Every reference keeps a `listeners` set (who receives its updates) and
//! an `emitters` set (whose updates it receives). Edges only exist between
//! pairs where at least one side is an actor, and are recomputed from grid
//! proximity by set difference, so each transition produces exactly one
//! subscribe or unsubscribe.
//!
//! Emitters that own a trigger volume do not register with the transport.
//! Instead, each listener tracks whether it is inside the volume, and
//! crossings are reported to the volume owner's scripts.

use std::collections::BTreeSet;

use tracing::{debug, trace};
use worldsync_types::RefId;

use crate::collaborators::ScriptEvent;
use crate::error::WorldError;
use crate::grid::{SpatialGrid, cell_key};
use crate::timer::{TimerTask, TriggerTransition};
use crate::world_state::WorldState;

impl WorldState {
    /// Recompute the listener set of `id` from its current position.
    ///
    /// Disabled references are left untouched. Running this twice without
    /// movement in between produces no subscription changes the second
    /// time.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::RefNotFound`] for an unknown id.
    pub fn force_subscriptions_update(&mut self, id: RefId) -> Result<(), WorldError> {
        let obj = self.get(id)?;
        if obj.is_disabled() {
            return Ok(());
        }
        let key = cell_key(obj.pos());
        let world = obj.cell_or_world().clone();
        let is_actor = obj.is_actor;
        let was = obj.listeners.clone();

        let radius = self.config.grid_radius;
        let grid = self
            .grids
            .entry(world)
            .or_insert_with(|| SpatialGrid::new(radius));
        grid.move_to(id, key);
        let nearby = grid.neighbors(key);

        let now: BTreeSet<RefId> = nearby
            .into_iter()
            .filter(|n| is_actor || self.refs.get(n).is_some_and(|r| r.is_actor))
            .collect();

        for &gone in was.difference(&now) {
            self.unsubscribe(id, gone);
            if gone != id {
                self.unsubscribe(gone, id);
            }
        }
        for &added in now.difference(&was) {
            self.subscribe(id, added);
            if added != id {
                self.subscribe(added, id);
            }
        }

        if let Some(obj) = self.refs.get_mut(&id) {
            obj.ever_subscribed_or_listened = true;
        }
        Ok(())
    }

    /// Make `listener` receive updates from `emitter`.
    ///
    /// Pairs without an actor are ignored. The first time an emitter gains
    /// a registered actor as listener, its scripts receive the init and
    /// load notifications.
    pub fn subscribe(&mut self, emitter: RefId, listener: RefId) {
        let (Some(e), Some(l)) = (self.refs.get(&emitter), self.refs.get(&listener)) else {
            debug!(emitter = %emitter, listener = %listener, "subscribe on a gone reference");
            return;
        };
        if !e.is_actor && !l.is_actor {
            return;
        }
        let send_init = !e.on_init_event_sent && l.change_form().profile_id >= 0;
        let has_volume = e.trigger_volume.is_some();
        let listener_is_actor = l.is_actor;

        if let Some(e) = self.refs.get_mut(&emitter) {
            if send_init {
                e.on_init_event_sent = true;
            }
            if e.listeners.insert(listener) && listener_is_actor {
                e.actor_listeners.push(listener);
            }
        }
        if let Some(l) = self.refs.get_mut(&listener) {
            l.emitters.insert(emitter);
            if has_volume {
                l.emitters_with_volumes.entry(emitter).or_insert(false);
            }
        }

        if send_init {
            self.events.send_event(emitter, ScriptEvent::Init);
            self.events.send_event(emitter, ScriptEvent::CellLoad);
            self.events.send_event(emitter, ScriptEvent::Load);
        }
        if !has_volume {
            self.transport.subscribe(emitter, listener);
        }
        trace!(emitter = %emitter, listener = %listener, "subscribed");
    }

    /// Stop `listener` receiving updates from `emitter`. Exact inverse of
    /// [`Self::subscribe`].
    pub fn unsubscribe(&mut self, emitter: RefId, listener: RefId) {
        let (Some(e), Some(l)) = (self.refs.get(&emitter), self.refs.get(&listener)) else {
            debug!(emitter = %emitter, listener = %listener, "unsubscribe on a gone reference");
            return;
        };
        if !e.is_actor && !l.is_actor {
            return;
        }
        let has_volume = e.trigger_volume.is_some();

        let mut removed = false;
        if let Some(e) = self.refs.get_mut(&emitter) {
            removed = e.listeners.remove(&listener);
            e.actor_listeners.retain(|&a| a != listener);
        }
        if let Some(l) = self.refs.get_mut(&listener) {
            l.emitters.remove(&emitter);
            l.emitters_with_volumes.remove(&emitter);
        }

        if removed && !has_volume {
            self.transport.unsubscribe(emitter, listener);
        }
        trace!(emitter = %emitter, listener = %listener, "unsubscribed");
    }

    /// Drop every edge touching `id` in either direction.
    pub fn unsubscribe_from_all(&mut self, id: RefId) {
        let Some(obj) = self.refs.get(&id) else {
            return;
        };
        let listeners: Vec<RefId> = obj.listeners.iter().copied().collect();
        let emitters: Vec<RefId> = obj.emitters.iter().copied().collect();

        for listener in listeners {
            self.unsubscribe(id, listener);
            if listener != id {
                self.unsubscribe(listener, id);
            }
        }
        for emitter in emitters {
            self.unsubscribe(emitter, id);
        }
    }

    /// Take `id` out of its grid and drop all of its edges.
    pub fn remove_from_grid_and_unsubscribe_all(&mut self, id: RefId) {
        let Some(obj) = self.refs.get(&id) else {
            return;
        };
        if let Some(grid) = self.grids.get_mut(obj.cell_or_world()) {
            grid.forget(id);
        }
        self.unsubscribe_from_all(id);
    }

    /// Re-evaluate every trigger volume tracking `id` after it moved.
    pub(crate) fn update_trigger_overlaps(&mut self, id: RefId) {
        let Some(obj) = self.refs.get(&id) else {
            return;
        };
        let pos = obj.pos();
        let tracked: Vec<(RefId, bool)> = obj
            .emitters_with_volumes
            .iter()
            .map(|(&emitter, &inside)| (emitter, inside))
            .collect();
        let now = self.clock.now();

        for (emitter, was_inside) in tracked {
            let Some(volume) = self.refs.get(&emitter).and_then(|e| e.trigger_volume) else {
                continue;
            };
            let inside = volume.contains(pos);
            if inside != was_inside {
                if let Some(obj) = self.refs.get_mut(&id) {
                    obj.emitters_with_volumes.insert(emitter, inside);
                }
                let transition = if inside {
                    TriggerTransition::Enter
                } else {
                    TriggerTransition::Leave
                };
                self.timers.schedule(
                    now,
                    TimerTask::TriggerEvent {
                        volume: emitter,
                        other: id,
                        transition,
                    },
                );
            }
            if inside {
                self.events
                    .send_event(emitter, ScriptEvent::Trigger { other: id });
            }
        }
    }
}
