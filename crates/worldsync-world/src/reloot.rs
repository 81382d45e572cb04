//! Scheduled reset of harvested, opened, and emptied references.
//!
//! A pending reloot is marked by a non-zero `next_reloot_datetime` in the
//! snapshot. Requesting a reloot while one is pending does nothing, so the
//! first computed deadline wins.

use chrono::TimeDelta;
use tracing::debug;
use worldsync_types::RefId;

use crate::change_form_guard::SaveMode;
use crate::clock::unix_seconds;
use crate::error::WorldError;
use crate::object_ref::{BaseType, ObjectReference};
use crate::timer::TimerTask;
use crate::world_state::WorldState;

impl WorldState {
    /// Effective reloot delay of a reference: its own override, then the
    /// configured delay for its base type, then the built-in default.
    pub fn reloot_time(&self, obj: &ObjectReference) -> TimeDelta {
        obj.reloot_time_override
            .or_else(|| self.config.reloot_override(obj.base_type.code()))
            .unwrap_or_else(|| obj.base_type.default_reloot_time())
    }

    /// Schedule a reloot of `id`.
    ///
    /// Only record-backed references whose base type is not forbidden
    /// reloot. Returns `true` if a new reloot was scheduled, `false` if the
    /// reference does not reloot or one is already pending.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::RefNotFound`] for an unknown id.
    pub fn request_reloot(
        &mut self,
        id: RefId,
        time_override: Option<TimeDelta>,
    ) -> Result<bool, WorldError> {
        let obj = self.get(id)?;
        if !obj.is_record_backed() {
            return Ok(false);
        }
        if self.config.reloot_forbidden.contains(obj.base_type.code()) {
            return Ok(false);
        }
        if obj.change_form().next_reloot_datetime != 0 {
            return Ok(false);
        }

        let time = time_override.unwrap_or_else(|| self.reloot_time(obj));
        let now = self.clock.now();
        let at = now.checked_add_signed(time).unwrap_or(now);
        let datetime = unix_seconds(at).max(1);

        self.edit_change_form(id, SaveMode::RequestSave, |form| {
            form.next_reloot_datetime = datetime;
        })?;
        self.timers.schedule(at, TimerTask::Reloot(id));
        debug!(ref_id = %id, reloot_at = datetime, delay_ms = time.num_milliseconds(), "reloot scheduled");
        Ok(true)
    }

    /// Reset a reference whose reloot deadline has passed.
    ///
    /// Closes it, clears the harvested flag, and refills containers from
    /// their base form. Does nothing if no reloot is pending.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::RefNotFound`] for an unknown id.
    pub fn do_reloot(&mut self, id: RefId) -> Result<(), WorldError> {
        let obj = self.get(id)?;
        if obj.change_form().next_reloot_datetime == 0 {
            return Ok(());
        }
        let is_container = obj.base_type == BaseType::Cont;

        self.edit_change_form(id, SaveMode::RequestSave, |form| {
            form.next_reloot_datetime = 0;
        })?;
        self.set_open(id, false)?;
        self.set_harvested(id, false)?;
        if is_container {
            self.reloot_container(id)?;
        }
        debug!(ref_id = %id, "relooted");
        Ok(())
    }

    fn reloot_container(&mut self, id: RefId) -> Result<(), WorldError> {
        self.edit_change_form(id, SaveMode::NoRequestSave, |form| {
            form.inv.entries.clear();
            form.base_container_added = false;
        })?;
        self.ensure_base_container_added(id)
    }

    /// Fill a container with its base form's contents the first time it is
    /// used.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::RefNotFound`] for an unknown id.
    pub fn ensure_base_container_added(&mut self, id: RefId) -> Result<(), WorldError> {
        let obj = self.get(id)?;
        if obj.change_form().base_container_added {
            return Ok(());
        }
        let items = self.records.base_container(obj.base_id);
        self.edit_change_form(id, SaveMode::RequestSave, |form| {
            form.inv.add_items(&items);
            form.base_container_added = true;
        })
    }
}
