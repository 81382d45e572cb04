//! The single choke point for snapshot mutation.
//!
//! Every change to a reference's [`ChangeForm`] goes through
//! [`ChangeFormGuard::edit`]. The guard mutates a private copy, checks it,
//! and only then swaps it in, so a reader never observes a half-applied
//! edit. It also decides whether the edit asks for the reference to be
//! saved.

use chrono::{DateTime, TimeDelta, Utc};
use worldsync_types::{ChangeForm, FormDesc};

use crate::error::InvariantViolation;

/// Whether an edit should enqueue the reference for persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// Enqueue for the next save flush.
    RequestSave,
    /// Keep the change in memory only.
    NoRequestSave,
}

/// Origin of a position or rotation update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetPosMode {
    /// Routine movement reported by the owning client.
    CalledByUpdateMovement,
    /// Anything else (teleports, scripts, placement).
    Other,
}

/// Owner of a reference's snapshot.
#[derive(Debug, Clone)]
pub struct ChangeFormGuard {
    form: ChangeForm,
    last_save_request: Option<DateTime<Utc>>,
    block_saving: bool,
}

impl ChangeFormGuard {
    /// Wrap an initial snapshot.
    pub const fn new(form: ChangeForm) -> Self {
        Self {
            form,
            last_save_request: None,
            block_saving: false,
        }
    }

    /// The current snapshot.
    pub const fn form(&self) -> &ChangeForm {
        &self.form
    }

    /// Suppress or re-allow save requests.
    pub const fn set_block_saving(&mut self, block: bool) {
        self.block_saving = block;
    }

    /// Apply `mutate` to a copy of the snapshot and swap it in.
    ///
    /// Returns `true` when the edit requested a save.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantViolation::FormDescChanged`] if the edit tried to
    /// reassign an already assigned identity. The snapshot is left
    /// untouched.
    pub fn edit(
        &mut self,
        mode: SaveMode,
        now: DateTime<Utc>,
        mutate: impl FnOnce(&mut ChangeForm),
    ) -> Result<bool, InvariantViolation> {
        let mut copy = self.form.clone();
        mutate(&mut copy);

        if copy.form_desc != self.form.form_desc && self.form.form_desc != FormDesc::default() {
            return Err(InvariantViolation::FormDescChanged {
                from: self.form.form_desc.clone(),
                to: copy.form_desc,
            });
        }

        self.form = copy;

        if mode == SaveMode::RequestSave && !self.block_saving {
            self.last_save_request = Some(now);
            return Ok(true);
        }
        Ok(false)
    }

    /// Whether the transform has gone unsaved for longer than `throttle`.
    pub fn needs_location_save(&self, now: DateTime<Utc>, throttle: TimeDelta) -> bool {
        self.last_save_request.is_none_or(|last| {
            now.signed_duration_since(last) > throttle
        })
    }

    /// Save mode for a transform update.
    ///
    /// Movement updates stay in memory unless the throttle has elapsed;
    /// every other update is saved.
    pub fn location_save_mode(
        &self,
        mode: SetPosMode,
        now: DateTime<Utc>,
        throttle: TimeDelta,
    ) -> SaveMode {
        if self.needs_location_save(now, throttle) {
            return SaveMode::RequestSave;
        }
        match mode {
            SetPosMode::CalledByUpdateMovement => SaveMode::NoRequestSave,
            SetPosMode::Other => SaveMode::RequestSave,
        }
    }
}
