//! Delayed propagation of activation from parent to child references.

use std::collections::BTreeMap;

use chrono::TimeDelta;
use tracing::{debug, warn};
use worldsync_types::RefId;

use crate::error::WorldError;
use crate::timer::TimerTask;
use crate::world_state::WorldState;

/// Parent reference to the children it activates, with per-child delay.
#[derive(Debug, Clone, Default)]
pub struct ActivationChildrenIndex {
    by_parent: BTreeMap<RefId, BTreeMap<RefId, TimeDelta>>,
}

impl ActivationChildrenIndex {
    /// An empty index.
    pub const fn new() -> Self {
        Self {
            by_parent: BTreeMap::new(),
        }
    }

    /// Record that activating `parent` activates `child` after
    /// `delay_secs`.
    pub fn insert(&mut self, parent: RefId, child: RefId, delay_secs: f32) {
        self.by_parent
            .entry(parent)
            .or_default()
            .insert(child, secs_to_delta(delay_secs));
    }

    /// Children of `parent` with their delays.
    pub fn children(&self, parent: RefId) -> Vec<(RefId, TimeDelta)> {
        self.by_parent
            .get(&parent)
            .map(|children| children.iter().map(|(&c, &d)| (c, d)).collect())
            .unwrap_or_default()
    }

    /// Forget `id` as a parent and as a child.
    pub fn remove_ref(&mut self, id: RefId) {
        self.by_parent.remove(&id);
        self.by_parent.retain(|_, children| {
            children.remove(&id);
            !children.is_empty()
        });
    }

    /// Number of parents with at least one child.
    pub fn len(&self) -> usize {
        self.by_parent.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.by_parent.is_empty()
    }
}

#[allow(clippy::cast_possible_truncation)]
fn secs_to_delta(secs: f32) -> TimeDelta {
    if !secs.is_finite() || secs <= 0.0 {
        return TimeDelta::zero();
    }
    // Saturating float-to-int conversion.
    let ms = (f64::from(secs) * 1000.0).round() as i64;
    TimeDelta::try_milliseconds(ms).unwrap_or(TimeDelta::MAX)
}

impl WorldState {
    /// Schedule activation of every child of `parent`, each after its own
    /// delay.
    pub fn activate_children(&mut self, parent: RefId) {
        let now = self.clock.now();
        for (child, delay) in self.activation_children.children(parent) {
            let at = now.checked_add_signed(delay).unwrap_or(now);
            self.timers
                .schedule(at, TimerTask::ActivateChild { child, parent });
            debug!(parent = %parent, child = %child, delay_ms = delay.num_milliseconds(), "child activation scheduled");
        }
    }

    pub(crate) fn fire_activation_child(
        &mut self,
        child: RefId,
        parent: RefId,
    ) -> Result<(), WorldError> {
        if !self.refs.contains_key(&child) {
            warn!(parent = %parent, child = %child, "activation child no longer exists");
            return Ok(());
        }
        if !self.refs.contains_key(&parent) {
            debug!(parent = %parent, child = %child, "activation parent no longer exists");
            return Ok(());
        }
        match self.activate(child, parent) {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(parent = %parent, child = %child, error = %e, "child activation rejected");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_are_converted_to_milliseconds() {
        let mut index = ActivationChildrenIndex::new();
        index.insert(RefId::new(1), RefId::new(2), 1.5);
        index.insert(RefId::new(1), RefId::new(3), -1.0);
        assert_eq!(
            index.children(RefId::new(1)),
            vec![
                (RefId::new(2), TimeDelta::milliseconds(1500)),
                (RefId::new(3), TimeDelta::zero()),
            ]
        );
    }

    #[test]
    fn removing_a_child_drops_empty_parents() {
        let mut index = ActivationChildrenIndex::new();
        index.insert(RefId::new(1), RefId::new(2), 0.0);
        index.remove_ref(RefId::new(2));
        assert!(index.is_empty());
    }
}
