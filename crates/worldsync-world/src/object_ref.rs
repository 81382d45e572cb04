//! Runtime state of a placed reference.
//!
//! An [`ObjectReference`] is owned by [`WorldState`](crate::WorldState).
//! Every link it holds to another reference (listeners, emitters, occupant,
//! trigger-volume emitters) is an id that has to be resolved through the
//! world again before use.

use std::collections::{BTreeMap, BTreeSet};

use chrono::TimeDelta;
use worldsync_types::{BaseId, ChangeForm, FormDesc, RefId, Vec3};

use crate::change_form_guard::ChangeFormGuard;

// ---------------------------------------------------------------------------
// Base type
// ---------------------------------------------------------------------------

/// Record type of a reference's base form, as far as the world cares.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BaseType {
    /// Harvestable plant.
    Flor,
    /// Harvestable tree.
    Tree,
    /// Door.
    Door,
    /// Container.
    Cont,
    /// Furniture (chairs, beds, workbenches).
    Furn,
    /// Scripted activator.
    Acti,
    /// Actor base.
    Npc,
    /// A pick-up-able item; carries its record code (`"MISC"`, `"WEAP"`, ...).
    Item(String),
    /// Any other record code.
    Other(String),
}

/// Record codes of item base forms.
const ITEM_CODES: [&str; 11] = [
    "ALCH", "AMMO", "ARMO", "BOOK", "INGR", "KEYM", "LIGH", "MISC", "SCRL", "SLGM", "WEAP",
];

impl BaseType {
    /// Classify a four-letter record code.
    pub fn from_code(code: &str) -> Self {
        match code {
            "FLOR" => Self::Flor,
            "TREE" => Self::Tree,
            "DOOR" => Self::Door,
            "CONT" => Self::Cont,
            "FURN" => Self::Furn,
            "ACTI" => Self::Acti,
            "NPC_" => Self::Npc,
            other if ITEM_CODES.contains(&other) => Self::Item(other.to_owned()),
            other => Self::Other(other.to_owned()),
        }
    }

    /// The four-letter record code.
    pub fn code(&self) -> &str {
        match self {
            Self::Flor => "FLOR",
            Self::Tree => "TREE",
            Self::Door => "DOOR",
            Self::Cont => "CONT",
            Self::Furn => "FURN",
            Self::Acti => "ACTI",
            Self::Npc => "NPC_",
            Self::Item(code) | Self::Other(code) => code,
        }
    }

    /// Whether activating a reference of this type harvests it.
    pub const fn is_harvestable(&self) -> bool {
        matches!(self, Self::Flor | Self::Tree | Self::Item(_))
    }

    /// Built-in reloot delay.
    pub fn default_reloot_time(&self) -> TimeDelta {
        match self {
            Self::Flor | Self::Tree | Self::Cont | Self::Item(_) => TimeDelta::hours(1),
            Self::Door => TimeDelta::seconds(3),
            Self::Furn | Self::Acti | Self::Npc | Self::Other(_) => TimeDelta::zero(),
        }
    }

    /// Maximum distance at which an occupant keeps its claim.
    pub const fn occupancy_reach(&self) -> Option<f32> {
        match self {
            Self::Cont => Some(512.0),
            Self::Furn => Some(256.0),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Trigger volume
// ---------------------------------------------------------------------------

/// Axis-aligned box that fires enter and leave notifications.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerVolume {
    /// Center of the box.
    pub center: Vec3,
    /// Half the box size on each axis.
    pub half_extents: Vec3,
}

impl TriggerVolume {
    /// Whether `pos` lies inside the box, boundary included.
    pub fn contains(&self, pos: Vec3) -> bool {
        (pos.x - self.center.x).abs() <= self.half_extents.x
            && (pos.y - self.center.y).abs() <= self.half_extents.y
            && (pos.z - self.center.z).abs() <= self.half_extents.z
    }
}

// ---------------------------------------------------------------------------
// ObjectReference
// ---------------------------------------------------------------------------

/// A placed entity: identity, persistent snapshot, and subscription edges.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone)]
pub struct ObjectReference {
    pub(crate) id: RefId,
    pub(crate) base_id: BaseId,
    pub(crate) base_type: BaseType,
    pub(crate) is_actor: bool,
    pub(crate) guard: ChangeFormGuard,

    /// References receiving this one's updates.
    pub(crate) listeners: BTreeSet<RefId>,
    /// References this one receives updates from.
    pub(crate) emitters: BTreeSet<RefId>,
    /// Listeners that are actors, in subscription order.
    pub(crate) actor_listeners: Vec<RefId>,

    /// Own trigger volume, if any.
    pub(crate) trigger_volume: Option<TriggerVolume>,
    /// Trigger-volume emitters this reference is tracked by, and whether it
    /// is currently inside each.
    pub(crate) emitters_with_volumes: BTreeMap<RefId, bool>,

    pub(crate) on_init_event_sent: bool,
    pub(crate) ever_subscribed_or_listened: bool,
    pub(crate) activation_blocked: bool,
    pub(crate) set_property_called: bool,
    pub(crate) reloot_time_override: Option<TimeDelta>,
    /// Actor currently using this container or furniture.
    pub(crate) occupant: Option<RefId>,
}

impl ObjectReference {
    pub(crate) fn new(
        id: RefId,
        base_id: BaseId,
        base_type: BaseType,
        is_actor: bool,
        trigger_volume: Option<TriggerVolume>,
        form: ChangeForm,
    ) -> Self {
        Self {
            id,
            base_id,
            base_type,
            is_actor,
            guard: ChangeFormGuard::new(form),
            listeners: BTreeSet::new(),
            emitters: BTreeSet::new(),
            actor_listeners: Vec::new(),
            trigger_volume,
            emitters_with_volumes: BTreeMap::new(),
            on_init_event_sent: false,
            ever_subscribed_or_listened: false,
            activation_blocked: false,
            set_property_called: false,
            reloot_time_override: None,
            occupant: None,
        }
    }

    /// Session id.
    pub const fn id(&self) -> RefId {
        self.id
    }

    /// Template form id.
    pub const fn base_id(&self) -> BaseId {
        self.base_id
    }

    /// Template record type.
    pub const fn base_type(&self) -> &BaseType {
        &self.base_type
    }

    /// Whether this is an actor.
    pub const fn is_actor(&self) -> bool {
        self.is_actor
    }

    /// Whether the reference comes from a game record rather than being
    /// created at runtime.
    pub const fn is_record_backed(&self) -> bool {
        !self.id.is_runtime_created()
    }

    /// Current persistent snapshot.
    pub const fn change_form(&self) -> &ChangeForm {
        self.guard.form()
    }

    /// Current position.
    pub const fn pos(&self) -> Vec3 {
        self.guard.form().position
    }

    /// Worldspace or cell the reference is in.
    pub const fn cell_or_world(&self) -> &FormDesc {
        &self.guard.form().world_or_cell_desc
    }

    /// Whether the reference is disabled.
    pub const fn is_disabled(&self) -> bool {
        self.guard.form().is_disabled
    }

    /// References receiving this one's updates.
    pub const fn listeners(&self) -> &BTreeSet<RefId> {
        &self.listeners
    }

    /// References this one receives updates from.
    pub const fn emitters(&self) -> &BTreeSet<RefId> {
        &self.emitters
    }

    /// Listeners that are actors.
    pub fn actor_listeners(&self) -> &[RefId] {
        &self.actor_listeners
    }

    /// Actor currently using this container or furniture.
    pub const fn occupant(&self) -> Option<RefId> {
        self.occupant
    }

    /// Own trigger volume.
    pub const fn trigger_volume(&self) -> Option<&TriggerVolume> {
        self.trigger_volume.as_ref()
    }

    /// Whether the reference is tracked by the trigger volume of `emitter`,
    /// and if so whether it is currently inside.
    pub fn inside_volume_of(&self, emitter: RefId) -> Option<bool> {
        self.emitters_with_volumes.get(&emitter).copied()
    }

    /// Whether default activation processing is suppressed.
    pub const fn is_activation_blocked(&self) -> bool {
        self.activation_blocked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_codes_round_trip() {
        for code in ["FLOR", "TREE", "DOOR", "CONT", "FURN", "ACTI", "NPC_", "MISC", "STAT"] {
            assert_eq!(BaseType::from_code(code).code(), code);
        }
        assert!(BaseType::from_code("WEAP").is_harvestable());
        assert!(!BaseType::from_code("STAT").is_harvestable());
    }

    #[test]
    fn default_reloot_times() {
        assert_eq!(BaseType::Door.default_reloot_time(), TimeDelta::seconds(3));
        assert_eq!(BaseType::Cont.default_reloot_time(), TimeDelta::hours(1));
        assert_eq!(
            BaseType::from_code("INGR").default_reloot_time(),
            TimeDelta::hours(1)
        );
        assert_eq!(BaseType::Furn.default_reloot_time(), TimeDelta::zero());
    }

    #[test]
    fn trigger_volume_includes_boundary() {
        let volume = TriggerVolume {
            center: Vec3::new(100.0, 100.0, 0.0),
            half_extents: Vec3::new(50.0, 50.0, 50.0),
        };
        assert!(volume.contains(Vec3::new(150.0, 100.0, 0.0)));
        assert!(!volume.contains(Vec3::new(151.0, 100.0, 0.0)));
    }
}
