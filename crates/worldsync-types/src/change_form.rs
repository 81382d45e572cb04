//! The persistent snapshot of one entity and its document codec.
//!
//! A [`ChangeForm`] is everything about an object reference that must
//! survive a restart. It is stored as a JSON document with camelCase keys.
//! The thirteen keys listed below are mandatory; every other key may be
//! missing from documents written by older servers and falls back to the
//! value in [`ChangeForm::default`].
//!
//! Mandatory: `recType`, `formDesc`, `baseDesc`, `position`, `angle`,
//! `worldOrCellDesc`, `inv`, `isHarvested`, `isOpen`, `baseContainerAdded`,
//! `nextRelootDatetime`, `isDisabled`, `profileId`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::dynamic_fields::DynamicFields;
use crate::error::SnapshotError;
use crate::form_desc::FormDesc;
use crate::geometry::{LocationalData, Vec3};
use crate::inventory::Inventory;

/// Key inside the equipment dump that older documents may lack.
const EQUIPMENT_CHANGES_KEY: &str = "numChanges";

// ---------------------------------------------------------------------------
// Record type
// ---------------------------------------------------------------------------

/// Kind of object reference a snapshot belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RecType {
    /// A placed non-actor object (`REFR`).
    #[default]
    Refr,
    /// A placed actor (`ACHR`).
    Actor,
}

impl TryFrom<u8> for RecType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Refr),
            1 => Ok(Self::Actor),
            other => Err(format!("unknown record type {other}")),
        }
    }
}

impl From<RecType> for u8 {
    fn from(value: RecType) -> Self {
        match value {
            RecType::Refr => 0,
            RecType::Actor => 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Factions
// ---------------------------------------------------------------------------

/// Membership of an actor in a faction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Faction {
    /// The faction form.
    pub form_desc: FormDesc,
    /// Rank within the faction.
    pub rank: u32,
}

/// Factions are wrapped as `{"entries": [...]}` in documents.
mod faction_entries {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::Faction;

    #[derive(Serialize)]
    struct EntriesRef<'a> {
        entries: &'a [Faction],
    }

    #[derive(Deserialize)]
    struct Entries {
        #[serde(default)]
        entries: Vec<Faction>,
    }

    pub fn serialize<S: Serializer>(factions: &[Faction], serializer: S) -> Result<S::Ok, S::Error> {
        EntriesRef { entries: factions }.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Faction>, D::Error> {
        Entries::deserialize(deserializer).map(|e| e.entries)
    }
}

// ---------------------------------------------------------------------------
// ChangeForm
// ---------------------------------------------------------------------------

/// Persistent state of one object reference.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeForm {
    /// Reference or actor.
    pub rec_type: RecType,
    /// Identity of the reference. Immutable once assigned.
    pub form_desc: FormDesc,
    /// Template form the reference was placed from.
    pub base_desc: FormDesc,
    /// Position in world units.
    pub position: Vec3,
    /// Rotation in degrees.
    pub angle: Vec3,
    /// Worldspace or interior cell the reference is in.
    pub world_or_cell_desc: FormDesc,
    /// Carried or contained items.
    pub inv: Inventory,
    /// Harvested flora and picked-up items are awaiting reloot.
    pub is_harvested: bool,
    /// Doors and containers.
    pub is_open: bool,
    /// Whether the base form's default contents were added to `inv`.
    pub base_container_added: bool,
    /// Unix seconds at which the reference reloots, `0` when none pending.
    pub next_reloot_datetime: u64,
    /// Disabled references are invisible and never subscribe.
    pub is_disabled: bool,
    /// Owning user profile, `-1` when unregistered.
    pub profile_id: i32,

    /// Soft-deleted runtime-created reference.
    #[serde(default)]
    pub is_deleted: bool,
    /// Number of items this reference represents when picked up.
    #[serde(default = "default_count")]
    pub count: u32,
    /// Character creation menu is open for the owning user.
    #[serde(default)]
    pub is_race_menu_open: bool,
    /// Script-visible properties.
    #[serde(default)]
    pub dynamic_fields: DynamicFields,
    /// Opaque appearance blob, written as `null` when absent.
    #[serde(default)]
    pub appearance_dump: Option<Value>,
    /// Opaque equipment blob.
    #[serde(default)]
    pub equipment_dump: Option<Value>,
    /// Spell form ids learned at runtime.
    #[serde(default)]
    pub learned_spells: Vec<u32>,

    /// Current health as a fraction of maximum.
    #[serde(default = "full")]
    pub health_percentage: f32,
    /// Current magicka as a fraction of maximum.
    #[serde(default = "full")]
    pub magicka_percentage: f32,
    /// Current stamina as a fraction of maximum.
    #[serde(default = "full")]
    pub stamina_percentage: f32,
    /// Health restored on respawn.
    #[serde(default = "full")]
    pub health_respawn_percentage: f32,
    /// Magicka restored on respawn.
    #[serde(default = "full")]
    pub magicka_respawn_percentage: f32,
    /// Stamina restored on respawn.
    #[serde(default = "full")]
    pub stamina_respawn_percentage: f32,
    /// Actor is dead and awaiting respawn.
    #[serde(default)]
    pub is_dead: bool,
    /// The owning user may run console commands.
    #[serde(default)]
    pub console_commands_allowed: bool,

    /// Respawn position.
    #[serde(default, rename = "spawnPoint_pos")]
    pub spawn_point_pos: Vec3,
    /// Respawn rotation.
    #[serde(default, rename = "spawnPoint_rot")]
    pub spawn_point_rot: Vec3,
    /// Respawn worldspace or cell.
    #[serde(default, rename = "spawnPoint_cellOrWorldDesc")]
    pub spawn_point_cell_or_world_desc: FormDesc,
    /// Seconds between death and respawn.
    #[serde(default = "default_spawn_delay")]
    pub spawn_delay: f32,

    /// Leveled-list chain the actor was generated from.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub template_chain: Vec<FormDesc>,
    /// Last animation event, read from older documents but not written.
    #[serde(default, skip_serializing)]
    pub last_animation: Option<String>,
    /// Per-node texture set overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_node_texture_set: Option<BTreeMap<String, String>>,
    /// Per-node scale overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_node_scale: Option<BTreeMap<String, f32>>,
    /// Name override shown to clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Faction memberships.
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "faction_entries")]
    pub factions: Vec<Faction>,
    /// Active magic effects, stored as an opaque document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effects: Option<Value>,
}

const fn default_count() -> u32 {
    1
}

const fn full() -> f32 {
    1.0
}

const fn default_spawn_delay() -> f32 {
    5.0
}

impl Default for ChangeForm {
    fn default() -> Self {
        Self {
            rec_type: RecType::Refr,
            form_desc: FormDesc::default(),
            base_desc: FormDesc::default(),
            position: Vec3::ZERO,
            angle: Vec3::ZERO,
            world_or_cell_desc: FormDesc::default(),
            inv: Inventory::new(),
            is_harvested: false,
            is_open: false,
            base_container_added: false,
            next_reloot_datetime: 0,
            is_disabled: false,
            profile_id: -1,
            is_deleted: false,
            count: default_count(),
            is_race_menu_open: false,
            dynamic_fields: DynamicFields::new(),
            appearance_dump: None,
            equipment_dump: None,
            learned_spells: Vec::new(),
            health_percentage: full(),
            magicka_percentage: full(),
            stamina_percentage: full(),
            health_respawn_percentage: full(),
            magicka_respawn_percentage: full(),
            stamina_respawn_percentage: full(),
            is_dead: false,
            console_commands_allowed: false,
            spawn_point_pos: Vec3::ZERO,
            spawn_point_rot: Vec3::ZERO,
            spawn_point_cell_or_world_desc: FormDesc::default(),
            spawn_delay: default_spawn_delay(),
            template_chain: Vec::new(),
            last_animation: None,
            set_node_texture_set: None,
            set_node_scale: None,
            display_name: None,
            factions: Vec::new(),
            effects: None,
        }
    }
}

impl ChangeForm {
    /// Current location as a single value.
    pub fn location(&self) -> LocationalData {
        LocationalData {
            pos: self.position,
            rot: self.angle,
            cell_or_world_desc: self.world_or_cell_desc.clone(),
        }
    }

    /// Respawn location as a single value.
    pub fn spawn_point(&self) -> LocationalData {
        LocationalData {
            pos: self.spawn_point_pos,
            rot: self.spawn_point_rot,
            cell_or_world_desc: self.spawn_point_cell_or_world_desc.clone(),
        }
    }

    /// Encode as a snapshot document.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Json`] if a field cannot be represented in
    /// JSON (non-finite floats in node scales).
    pub fn to_json(&self) -> Result<Value, SnapshotError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decode a snapshot document.
    ///
    /// An equipment dump lacking its change counter is normalized to a
    /// counter of zero.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Json`] if a mandatory key is missing or any
    /// present key has the wrong shape.
    pub fn from_json(doc: &Value) -> Result<Self, SnapshotError> {
        let mut form = Self::deserialize(doc)?;
        if let Some(Value::Object(equipment)) = form.equipment_dump.as_mut() {
            if !equipment.contains_key(EQUIPMENT_CHANGES_KEY) {
                equipment.insert(EQUIPMENT_CHANGES_KEY.to_owned(), Value::from(0));
                info!(
                    form_desc = %form.form_desc,
                    "equipment dump missing change counter, setting to 0"
                );
            }
        }
        Ok(form)
    }

    /// Decode a snapshot document from text.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Json`] if the text is not a valid document.
    pub fn from_json_str(text: &str) -> Result<Self, SnapshotError> {
        let doc: Value = serde_json::from_str(text)?;
        Self::from_json(&doc)
    }

    /// Encode as compact document text.
    ///
    /// # Errors
    ///
    /// Same as [`ChangeForm::to_json`].
    pub fn to_json_string(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }
}
