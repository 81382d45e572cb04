//! Tunables for the world simulation.
//!
//! Embedded in the server's YAML configuration under the `world` key.
//! Every field has a default, so an empty section is valid.

use std::collections::{BTreeMap, BTreeSet};

use chrono::TimeDelta;
use serde::Deserialize;

/// World simulation parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct WorldConfig {
    /// Plugin files in load order. Determines how numeric form ids map to
    /// stored descriptors.
    #[serde(default = "default_load_order")]
    pub load_order: Vec<String>,

    /// How many grid cells around a reference count as "nearby".
    #[serde(default = "default_grid_radius")]
    pub grid_radius: i16,

    /// Maximum seconds a moving reference may go without a location save.
    #[serde(default = "default_location_save_throttle_secs")]
    pub location_save_throttle_secs: u64,

    /// Reloot delay in milliseconds per base type code (`"FLOR"`,
    /// `"CONT"`, ...), overriding the built-in defaults.
    #[serde(default)]
    pub reloot_ms: BTreeMap<String, u64>,

    /// Base type codes that never reloot.
    #[serde(default)]
    pub reloot_forbidden: BTreeSet<String>,
}

fn default_load_order() -> Vec<String> {
    vec![
        "Skyrim.esm".to_owned(),
        "Update.esm".to_owned(),
        "Dawnguard.esm".to_owned(),
        "HearthFires.esm".to_owned(),
        "Dragonborn.esm".to_owned(),
    ]
}

const fn default_grid_radius() -> i16 {
    1
}

const fn default_location_save_throttle_secs() -> u64 {
    30
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            load_order: default_load_order(),
            grid_radius: default_grid_radius(),
            location_save_throttle_secs: default_location_save_throttle_secs(),
            reloot_ms: BTreeMap::new(),
            reloot_forbidden: BTreeSet::new(),
        }
    }
}

impl WorldConfig {
    /// The location-save throttle as a duration.
    pub fn location_save_throttle(&self) -> TimeDelta {
        i64::try_from(self.location_save_throttle_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }

    /// Configured reloot delay for a base type code, if any.
    pub fn reloot_override(&self, base_type: &str) -> Option<TimeDelta> {
        let ms = self.reloot_ms.get(base_type)?;
        i64::try_from(*ms)
            .ok()
            .and_then(TimeDelta::try_milliseconds)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_section_uses_defaults() {
        let config: WorldConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.grid_radius, 1);
        assert_eq!(config.location_save_throttle(), TimeDelta::seconds(30));
        assert_eq!(config.load_order.first().map(String::as_str), Some("Skyrim.esm"));
    }

    #[test]
    fn reloot_override_is_in_milliseconds() {
        let config: WorldConfig =
            serde_json::from_str(r#"{"reloot_ms": {"FLOR": 1500}}"#).unwrap();
        assert_eq!(
            config.reloot_override("FLOR"),
            Some(TimeDelta::milliseconds(1500))
        );
        assert_eq!(config.reloot_override("CONT"), None);
    }
}
