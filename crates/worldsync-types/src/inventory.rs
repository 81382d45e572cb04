//! Item containers carried by actors and containers.
//!
//! Entries are kept in insertion order and merged by base id, so a given
//! item never appears twice.

use serde::{Deserialize, Serialize};

use crate::error::InventoryError;
use crate::ids::BaseId;

/// One stack of identical items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryEntry {
    /// Template form of the item.
    pub base_id: BaseId,
    /// Stack size, always positive for stored entries.
    pub count: u32,
}

/// Ordered list of item stacks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    /// The stacks, at most one per base id.
    #[serde(default)]
    pub entries: Vec<InventoryEntry>,
}

impl Inventory {
    /// An empty inventory.
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Whether the inventory holds no items.
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|e| e.count == 0)
    }

    /// How many items of `base_id` are present.
    pub fn count_of(&self, base_id: BaseId) -> u32 {
        self.entries
            .iter()
            .filter(|e| e.base_id == base_id)
            .fold(0_u32, |acc, e| acc.saturating_add(e.count))
    }

    /// Add `count` items of `base_id`, merging with an existing stack.
    pub fn add_item(&mut self, base_id: BaseId, count: u32) {
        if count == 0 {
            return;
        }
        if let Some(entry) = self.entries.iter_mut().find(|e| e.base_id == base_id) {
            entry.count = entry.count.saturating_add(count);
        } else {
            self.entries.push(InventoryEntry { base_id, count });
        }
    }

    /// Add every stack of `other`.
    pub fn add_items(&mut self, other: &Self) {
        for entry in &other.entries {
            self.add_item(entry.base_id, entry.count);
        }
    }

    /// Remove every stack of `other`.
    ///
    /// Either all stacks are removed or none are.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::NotEnoughItems`] for the first stack that is
    /// not fully available.
    pub fn remove_items(&mut self, other: &Self) -> Result<(), InventoryError> {
        for wanted in &other.entries {
            let available = self.count_of(wanted.base_id);
            if available < wanted.count {
                return Err(InventoryError::NotEnoughItems {
                    base_id: wanted.base_id.into_inner(),
                    requested: wanted.count,
                    available,
                });
            }
        }
        for wanted in &other.entries {
            if let Some(entry) = self.entries.iter_mut().find(|e| e.base_id == wanted.base_id) {
                entry.count = entry.count.saturating_sub(wanted.count);
            }
        }
        self.entries.retain(|e| e.count > 0);
        Ok(())
    }
}
