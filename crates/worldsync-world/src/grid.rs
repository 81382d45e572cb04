//! Uniform spatial grid used for area-of-interest queries.
//!
//! Each worldspace or cell has its own [`SpatialGrid`]. References are
//! bucketed by the 4096-unit square their position falls into; two
//! references are neighbors when their buckets are within `radius` of each
//! other on both axes (the 3x3 block around a cell for the default radius
//! of 1).

use std::collections::{BTreeSet, HashMap};

use worldsync_types::{RefId, Vec3};

/// Side length of one grid cell in world units.
pub const CELL_SIZE: f32 = 4096.0;

/// Integer coordinates of a grid cell.
pub type CellKey = (i16, i16);

/// Compute the cell a position falls into.
///
/// Coordinates are truncated toward zero, so the cells straddling an axis
/// are twice as wide as the others.
pub fn cell_key(pos: Vec3) -> CellKey {
    (axis_index(pos.x), axis_index(pos.y))
}

#[allow(clippy::cast_possible_truncation)]
fn axis_index(coord: f32) -> i16 {
    // Saturating float-to-int conversion; NaN maps to 0.
    (coord / CELL_SIZE).trunc() as i16
}

/// Bucketed membership of references in one worldspace or cell.
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    radius: i16,
    cells: HashMap<CellKey, BTreeSet<RefId>>,
    positions: HashMap<RefId, CellKey>,
}

impl SpatialGrid {
    /// Create an empty grid with the given neighbor radius.
    pub fn new(radius: i16) -> Self {
        Self {
            radius: radius.max(0),
            cells: HashMap::new(),
            positions: HashMap::new(),
        }
    }

    /// Place `id` into `key`, removing it from its previous cell.
    ///
    /// Returns `false` without touching the grid when `id` is already in
    /// `key`.
    pub fn move_to(&mut self, id: RefId, key: CellKey) -> bool {
        if self.positions.get(&id) == Some(&key) {
            return false;
        }
        self.forget(id);
        self.cells.entry(key).or_default().insert(id);
        self.positions.insert(id, key);
        true
    }

    /// Remove `id` from the grid. Unknown ids are ignored.
    pub fn forget(&mut self, id: RefId) -> bool {
        let Some(key) = self.positions.remove(&id) else {
            return false;
        };
        if let Some(cell) = self.cells.get_mut(&key) {
            cell.remove(&id);
            if cell.is_empty() {
                self.cells.remove(&key);
            }
        }
        true
    }

    /// The cell `id` currently occupies.
    pub fn cell_of(&self, id: RefId) -> Option<CellKey> {
        self.positions.get(&id).copied()
    }

    /// Snapshot of every reference in `key` and the cells around it.
    pub fn neighbors(&self, key: CellKey) -> BTreeSet<RefId> {
        let mut out = BTreeSet::new();
        let (cx, cy) = key;
        for dx in self.radius.saturating_neg()..=self.radius {
            let Some(x) = cx.checked_add(dx) else {
                continue;
            };
            for dy in self.radius.saturating_neg()..=self.radius {
                let Some(y) = cy.checked_add(dy) else {
                    continue;
                };
                if let Some(cell) = self.cells.get(&(x, y)) {
                    out.extend(cell.iter().copied());
                }
            }
        }
        out
    }

    /// Number of tracked references.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether the grid tracks no references.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
