//! Positions, rotations, and the locational triple of a placed entity.

use serde::{Deserialize, Serialize};

use crate::form_desc::FormDesc;

/// A three-component vector in world units (positions) or degrees
/// (rotations).
///
/// Encoded in snapshot documents as a bare `[x, y, z]` array.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 3]", into = "[f32; 3]")]
pub struct Vec3 {
    /// East-west axis.
    pub x: f32,
    /// North-south axis.
    pub y: f32,
    /// Vertical axis.
    pub z: f32,
}

impl Vec3 {
    /// The origin.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Construct from components.
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to `other`.
    pub fn distance(self, other: Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dz.mul_add(dz, dx.mul_add(dx, dy * dy)).sqrt()
    }
}

impl From<[f32; 3]> for Vec3 {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self { x, y, z }
    }
}

impl From<Vec3> for [f32; 3] {
    fn from(v: Vec3) -> Self {
        [v.x, v.y, v.z]
    }
}

/// Where an entity is: position, rotation, and the world or cell it is in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationalData {
    /// Position in world units.
    pub pos: Vec3,
    /// Rotation in degrees.
    pub rot: Vec3,
    /// Descriptor of the worldspace or interior cell.
    pub cell_or_world_desc: FormDesc,
}
