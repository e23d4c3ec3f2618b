use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Generation-checked handle to an entity slot.
///
/// The index addresses an arena slot; the generation is bumped every time the
/// slot is recycled, so a handle held past its entity's destruction never
/// resolves to the slot's next occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId {
    pub index: u32,
    pub generation: u32,
}

impl EntityId {
    /// Handle that never refers to a live entity.
    pub const NULL: Self = Self {
        index: u32::MAX,
        generation: 0,
    };

    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn is_null(&self) -> bool {
        self.index == u32::MAX
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Network identity of a connected peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Guid(pub u64);

impl Guid {
    /// Sentinel for "no owner".
    pub const UNASSIGNED: Self = Self(u64::MAX);

    pub fn is_assigned(&self) -> bool {
        *self != Self::UNASSIGNED
    }
}

impl Default for Guid {
    fn default() -> Self {
        Self::UNASSIGNED
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_assigned() {
            write!(f, "{:#018x}", self.0)
        } else {
            f.write_str("unassigned")
        }
    }
}

/// Spatial transform: position, rotation, velocity.
///
/// Every mutator bumps `generation`, which lets observers detect an
/// authoritative change without comparing values. Writing the public fields
/// directly does not bump it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
    generation: u64,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            generation: 0,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn increment_generation(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.increment_generation();
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
        self.increment_generation();
    }

    pub fn set_velocity(&mut self, velocity: Vec3) {
        self.velocity = velocity;
        self.increment_generation();
    }

    /// Replace position, rotation and velocity at once (a single generation bump).
    pub fn set(&mut self, position: Vec3, rotation: Quat, velocity: Vec3) {
        self.position = position;
        self.rotation = rotation;
        self.velocity = velocity;
        self.increment_generation();
    }

    pub fn distance(&self, other: &Transform) -> f32 {
        self.position.distance(other.position)
    }
}
