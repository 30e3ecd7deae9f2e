//! Physics engine interface and physics tunables
//!
//! The simulation never integrates bodies itself. It talks to a rigid-body
//! engine through [`PhysicsEngine`]: create/remove bodies, push velocities and
//! collision masks, step, and receive contact begin/end events synchronously
//! from inside the step.

use serde::{Deserialize, Serialize};

/// 2D vector in world units (pixels, y pointing down)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Opaque engine-side body reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(pub u64);

/// Collision category a body belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyCategory {
    /// World boundary, always solid
    Wall,
    /// One-way platform
    Platform,
    /// Player-controlled dynamic body
    Player,
}

impl BodyCategory {
    pub const fn bits(self) -> u32 {
        match self {
            BodyCategory::Wall => 0x0001,
            BodyCategory::Platform => 0x0002,
            BodyCategory::Player => 0x0004,
        }
    }

    #[cfg(test)]
    pub fn is_static(self) -> bool {
        matches!(self, BodyCategory::Wall | BodyCategory::Platform)
    }
}

/// Set of categories a player body collides with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollisionMask(u32);

impl CollisionMask {
    /// Walls and platforms
    pub const SOLID: CollisionMask =
        CollisionMask(BodyCategory::Wall.bits() | BodyCategory::Platform.bits());
    /// Walls only: platforms are passed through
    pub const WALLS_ONLY: CollisionMask = CollisionMask(BodyCategory::Wall.bits());

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, category: BodyCategory) -> bool {
        self.0 & category.bits() != 0
    }
}

/// Material properties that can be pushed to a live body
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyMaterial {
    pub friction: f32,
    /// Linear damping while airborne or not
    pub friction_air: f32,
    pub restitution: f32,
    /// Rotational inertia, `f32::INFINITY` locks rotation
    pub inertia: f32,
}

/// Description of a player body at creation time
#[derive(Debug, Clone, Copy)]
pub struct PlayerBodyDesc {
    /// Centre of the body
    pub position: Vec2,
    /// Side length of the square body
    pub size: f32,
    /// Corner rounding, fixed for the life of the body
    pub corner_radius: f32,
    pub material: BodyMaterial,
    pub mask: CollisionMask,
}

/// Description of an immovable rectangle
#[derive(Debug, Clone, Copy)]
pub struct StaticBodyDesc {
    /// Centre of the rectangle
    pub position: Vec2,
    pub width: f32,
    pub height: f32,
    pub category: BodyCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactPhase {
    Began,
    Ended,
}

/// One body of a contact pair, with its position at the time of the event
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactSide {
    pub handle: BodyHandle,
    pub position: Vec2,
}

/// Contact begin/end notification delivered during [`PhysicsEngine::step`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactEvent {
    pub phase: ContactPhase,
    pub a: ContactSide,
    pub b: ContactSide,
}

/// Command/event interface to a 2D rigid-body engine
pub trait PhysicsEngine {
    /// Set vertical gravity in px/s² (positive is down)
    fn set_gravity(&mut self, gravity: f32);

    fn add_player_body(&mut self, desc: &PlayerBodyDesc) -> BodyHandle;

    fn add_static_body(&mut self, desc: &StaticBodyDesc) -> BodyHandle;

    /// Detach and discard a body. Unknown handles are ignored.
    fn remove_body(&mut self, handle: BodyHandle);

    fn position(&self, handle: BodyHandle) -> Option<Vec2>;

    fn velocity(&self, handle: BodyHandle) -> Option<Vec2>;

    fn set_velocity(&mut self, handle: BodyHandle, velocity: Vec2);

    fn set_collision_mask(&mut self, handle: BodyHandle, mask: CollisionMask);

    fn set_material(&mut self, handle: BodyHandle, material: &BodyMaterial);

    /// Advance the world by `dt` seconds. Contact events are handed to
    /// `on_contact` before this returns. The callback must only flip flags on
    /// existing bodies, never add or remove them.
    fn step(&mut self, dt: f32, on_contact: &mut dyn FnMut(&ContactEvent));
}

// ============================================================================
// Tunables
// ============================================================================

/// World-wide physics tunables
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldPhysicsConfig {
    /// Downward acceleration in px/s²
    pub gravity: f32,
    /// How long platforms are ignored after a drop-through starts
    pub drop_through_duration_ms: u64,
}

impl Default for WorldPhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: 1000.0,
            drop_through_duration_ms: 400,
        }
    }
}

/// Partial update of [`WorldPhysicsConfig`]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldPhysicsPatch {
    pub gravity: Option<f32>,
    pub drop_through_duration_ms: Option<u64>,
}

impl WorldPhysicsConfig {
    pub fn apply(&mut self, patch: &WorldPhysicsPatch) {
        if let Some(gravity) = patch.gravity {
            self.gravity = gravity;
        }
        if let Some(duration) = patch.drop_through_duration_ms {
            self.drop_through_duration_ms = duration;
        }
    }
}

/// Per-player movement tunables
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerPhysicsConfig {
    /// Horizontal speed in px/s
    pub move_speed: f32,
    /// Vertical velocity set on jump, negative is up
    pub jump_force: f32,
    pub friction: f32,
    pub friction_air: f32,
    pub restitution: f32,
    pub inertia: f32,
    pub chamfer_radius: f32,
}

impl Default for PlayerPhysicsConfig {
    fn default() -> Self {
        Self {
            move_speed: 300.0,
            jump_force: -480.0,
            friction: 0.01,
            friction_air: 0.0,
            restitution: 0.0,
            inertia: f32::INFINITY,
            chamfer_radius: 5.0,
        }
    }
}

impl PlayerPhysicsConfig {
    pub fn material(&self) -> BodyMaterial {
        BodyMaterial {
            friction: self.friction,
            friction_air: self.friction_air,
            restitution: self.restitution,
            inertia: self.inertia,
        }
    }

    /// Copy of this config with the patch merged on top
    pub fn merged(&self, patch: &PlayerPhysicsPatch) -> Self {
        Self {
            move_speed: patch.move_speed.unwrap_or(self.move_speed),
            jump_force: patch.jump_force.unwrap_or(self.jump_force),
            friction: patch.friction.unwrap_or(self.friction),
            friction_air: patch.friction_air.unwrap_or(self.friction_air),
            restitution: patch.restitution.unwrap_or(self.restitution),
            inertia: patch.inertia.unwrap_or(self.inertia),
            chamfer_radius: patch.chamfer_radius.unwrap_or(self.chamfer_radius),
        }
    }
}

/// Partial update of [`PlayerPhysicsConfig`]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerPhysicsPatch {
    pub move_speed: Option<f32>,
    pub jump_force: Option<f32>,
    pub friction: Option<f32>,
    pub friction_air: Option<f32>,
    pub restitution: Option<f32>,
    pub inertia: Option<f32>,
    pub chamfer_radius: Option<f32>,
}

impl PlayerPhysicsPatch {
    /// Whether the patch touches anything that lives on the engine body
    pub fn touches_material(&self) -> bool {
        self.friction.is_some()
            || self.friction_air.is_some()
            || self.restitution.is_some()
            || self.inertia.is_some()
    }
}

// ============================================================================
// Scripted engine for deterministic tests
// ============================================================================
