//! Contact & motion controller
//!
//! Owns the per-player dynamic body state, turns intents into velocity and
//! collision-mask commands for the engine, and classifies contact events into
//! grounded / platform transitions.

use std::collections::HashMap;

use tracing::{debug, error, info};

use super::intent::PlayerIntent;
use super::physics::{
    BodyCategory, BodyHandle, CollisionMask, ContactEvent, ContactPhase, ContactSide,
    PhysicsEngine, PlayerBodyDesc, PlayerPhysicsConfig, PlayerPhysicsPatch, StaticBodyDesc, Vec2,
    WorldPhysicsConfig, WorldPhysicsPatch,
};

/// Jumps available between two landings
pub const MAX_JUMPS: u8 = 2;

/// Physics-side state of one connected player
#[derive(Debug, Clone)]
pub struct DynamicBody {
    pub handle: BodyHandle,
    pub grounded: bool,
    pub jumps_used: u8,
    /// Absolute unix millis until which platforms are ignored, 0 when not dropping
    pub dropping_until: u64,
    pub standing_on_platform: bool,
    pub mask: CollisionMask,
    pub config: PlayerPhysicsConfig,
}

/// What a given engine handle stands for
#[derive(Debug, Clone, PartialEq, Eq)]
enum BodyRole {
    Player(String),
    Static(BodyCategory),
}

/// Faults raised while classifying a contact event
#[derive(Debug, thiserror::Error)]
pub enum ContactError {
    #[error("Contact references player body {0} with no dynamic state")]
    MissingPlayerState(String),
}

/// Rejected physics config patches
#[derive(Debug, thiserror::Error)]
pub enum PhysicsConfigError {
    #[error("Corner radius is fixed at body creation ({current}), cannot change to {requested}")]
    CornerRadiusImmutable { current: f32, requested: f32 },
}

pub struct MotionController<E> {
    engine: E,
    world_config: WorldPhysicsConfig,
    default_player_config: PlayerPhysicsConfig,
    bodies: HashMap<String, DynamicBody>,
    roles: HashMap<BodyHandle, BodyRole>,
}

impl<E: PhysicsEngine> MotionController<E> {
    pub fn new(mut engine: E, world_config: WorldPhysicsConfig) -> Self {
        engine.set_gravity(world_config.gravity);
        Self {
            engine,
            world_config,
            default_player_config: PlayerPhysicsConfig::default(),
            bodies: HashMap::new(),
            roles: HashMap::new(),
        }
    }

    pub fn world_config(&self) -> &WorldPhysicsConfig {
        &self.world_config
    }

    pub fn body(&self, id: &str) -> Option<&DynamicBody> {
        self.bodies.get(id)
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    #[cfg(test)]
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Add immutable world geometry
    pub fn create_static_body(&mut self, desc: &StaticBodyDesc) -> BodyHandle {
        let handle = self.engine.add_static_body(desc);
        self.roles.insert(handle, BodyRole::Static(desc.category));
        handle
    }

    /// Register a player body at `(x, y)` with the default tunables plus `overrides`
    pub fn create_player_body(
        &mut self,
        id: &str,
        x: f32,
        y: f32,
        size: f32,
        overrides: &PlayerPhysicsPatch,
    ) -> BodyHandle {
        if self.bodies.contains_key(id) {
            self.remove_player_body(id);
        }

        let config = self.default_player_config.merged(overrides);
        let handle = self.engine.add_player_body(&PlayerBodyDesc {
            position: Vec2::new(x, y),
            size,
            corner_radius: config.chamfer_radius,
            material: config.material(),
            mask: CollisionMask::SOLID,
        });

        self.roles.insert(handle, BodyRole::Player(id.to_string()));
        self.bodies.insert(
            id.to_string(),
            DynamicBody {
                handle,
                grounded: false,
                jumps_used: 0,
                dropping_until: 0,
                standing_on_platform: false,
                mask: CollisionMask::SOLID,
                config,
            },
        );
        handle
    }

    /// Detach and discard a player's body. Unknown ids are a no-op.
    pub fn remove_player_body(&mut self, id: &str) -> bool {
        let Some(dynamic) = self.bodies.remove(id) else {
            return false;
        };
        self.roles.remove(&dynamic.handle);
        self.engine.remove_body(dynamic.handle);
        true
    }

    /// Latest engine position of a player body
    pub fn position(&self, id: &str) -> Option<Vec2> {
        let dynamic = self.bodies.get(id)?;
        self.engine.position(dynamic.handle)
    }

    /// Apply this tick's intents. `now` is unix millis.
    ///
    /// Every body gets its platform mask refreshed, since "moving up" and
    /// "dropping" change without input. Velocity is only commanded for players
    /// that sent an intent this tick; the others keep what the engine carried.
    pub fn apply_intents(&mut self, intents: &HashMap<String, PlayerIntent>, now: u64) {
        let drop_duration = self.world_config.drop_through_duration_ms;

        for (id, dynamic) in self.bodies.iter_mut() {
            let intent = intents.get(id);

            if let Some(intent) = intent {
                if intent.down
                    && dynamic.grounded
                    && dynamic.standing_on_platform
                    && dynamic.dropping_until == 0
                {
                    dynamic.dropping_until = now.saturating_add(drop_duration);
                    debug!(player_id = %id, until = dynamic.dropping_until, "Drop-through started");
                }
            }

            let velocity = self.engine.velocity(dynamic.handle).unwrap_or(Vec2::ZERO);
            let is_dropping_through = now < dynamic.dropping_until;
            let is_moving_up = velocity.y < 0.0;

            let mask = if is_dropping_through || is_moving_up {
                CollisionMask::WALLS_ONLY
            } else {
                CollisionMask::SOLID
            };
            if dynamic.mask != mask {
                dynamic.mask = mask;
                self.engine.set_collision_mask(dynamic.handle, mask);
            }

            if !is_dropping_through && dynamic.dropping_until > 0 {
                dynamic.dropping_until = 0;
            }

            let Some(intent) = intent else {
                continue;
            };

            let mut vx = 0.0;
            if intent.left {
                vx -= dynamic.config.move_speed;
            }
            if intent.right {
                vx += dynamic.config.move_speed;
            }

            let mut vy = velocity.y;
            if intent.jump && dynamic.jumps_used < MAX_JUMPS {
                vy = dynamic.config.jump_force;
                dynamic.jumps_used += 1;
            }

            self.engine.set_velocity(dynamic.handle, Vec2::new(vx, vy));
        }
    }

    /// Step the engine by `dt` seconds, classifying contacts as they arrive
    pub fn step(&mut self, dt: f32) {
        let bodies = &mut self.bodies;
        let roles = &self.roles;
        self.engine.step(dt, &mut |event| {
            if let Err(e) = classify_contact(bodies, roles, event) {
                error!(error = %e, "Error in contact event handler");
            }
        });
    }

    /// Classify a single contact event outside of a step
    #[cfg(test)]
    pub fn handle_contact(&mut self, event: &ContactEvent) -> Result<(), ContactError> {
        classify_contact(&mut self.bodies, &self.roles, event)
    }

    /// Merge-patch the world tunables; gravity is pushed to the engine at once
    pub fn update_world_config(&mut self, patch: &WorldPhysicsPatch) {
        self.world_config.apply(patch);
        if let Some(gravity) = patch.gravity {
            self.engine.set_gravity(gravity);
        }
        info!(config = ?self.world_config, "World physics config updated");
    }

    /// Merge-patch one player's tunables. Unknown players are ignored.
    pub fn update_player_config(
        &mut self,
        id: &str,
        patch: &PlayerPhysicsPatch,
    ) -> Result<(), PhysicsConfigError> {
        let Some(dynamic) = self.bodies.get_mut(id) else {
            debug!(player_id = %id, "Physics patch for unknown player ignored");
            return Ok(());
        };

        if let Some(requested) = patch.chamfer_radius {
            let current = dynamic.config.chamfer_radius;
            if requested != current {
                return Err(PhysicsConfigError::CornerRadiusImmutable { current, requested });
            }
        }

        dynamic.config = dynamic.config.merged(patch);
        if patch.touches_material() {
            self.engine
                .set_material(dynamic.handle, &dynamic.config.material());
        }
        info!(player_id = %id, config = ?dynamic.config, "Player physics config updated");
        Ok(())
    }
}

/// Update grounded state from one contact event.
///
/// Only pairs of a player and static geometry count, and only when the player
/// is above the geometry (smaller y), so touching a wall sideways never
/// grounds anyone.
fn classify_contact(
    bodies: &mut HashMap<String, DynamicBody>,
    roles: &HashMap<BodyHandle, BodyRole>,
    event: &ContactEvent,
) -> Result<(), ContactError> {
    let role_of = |side: &ContactSide| roles.get(&side.handle);

    let (player_id, player, ground, category) = match (role_of(&event.a), role_of(&event.b)) {
        (Some(BodyRole::Player(id)), Some(BodyRole::Static(category))) => {
            (id, event.a, event.b, *category)
        }
        (Some(BodyRole::Static(category)), Some(BodyRole::Player(id))) => {
            (id, event.b, event.a, *category)
        }
        _ => return Ok(()),
    };

    let dynamic = bodies
        .get_mut(player_id)
        .ok_or_else(|| ContactError::MissingPlayerState(player_id.clone()))?;

    if player.position.y >= ground.position.y {
        return Ok(());
    }

    match event.phase {
        ContactPhase::Began => {
            dynamic.grounded = true;
            dynamic.jumps_used = 0;
            dynamic.standing_on_platform = category == BodyCategory::Platform;
        }
        ContactPhase::Ended => {
            dynamic.grounded = false;
            dynamic.standing_on_platform = false;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::physics::scripted::ScriptedEngine;

    const DT: f32 = 1.0 / 60.0;

    fn controller() -> MotionController<ScriptedEngine> {
        MotionController::new(ScriptedEngine::new(), WorldPhysicsConfig::default())
    }

    fn platform(controller: &mut MotionController<ScriptedEngine>, y: f32) -> BodyHandle {
        controller.create_static_body(&StaticBodyDesc {
            position: Vec2::new(400.0, y),
            width: 200.0,
            height: 20.0,
            category: BodyCategory::Platform,
        })
    }

    fn wall(controller: &mut MotionController<ScriptedEngine>, x: f32, y: f32) -> BodyHandle {
        controller.create_static_body(&StaticBodyDesc {
            position: Vec2::new(x, y),
            width: 50.0,
            height: 700.0,
            category: BodyCategory::Wall,
        })
    }

    fn intents(id: &str, intent: PlayerIntent) -> HashMap<String, PlayerIntent> {
        HashMap::from([(id.to_string(), intent)])
    }

    fn land(controller: &mut MotionController<ScriptedEngine>, id: &str, ground: BodyHandle) {
        let handle = controller.body(id).unwrap().handle;
        controller
            .engine_mut()
            .queue_contact(ContactPhase::Began, handle, ground);
        controller.step(DT);
    }

    #[test]
    fn new_body_starts_airborne_with_full_budget() {
        let mut c = controller();
        c.create_player_body("a", 100.0, 100.0, 20.0, &PlayerPhysicsPatch::default());

        let body = c.body("a").unwrap();
        assert!(!body.grounded);
        assert_eq!(body.jumps_used, 0);
        assert_eq!(body.dropping_until, 0);
        assert!(!body.standing_on_platform);
        assert_eq!(body.mask, CollisionMask::SOLID);
    }

    #[test]
    fn horizontal_velocity_follows_intent_without_drift() {
        let mut c = controller();
        let handle = c.create_player_body("a", 100.0, 100.0, 20.0, &PlayerPhysicsPatch::default());

        c.apply_intents(&intents("a", PlayerIntent { left: true, ..Default::default() }), 0);
        assert_eq!(c.engine().body(handle).velocity.x, -300.0);

        c.apply_intents(
            &intents("a", PlayerIntent { left: true, right: true, ..Default::default() }),
            0,
        );
        assert_eq!(c.engine().body(handle).velocity.x, 0.0);

        c.apply_intents(&intents("a", PlayerIntent { right: true, ..Default::default() }), 0);
        assert_eq!(c.engine().body(handle).velocity.x, 300.0);

        c.apply_intents(&intents("a", PlayerIntent::default()), 0);
        assert_eq!(c.engine().body(handle).velocity.x, 0.0);
    }

    #[test]
    fn vertical_velocity_is_preserved_without_jump() {
        let mut c = controller();
        let handle = c.create_player_body("a", 100.0, 100.0, 20.0, &PlayerPhysicsPatch::default());
        c.engine_mut().body_mut(handle).velocity = Vec2::new(0.0, 123.0);

        c.apply_intents(&intents("a", PlayerIntent { right: true, ..Default::default() }), 0);

        assert_eq!(c.engine().body(handle).velocity.y, 123.0);
    }

    #[test]
    fn double_jump_budget_ignores_third_press() {
        let mut c = controller();
        let ground = platform(&mut c, 500.0);
        let handle = c.create_player_body("a", 400.0, 480.0, 20.0, &PlayerPhysicsPatch::default());
        land(&mut c, "a", ground);
        assert!(c.body("a").unwrap().grounded);

        let jump = intents("a", PlayerIntent { jump: true, ..Default::default() });

        c.apply_intents(&jump, 0);
        assert_eq!(c.engine().body(handle).velocity.y, -480.0);
        c.step(DT);

        c.apply_intents(&jump, 0);
        assert_eq!(c.engine().body(handle).velocity.y, -480.0);
        assert_eq!(c.body("a").unwrap().jumps_used, 2);
        c.step(DT);

        let before = c.engine().body(handle).velocity.y;
        c.apply_intents(&jump, 0);
        assert_eq!(c.engine().body(handle).velocity.y, before);
        assert_eq!(c.body("a").unwrap().jumps_used, 2);
    }

    #[test]
    fn landing_refills_jump_budget() {
        let mut c = controller();
        let ground = platform(&mut c, 500.0);
        c.create_player_body("a", 400.0, 300.0, 20.0, &PlayerPhysicsPatch::default());

        let jump = intents("a", PlayerIntent { jump: true, ..Default::default() });
        c.apply_intents(&jump, 0);
        c.apply_intents(&jump, 0);
        assert_eq!(c.body("a").unwrap().jumps_used, 2);

        land(&mut c, "a", ground);

        let body = c.body("a").unwrap();
        assert_eq!(body.jumps_used, 0);
        assert!(body.grounded);
        assert!(body.standing_on_platform);
    }

    #[test]
    fn side_contact_with_wall_does_not_ground() {
        let mut c = controller();
        // Wall centre is above the player, as with a tall boundary wall
        let side_wall = wall(&mut c, -25.0, 300.0);
        let handle = c.create_player_body("a", 10.0, 400.0, 20.0, &PlayerPhysicsPatch::default());

        c.engine_mut()
            .queue_contact(ContactPhase::Began, side_wall, handle);
        c.step(DT);

        assert!(!c.body("a").unwrap().grounded);
    }

    #[test]
    fn contact_end_clears_grounded_state() {
        let mut c = controller();
        let ground = platform(&mut c, 500.0);
        let handle = c.create_player_body("a", 400.0, 480.0, 20.0, &PlayerPhysicsPatch::default());
        land(&mut c, "a", ground);

        c.engine_mut()
            .queue_contact(ContactPhase::Ended, handle, ground);
        c.step(DT);

        let body = c.body("a").unwrap();
        assert!(!body.grounded);
        assert!(!body.standing_on_platform);
    }

    #[test]
    fn landing_on_wall_is_not_a_platform() {
        let mut c = controller();
        let floor = c.create_static_body(&StaticBodyDesc {
            position: Vec2::new(400.0, 625.0),
            width: 900.0,
            height: 50.0,
            category: BodyCategory::Wall,
        });
        c.create_player_body("a", 400.0, 580.0, 20.0, &PlayerPhysicsPatch::default());
        land(&mut c, "a", floor);

        let body = c.body("a").unwrap();
        assert!(body.grounded);
        assert!(!body.standing_on_platform);

        // Down on a wall never starts a drop-through
        c.apply_intents(&intents("a", PlayerIntent { down: true, ..Default::default() }), 1_000);
        assert_eq!(c.body("a").unwrap().dropping_until, 0);
    }

    #[test]
    fn player_pairs_are_ignored() {
        let mut c = controller();
        let a = c.create_player_body("a", 400.0, 100.0, 20.0, &PlayerPhysicsPatch::default());
        let b = c.create_player_body("b", 400.0, 200.0, 20.0, &PlayerPhysicsPatch::default());

        c.engine_mut().queue_contact(ContactPhase::Began, a, b);
        c.step(DT);

        assert!(!c.body("a").unwrap().grounded);
        assert!(!c.body("b").unwrap().grounded);
    }

    #[test]
    fn contact_fault_is_reported_and_leaves_state_alone() {
        let mut c = controller();
        let ground = platform(&mut c, 500.0);
        let handle = c.create_player_body("a", 400.0, 480.0, 20.0, &PlayerPhysicsPatch::default());
        c.bodies.remove("a");

        let event = ContactEvent {
            phase: ContactPhase::Began,
            a: ContactSide { handle, position: Vec2::new(400.0, 480.0) },
            b: ContactSide { handle: ground, position: Vec2::new(400.0, 500.0) },
        };
        assert!(matches!(
            c.handle_contact(&event),
            Err(ContactError::MissingPlayerState(id)) if id == "a"
        ));

        // Inside a step the fault is swallowed
        c.engine_mut()
            .queue_contact(ContactPhase::Began, handle, ground);
        c.step(DT);
        assert!(c.body("a").is_none());
    }

    #[test]
    fn drop_through_ignores_platforms_for_configured_duration() {
        let mut c = controller();
        let ground = platform(&mut c, 500.0);
        let handle = c.create_player_body("a", 400.0, 480.0, 20.0, &PlayerPhysicsPatch::default());
        land(&mut c, "a", ground);
        c.engine_mut().body_mut(handle).velocity = Vec2::ZERO;

        let down = intents("a", PlayerIntent { down: true, ..Default::default() });
        c.apply_intents(&down, 10_000);

        let body = c.body("a").unwrap();
        assert_eq!(body.dropping_until, 10_400);
        assert_eq!(body.mask, CollisionMask::WALLS_ONLY);
        assert_eq!(c.engine().body(handle).mask, CollisionMask::WALLS_ONLY);

        // Still dropping just before the deadline, even while falling
        c.engine_mut().body_mut(handle).velocity = Vec2::new(0.0, 50.0);
        c.apply_intents(&HashMap::new(), 10_399);
        assert_eq!(c.body("a").unwrap().mask, CollisionMask::WALLS_ONLY);

        // Deadline reached: platforms are solid again and the timer resets
        c.apply_intents(&HashMap::new(), 10_400);
        let body = c.body("a").unwrap();
        assert_eq!(body.mask, CollisionMask::SOLID);
        assert_eq!(body.dropping_until, 0);
        assert!(body.mask.contains(BodyCategory::Wall));
    }

    #[test]
    fn drop_through_requires_grounded_on_platform() {
        let mut c = controller();
        c.create_player_body("a", 400.0, 100.0, 20.0, &PlayerPhysicsPatch::default());

        let down = intents("a", PlayerIntent { down: true, ..Default::default() });
        c.apply_intents(&down, 5_000);

        assert_eq!(c.body("a").unwrap().dropping_until, 0);
        assert_eq!(c.body("a").unwrap().mask, CollisionMask::SOLID);
    }

    #[test]
    fn moving_up_passes_through_platforms() {
        let mut c = controller();
        let handle = c.create_player_body("a", 400.0, 100.0, 20.0, &PlayerPhysicsPatch::default());
        c.engine_mut().body_mut(handle).velocity = Vec2::new(0.0, -200.0);

        c.apply_intents(&HashMap::new(), 0);
        assert_eq!(c.engine().body(handle).mask, CollisionMask::WALLS_ONLY);

        c.engine_mut().body_mut(handle).velocity = Vec2::new(0.0, 10.0);
        c.apply_intents(&HashMap::new(), 0);
        assert_eq!(c.engine().body(handle).mask, CollisionMask::SOLID);
    }

    #[test]
    fn world_gravity_patch_reaches_engine() {
        let mut c = controller();
        assert_eq!(c.engine().gravity, 1000.0);

        c.update_world_config(&WorldPhysicsPatch {
            gravity: Some(400.0),
            drop_through_duration_ms: Some(250),
        });

        assert_eq!(c.engine().gravity, 400.0);
        assert_eq!(c.world_config().drop_through_duration_ms, 250);
    }

    #[test]
    fn player_patch_pushes_material_to_live_body() {
        let mut c = controller();
        let handle = c.create_player_body("a", 100.0, 100.0, 20.0, &PlayerPhysicsPatch::default());

        c.update_player_config(
            "a",
            &PlayerPhysicsPatch {
                friction: Some(0.5),
                move_speed: Some(100.0),
                ..Default::default()
            },
        )
        .unwrap();

        let material = c.engine().body(handle).material.unwrap();
        assert_eq!(material.friction, 0.5);
        assert_eq!(c.body("a").unwrap().config.move_speed, 100.0);

        c.apply_intents(&intents("a", PlayerIntent { left: true, ..Default::default() }), 0);
        assert_eq!(c.engine().body(handle).velocity.x, -100.0);
    }

    #[test]
    fn corner_radius_cannot_change_after_creation() {
        let mut c = controller();
        c.create_player_body("a", 100.0, 100.0, 20.0, &PlayerPhysicsPatch::default());

        let result = c.update_player_config(
            "a",
            &PlayerPhysicsPatch {
                chamfer_radius: Some(2.0),
                move_speed: Some(1.0),
                ..Default::default()
            },
        );

        assert!(matches!(
            result,
            Err(PhysicsConfigError::CornerRadiusImmutable { .. })
        ));
        assert_eq!(c.body("a").unwrap().config.move_speed, 300.0);

        // Re-stating the current radius is fine
        c.update_player_config(
            "a",
            &PlayerPhysicsPatch {
                chamfer_radius: Some(5.0),
                ..Default::default()
            },
        )
        .unwrap();
    }

    #[test]
    fn patch_for_unknown_player_is_ignored() {
        let mut c = controller();
        c.update_player_config(
            "ghost",
            &PlayerPhysicsPatch {
                chamfer_radius: Some(1.0),
                ..Default::default()
            },
        )
        .unwrap();
    }

    #[test]
    fn removing_a_body_detaches_it_from_the_engine() {
        let mut c = controller();
        let handle = c.create_player_body("a", 100.0, 100.0, 20.0, &PlayerPhysicsPatch::default());

        assert!(c.remove_player_body("a"));
        assert!(!c.remove_player_body("a"));
        assert!(c.position("a").is_none());
        assert!(!c.engine().bodies.contains_key(&handle));
    }
}
