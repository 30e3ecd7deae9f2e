//! rapier2d-backed implementation of [`PhysicsEngine`]

use std::collections::HashMap;

use rapier2d::prelude::*;

use super::physics::{
    BodyCategory, BodyHandle, BodyMaterial, CollisionMask, ContactEvent, ContactPhase,
    ContactSide, PhysicsEngine, PlayerBodyDesc, StaticBodyDesc, Vec2,
};

/// Rough size of a "metre" in world pixels, used by rapier to scale its
/// internal tolerances
const PIXELS_PER_METER: Real = 50.0;

#[derive(Debug, Clone, Copy)]
struct RapierBody {
    body: RigidBodyHandle,
    collider: ColliderHandle,
}

/// Owns every rapier set plus the mapping between our opaque handles and
/// rapier's body/collider handles
pub struct RapierEngine {
    gravity: Vector<Real>,
    integration_parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    handles: HashMap<BodyHandle, RapierBody>,
    collider_owners: HashMap<ColliderHandle, BodyHandle>,
    next_handle: u64,
}

impl RapierEngine {
    pub fn new(gravity: f32) -> Self {
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.length_unit = PIXELS_PER_METER;

        Self {
            gravity: vector![0.0, gravity],
            integration_parameters,
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            handles: HashMap::new(),
            collider_owners: HashMap::new(),
            next_handle: 0,
        }
    }

    /// Number of live bodies, static ones included
    #[cfg(test)]
    pub fn body_count(&self) -> usize {
        self.handles.len()
    }

    fn register(&mut self, body: RigidBodyHandle, collider: ColliderHandle) -> BodyHandle {
        self.next_handle += 1;
        let handle = BodyHandle(self.next_handle);
        self.handles.insert(handle, RapierBody { body, collider });
        self.collider_owners.insert(collider, handle);
        handle
    }

    fn contact_side(&self, collider: ColliderHandle) -> Option<ContactSide> {
        let handle = *self.collider_owners.get(&collider)?;
        let translation = self.colliders.get(collider)?.translation();
        Some(ContactSide {
            handle,
            position: Vec2::new(translation.x, translation.y),
        })
    }
}

/// Groups for a player body: member of PLAYER, interacting with `mask`
fn player_groups(mask: CollisionMask) -> InteractionGroups {
    InteractionGroups::new(
        Group::from_bits_truncate(BodyCategory::Player.bits()),
        Group::from_bits_truncate(mask.bits()),
    )
}

fn apply_inertia(rb: &mut RigidBody, inertia: f32) {
    if inertia.is_finite() {
        rb.lock_rotations(false, true);
        rb.set_additional_mass_properties(
            MassProperties::new(point![0.0, 0.0], 0.0, inertia.max(0.0)),
            true,
        );
    } else {
        rb.lock_rotations(true, true);
    }
}

impl PhysicsEngine for RapierEngine {
    fn set_gravity(&mut self, gravity: f32) {
        self.gravity = vector![0.0, gravity];
    }

    fn add_player_body(&mut self, desc: &PlayerBodyDesc) -> BodyHandle {
        let mut rb = RigidBodyBuilder::dynamic()
            .translation(vector![desc.position.x, desc.position.y])
            .linear_damping(desc.material.friction_air)
            .can_sleep(false)
            .ccd_enabled(true)
            .build();
        apply_inertia(&mut rb, desc.material.inertia);
        let body = self.bodies.insert(rb);

        // Rounded corners grow the cuboid outward, so shrink the core to keep
        // the outer extent at `size`.
        let half = desc.size / 2.0;
        let border = desc.corner_radius.clamp(0.0, half * 0.9);
        let collider = ColliderBuilder::round_cuboid(half - border, half - border, border)
            .friction(desc.material.friction)
            .restitution(desc.material.restitution)
            .collision_groups(player_groups(desc.mask))
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .build();
        let collider = self
            .colliders
            .insert_with_parent(collider, body, &mut self.bodies);

        self.register(body, collider)
    }

    fn add_static_body(&mut self, desc: &StaticBodyDesc) -> BodyHandle {
        let rb = RigidBodyBuilder::fixed()
            .translation(vector![desc.position.x, desc.position.y])
            .build();
        let body = self.bodies.insert(rb);

        let collider = ColliderBuilder::cuboid(desc.width / 2.0, desc.height / 2.0)
            .collision_groups(InteractionGroups::new(
                Group::from_bits_truncate(desc.category.bits()),
                Group::ALL,
            ))
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .build();
        let collider = self
            .colliders
            .insert_with_parent(collider, body, &mut self.bodies);

        self.register(body, collider)
    }

    fn remove_body(&mut self, handle: BodyHandle) {
        let Some(entry) = self.handles.remove(&handle) else {
            return;
        };
        self.collider_owners.remove(&entry.collider);
        self.bodies.remove(
            entry.body,
            &mut self.island_manager,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
    }

    fn position(&self, handle: BodyHandle) -> Option<Vec2> {
        let entry = self.handles.get(&handle)?;
        let translation = self.bodies.get(entry.body)?.translation();
        Some(Vec2::new(translation.x, translation.y))
    }

    fn velocity(&self, handle: BodyHandle) -> Option<Vec2> {
        let entry = self.handles.get(&handle)?;
        let linvel = self.bodies.get(entry.body)?.linvel();
        Some(Vec2::new(linvel.x, linvel.y))
    }

    fn set_velocity(&mut self, handle: BodyHandle, velocity: Vec2) {
        let Some(entry) = self.handles.get(&handle) else {
            return;
        };
        if let Some(rb) = self.bodies.get_mut(entry.body) {
            rb.set_linvel(vector![velocity.x, velocity.y], true);
        }
    }

    fn set_collision_mask(&mut self, handle: BodyHandle, mask: CollisionMask) {
        let Some(entry) = self.handles.get(&handle) else {
            return;
        };
        if let Some(collider) = self.colliders.get_mut(entry.collider) {
            collider.set_collision_groups(player_groups(mask));
        }
    }

    fn set_material(&mut self, handle: BodyHandle, material: &BodyMaterial) {
        let Some(entry) = self.handles.get(&handle).copied() else {
            return;
        };
        if let Some(collider) = self.colliders.get_mut(entry.collider) {
            collider.set_friction(material.friction);
            collider.set_restitution(material.restitution);
        }
        if let Some(rb) = self.bodies.get_mut(entry.body) {
            rb.set_linear_damping(material.friction_air);
            apply_inertia(rb, material.inertia);
        }
    }

    fn step(&mut self, dt: f32, on_contact: &mut dyn FnMut(&ContactEvent)) {
        self.integration_parameters.dt = dt;

        let (collision_send, collision_recv) =
            rapier2d::crossbeam::channel::unbounded::<CollisionEvent>();
        let (force_send, _force_recv) =
            rapier2d::crossbeam::channel::unbounded::<ContactForceEvent>();
        let event_handler = ChannelEventCollector::new(collision_send, force_send);

        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            None,
            &(),
            &event_handler,
        );

        while let Ok(event) = collision_recv.try_recv() {
            let (h1, h2, phase) = match event {
                CollisionEvent::Started(h1, h2, _) => (h1, h2, ContactPhase::Began),
                CollisionEvent::Stopped(h1, h2, _) => (h1, h2, ContactPhase::Ended),
            };
            // Colliders removed during this step have no owner any more
            if let (Some(a), Some(b)) = (self.contact_side(h1), self.contact_side(h2)) {
                on_contact(&ContactEvent { phase, a, b });
            }
        }
    }
}
