//! One authoritative world: intents, motion, registry, and the per-tick pipeline
//!
//! Everything here is synchronous and clock-free; the caller passes the
//! current time into [`Simulation::tick`].

use std::collections::HashMap;

use super::intent::{IntentAggregator, IntentDiagnostic, PlayerIntent};
use super::map::GameMap;
use super::motion::{MotionController, PhysicsConfigError};
use super::physics::{PhysicsEngine, PlayerPhysicsPatch, WorldPhysicsConfig, WorldPhysicsPatch};
use super::registry::{EntityRegistry, RegistrySettings};
use super::snapshot::Snapshot;
use crate::util::time::{tick_delta, Timer};

#[derive(Debug, Clone, Copy, Default)]
pub struct SimulationSettings {
    pub registry: RegistrySettings,
    pub world_physics: WorldPhysicsConfig,
    /// Seed for spawn positions and color fallback
    pub seed: u64,
}

/// Result of one tick
#[derive(Debug, Clone)]
pub struct TickReport {
    pub tick: u64,
    pub snapshot: Snapshot,
    pub physics_duration_ms: f64,
    /// Players whose removal was applied this tick
    pub removed: Vec<String>,
}

pub struct Simulation<E> {
    intents: IntentAggregator,
    registry: EntityRegistry,
    motion: MotionController<E>,
    tick: u64,
}

impl<E: PhysicsEngine> Simulation<E> {
    /// Build the world and its static geometry. Must happen before any player joins.
    pub fn new(engine: E, map: GameMap, settings: SimulationSettings) -> Self {
        let mut motion = MotionController::new(engine, settings.world_physics);
        for desc in map.static_bodies() {
            motion.create_static_body(&desc);
        }

        Self {
            intents: IntentAggregator::new(),
            registry: EntityRegistry::new(map, settings.registry, settings.seed),
            motion,
            tick: 0,
        }
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    #[cfg(test)]
    pub fn motion(&self) -> &MotionController<E> {
        &self.motion
    }

    #[cfg(test)]
    pub fn motion_mut(&mut self) -> &mut MotionController<E> {
        &mut self.motion
    }

    /// Add a player and return the world as they should first see it
    pub fn add_player(&mut self, player_id: &str) -> Snapshot {
        self.registry.add_entity(player_id, &mut self.motion);
        self.registry.snapshot(&self.motion)
    }

    /// Schedule a player's removal for the end of the next tick
    pub fn request_removal(&mut self, player_id: &str) -> bool {
        self.registry.request_removal(player_id)
    }

    pub fn submit_intent(
        &mut self,
        player_id: &str,
        intent: PlayerIntent,
        seq: f64,
        sent_at: f64,
    ) -> bool {
        self.intents
            .submit(&self.registry, player_id, intent, seq, sent_at)
    }

    pub fn diagnostics(&self) -> &HashMap<String, IntentDiagnostic> {
        self.intents.diagnostics()
    }

    pub fn update_world_config(&mut self, patch: &WorldPhysicsPatch) {
        self.motion.update_world_config(patch);
    }

    pub fn update_player_config(
        &mut self,
        player_id: &str,
        patch: &PlayerPhysicsPatch,
    ) -> Result<(), PhysicsConfigError> {
        self.motion.update_player_config(player_id, patch)
    }

    pub fn snapshot(&mut self) -> Snapshot {
        self.registry.snapshot(&self.motion)
    }

    /// Run one tick: apply intents, step physics by the fixed delta, flush
    /// removals, snapshot. `now` is unix millis.
    pub fn tick(&mut self, now: u64) -> TickReport {
        let intents = self.intents.consume_all();
        self.motion.apply_intents(&intents, now);

        let timer = Timer::new();
        self.motion.step(tick_delta());
        let physics_duration_ms = timer.elapsed_ms();

        let removed = self
            .registry
            .flush_removals(&mut self.motion, &mut self.intents);
        let snapshot = self.registry.snapshot(&self.motion);

        self.tick += 1;
        TickReport {
            tick: self.tick,
            snapshot,
            physics_duration_ms,
            removed,
        }
    }
}
