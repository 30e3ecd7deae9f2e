//! Entity registry: the set of live dots, their colors, and deferred removal

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::intent::IntentAggregator;
use super::map::GameMap;
use super::motion::MotionController;
use super::physics::{PhysicsEngine, PlayerPhysicsPatch};
use super::snapshot::Snapshot;

/// Colors handed out to players, in allocation order
pub const PALETTE: [&str; 8] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#FFA07A", "#98D8C8", "#F7DC6F", "#BB8FCE", "#85C1E2",
];

/// Decimal places kept in snapshot coordinates
const POSITION_DECIMALS: i32 = 2;

/// A player's avatar as clients see it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dot {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub color: String,
}

#[derive(Debug, Clone, Copy)]
pub struct RegistrySettings {
    /// Side length of every player body
    pub entity_size: f32,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self { entity_size: 20.0 }
    }
}

pub struct EntityRegistry {
    dots: BTreeMap<String, Dot>,
    pending_removals: BTreeSet<String>,
    color_usage: HashMap<&'static str, usize>,
    map: Arc<GameMap>,
    settings: RegistrySettings,
    rng: ChaCha8Rng,
}

impl EntityRegistry {
    pub fn new(map: GameMap, settings: RegistrySettings, seed: u64) -> Self {
        Self {
            dots: BTreeMap::new(),
            pending_removals: BTreeSet::new(),
            color_usage: HashMap::new(),
            map: Arc::new(map),
            settings,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn map(&self) -> &Arc<GameMap> {
        &self.map
    }

    /// Whether `id` exists and is not scheduled for removal
    pub fn is_active(&self, id: &str) -> bool {
        self.dots.contains_key(id) && !self.pending_removals.contains(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.dots.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.dots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dots.is_empty()
    }

    #[cfg(test)]
    pub fn dot(&self, id: &str) -> Option<&Dot> {
        self.dots.get(id)
    }

    /// Spawn a dot at a random point inside the world and create its body
    pub fn add_entity<E: PhysicsEngine>(
        &mut self,
        id: &str,
        motion: &mut MotionController<E>,
    ) -> Dot {
        if let Some(existing) = self.dots.get(id) {
            warn!(player_id = %id, "Entity already exists");
            return existing.clone();
        }

        let size = self.settings.entity_size;
        let half = size / 2.0;
        let x = self.rng.gen_range(half..=(self.map.width() - half));
        let y = self.rng.gen_range(half..=(self.map.height() - half));
        let color = self.allocate_color();

        motion.create_player_body(id, x, y, size, &PlayerPhysicsPatch::default());

        let dot = Dot {
            id: id.to_string(),
            x,
            y,
            color: color.to_string(),
        };
        self.dots.insert(id.to_string(), dot.clone());

        info!(player_id = %id, color, x, y, "Entity added");
        dot
    }

    /// Schedule removal at the next flush. Unknown ids are a no-op.
    pub fn request_removal(&mut self, id: &str) -> bool {
        if !self.dots.contains_key(id) {
            return false;
        }
        debug!(player_id = %id, "Removal requested");
        self.pending_removals.insert(id.to_string())
    }

    /// Remove every entity whose removal was requested, together with its
    /// color, pending intent, diagnostic and physics body
    pub fn flush_removals<E: PhysicsEngine>(
        &mut self,
        motion: &mut MotionController<E>,
        intents: &mut IntentAggregator,
    ) -> Vec<String> {
        let removed: Vec<String> = std::mem::take(&mut self.pending_removals)
            .into_iter()
            .collect();

        for id in &removed {
            if let Some(dot) = self.dots.remove(id) {
                self.release_color(&dot.color);
            }
            intents.forget(id);
            motion.remove_player_body(id);
            info!(player_id = %id, "Entity removed");
        }

        removed
    }

    /// Refresh every dot from its body position and return a value copy of
    /// the world
    pub fn snapshot<E: PhysicsEngine>(&mut self, motion: &MotionController<E>) -> Snapshot {
        for dot in self.dots.values_mut() {
            if let Some(position) = motion.position(&dot.id) {
                dot.x = round_coord(position.x);
                dot.y = round_coord(position.y);
            }
        }

        Snapshot {
            dots: self.dots.values().cloned().collect(),
            map: Arc::clone(&self.map),
        }
    }

    /// First unused palette color; once all are taken, any palette color
    fn allocate_color(&mut self) -> &'static str {
        let color = PALETTE
            .iter()
            .copied()
            .find(|c| self.color_usage.get(c).copied().unwrap_or(0) == 0)
            .unwrap_or_else(|| PALETTE[self.rng.gen_range(0..PALETTE.len())]);

        *self.color_usage.entry(color).or_insert(0) += 1;
        color
    }

    fn release_color(&mut self, color: &str) {
        if let Some(count) = self.color_usage.get_mut(color) {
            *count = count.saturating_sub(1);
        }
    }
}

fn round_coord(value: f32) -> f32 {
    let factor = 10f32.powi(POSITION_DECIMALS);
    (value * factor).round() / factor
}
