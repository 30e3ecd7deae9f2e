//! Intent aggregation between ticks

use std::collections::HashMap;

use serde::Serialize;

use super::registry::EntityRegistry;

/// A player's desired input for the upcoming tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerIntent {
    pub left: bool,
    pub right: bool,
    pub down: bool,
    pub jump: bool,
}

impl PlayerIntent {
    /// Fold a newer message into this pending intent: direction is
    /// last-write-wins, `down` and `jump` latch until the tick consumes them.
    pub fn merge(&mut self, newer: PlayerIntent) {
        self.left = newer.left;
        self.right = newer.right;
        self.down |= newer.down;
        self.jump |= newer.jump;
    }
}

/// Last intent sequence number and client send time seen for a player.
/// Only used for latency reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct IntentDiagnostic {
    pub seq: f64,
    pub sent_at: f64,
}

#[derive(Debug, Default)]
pub struct IntentAggregator {
    pending: HashMap<String, PlayerIntent>,
    diagnostics: HashMap<String, IntentDiagnostic>,
}

impl IntentAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge an inbound intent into the pending one for `player_id`.
    ///
    /// Dropped when the player is not active (never joined, or removal
    /// already requested). The diagnostic is overwritten unconditionally, so a
    /// reordered older message replaces a newer one.
    pub fn submit(
        &mut self,
        registry: &EntityRegistry,
        player_id: &str,
        intent: PlayerIntent,
        seq: f64,
        sent_at: f64,
    ) -> bool {
        if !registry.is_active(player_id) {
            return false;
        }

        self.pending
            .entry(player_id.to_string())
            .and_modify(|pending| pending.merge(intent))
            .or_insert(intent);
        self.diagnostics
            .insert(player_id.to_string(), IntentDiagnostic { seq, sent_at });
        true
    }

    /// Take every pending intent, leaving the map empty
    pub fn consume_all(&mut self) -> HashMap<String, PlayerIntent> {
        std::mem::take(&mut self.pending)
    }

    pub fn diagnostic(&self, player_id: &str) -> Option<IntentDiagnostic> {
        self.diagnostics.get(player_id).copied()
    }

    pub fn diagnostics(&self) -> &HashMap<String, IntentDiagnostic> {
        &self.diagnostics
    }

    /// Drop any pending intent and diagnostic for a removed player
    pub fn forget(&mut self, player_id: &str) {
        self.pending.remove(player_id);
        self.diagnostics.remove(player_id);
    }

    #[cfg(test)]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::map::create_map;
    use crate::game::motion::MotionController;
    use crate::game::physics::scripted::ScriptedEngine;
    use crate::game::physics::WorldPhysicsConfig;
    use crate::game::registry::RegistrySettings;

    fn registry_with(ids: &[&str]) -> EntityRegistry {
        let mut motion = MotionController::new(ScriptedEngine::new(), WorldPhysicsConfig::default());
        let mut registry = EntityRegistry::new(create_map(), RegistrySettings::default(), 7);
        for id in ids {
            registry.add_entity(id, &mut motion);
        }
        registry
    }

    fn left() -> PlayerIntent {
        PlayerIntent { left: true, ..Default::default() }
    }

    fn right() -> PlayerIntent {
        PlayerIntent { right: true, ..Default::default() }
    }

    #[test]
    fn latest_direction_wins() {
        let registry = registry_with(&["a"]);
        let mut aggregator = IntentAggregator::new();

        aggregator.submit(&registry, "a", left(), 1.0, 10.0);
        aggregator.submit(&registry, "a", right(), 2.0, 20.0);

        let intents = aggregator.consume_all();
        assert_eq!(intents["a"], right());
    }

    #[test]
    fn jump_and_down_latch_until_consumed() {
        let registry = registry_with(&["a"]);
        let mut aggregator = IntentAggregator::new();

        aggregator.submit(&registry, "a", PlayerIntent { jump: true, down: true, ..Default::default() }, 1.0, 0.0);
        for seq in 2..6 {
            aggregator.submit(&registry, "a", PlayerIntent::default(), seq as f64, 0.0);
        }

        let intent = aggregator.consume_all()["a"];
        assert!(intent.jump);
        assert!(intent.down);
        assert!(!intent.left && !intent.right);
    }

    #[test]
    fn consume_clears_pending() {
        let registry = registry_with(&["a", "b"]);
        let mut aggregator = IntentAggregator::new();

        aggregator.submit(&registry, "a", PlayerIntent { jump: true, ..Default::default() }, 1.0, 0.0);
        aggregator.submit(&registry, "b", left(), 1.0, 0.0);
        assert_eq!(aggregator.consume_all().len(), 2);

        assert_eq!(aggregator.pending_len(), 0);
        assert!(aggregator.consume_all().is_empty());
    }

    #[test]
    fn unknown_player_is_dropped() {
        let registry = registry_with(&["a"]);
        let mut aggregator = IntentAggregator::new();

        assert!(!aggregator.submit(&registry, "nobody", left(), 1.0, 0.0));
        assert!(aggregator.consume_all().is_empty());
        assert!(aggregator.diagnostic("nobody").is_none());
    }

    #[test]
    fn player_pending_removal_is_dropped() {
        let mut registry = registry_with(&["a"]);
        registry.request_removal("a");
        let mut aggregator = IntentAggregator::new();

        assert!(!aggregator.submit(&registry, "a", left(), 1.0, 0.0));
        assert!(aggregator.consume_all().is_empty());
    }

    #[test]
    fn diagnostic_is_last_write_even_when_stale() {
        let registry = registry_with(&["a"]);
        let mut aggregator = IntentAggregator::new();

        aggregator.submit(&registry, "a", left(), 9.0, 900.0);
        aggregator.submit(&registry, "a", left(), 3.0, 300.0);

        assert_eq!(
            aggregator.diagnostic("a"),
            Some(IntentDiagnostic { seq: 3.0, sent_at: 300.0 })
        );
        // Diagnostics survive the tick
        aggregator.consume_all();
        assert!(aggregator.diagnostic("a").is_some());

        aggregator.forget("a");
        assert!(aggregator.diagnostic("a").is_none());
    }
}
