//! Snapshots and per-tick broadcast frames

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::ws::protocol::{ServerMsg, SyncPayload, WelcomePayload};

use super::intent::IntentDiagnostic;
use super::map::GameMap;
use super::registry::Dot;

/// Value copy of the world at one instant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub dots: Vec<Dot>,
    pub map: Arc<GameMap>,
}

impl Snapshot {
    /// Dots are ordered by id
    pub fn contains(&self, player_id: &str) -> bool {
        self.dots
            .binary_search_by(|d| d.id.as_str().cmp(player_id))
            .is_ok()
    }

    pub fn welcome(&self, player_id: &str) -> ServerMsg {
        ServerMsg::Welcome(WelcomePayload {
            id: player_id.to_string(),
            world_state: self.dots.clone(),
            map: Arc::clone(&self.map),
        })
    }
}

/// Everything one tick hands to the transport. Shared by every connection;
/// each one renders its own SYNC with its player's diagnostic.
#[derive(Debug, Clone)]
pub struct TickFrame {
    pub tick: u64,
    pub snapshot: Snapshot,
    pub diagnostics: HashMap<String, IntentDiagnostic>,
    /// Time spent stepping physics this tick
    pub physics_duration_ms: f64,
    /// Time the previous broadcast took to hand off
    pub broadcast_duration_ms: f64,
}

impl TickFrame {
    /// The SYNC message for one recipient
    pub fn sync_for(&self, player_id: &str) -> ServerMsg {
        let diagnostic = self.diagnostics.get(player_id);
        ServerMsg::Sync(SyncPayload {
            world_state: self.snapshot.dots.clone(),
            map: Arc::clone(&self.snapshot.map),
            last_intent_seq: diagnostic.map(|d| d.seq),
            last_intent_sent_at: diagnostic.map(|d| d.sent_at),
            physics_duration_ms: self.physics_duration_ms,
            broadcast_duration_ms: self.broadcast_duration_ms,
        })
    }
}

/// Running broadcast statistics for periodic debug logs
#[derive(Debug, Default)]
pub struct SnapshotStats {
    pub total_frames: u64,
    pub avg_dots_per_frame: f32,
    pub max_physics_ms: f64,
}

impl SnapshotStats {
    pub fn record(&mut self, dot_count: usize, physics_ms: f64) {
        self.total_frames += 1;

        // Running average
        let n = self.total_frames as f32;
        self.avg_dots_per_frame =
            self.avg_dots_per_frame * ((n - 1.0) / n) + (dot_count as f32 / n);
        self.max_physics_ms = self.max_physics_ms.max(physics_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::map::create_map;

    fn frame() -> TickFrame {
        TickFrame {
            tick: 3,
            snapshot: Snapshot {
                dots: vec![Dot {
                    id: "a".into(),
                    x: 1.5,
                    y: 2.0,
                    color: "#FF6B6B".into(),
                }],
                map: Arc::new(create_map()),
            },
            diagnostics: HashMap::from([(
                "a".to_string(),
                IntentDiagnostic { seq: 12.0, sent_at: 99.5 },
            )]),
            physics_duration_ms: 0.25,
            broadcast_duration_ms: 0.5,
        }
    }

    #[test]
    fn sync_carries_recipient_diagnostic() {
        let json = serde_json::to_value(frame().sync_for("a")).unwrap();
        assert_eq!(json["type"], "SYNC");
        assert_eq!(json["payload"]["lastIntentSeq"], 12.0);
        assert_eq!(json["payload"]["lastIntentSentAt"], 99.5);
        assert_eq!(json["payload"]["physicsDurationMs"], 0.25);
        assert_eq!(json["payload"]["worldState"][0]["id"], "a");
    }

    #[test]
    fn sync_without_diagnostic_sends_nulls() {
        let json = serde_json::to_value(frame().sync_for("b")).unwrap();
        assert!(json["payload"]["lastIntentSeq"].is_null());
        assert!(json["payload"]["lastIntentSentAt"].is_null());
    }

    #[test]
    fn welcome_names_the_recipient() {
        let json = serde_json::to_value(frame().snapshot.welcome("a")).unwrap();
        assert_eq!(json["type"], "WELCOME");
        assert_eq!(json["payload"]["id"], "a");
        assert_eq!(json["payload"]["worldState"].as_array().unwrap().len(), 1);
        assert_eq!(json["payload"]["map"]["walls"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn contains_finds_dot_by_id() {
        let snapshot = frame().snapshot;
        assert!(snapshot.contains("a"));
        assert!(!snapshot.contains("b"));
    }

    #[test]
    fn stats_track_running_average() {
        let mut stats = SnapshotStats::default();
        stats.record(2, 1.0);
        stats.record(4, 3.0);
        assert_eq!(stats.total_frames, 2);
        assert!((stats.avg_dots_per_frame - 3.0).abs() < 1e-5);
        assert_eq!(stats.max_physics_ms, 3.0);
    }
}
