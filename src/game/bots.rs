//! Synthetic players driven by random intents

use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{info, warn};

use super::intent::PlayerIntent;
use super::world::WorldHandle;

/// How often each bot sends an intent
pub const BOT_INTENT_INTERVAL: Duration = Duration::from_millis(100);

const JUMP_CHANCE: f64 = 0.1;
const DROP_CHANCE: f64 = 0.05;

/// A random intent: pick a horizontal direction (or none), occasionally jump or drop
pub fn random_intent(rng: &mut impl Rng) -> PlayerIntent {
    let direction = rng.gen_range(0..3);
    PlayerIntent {
        left: direction == 0,
        right: direction == 1,
        down: rng.gen_bool(DROP_CHANCE),
        jump: rng.gen_bool(JUMP_CHANCE),
    }
}

pub fn bot_ids(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("bot-{i}")).collect()
}

/// Connect `count` bots and drive them until the world stops
pub fn spawn_bots(world: WorldHandle, count: usize) -> JoinHandle<()> {
    tokio::spawn(async move {
        let ids = bot_ids(count);
        for id in &ids {
            if world.connect(id).await.is_err() {
                warn!(bot = %id, "World closed before bot could join");
                return;
            }
        }
        info!(count, "Bots connected");

        let mut rng = ChaCha8Rng::from_entropy();
        let mut ticker = interval(BOT_INTENT_INTERVAL);
        let mut seq = 0.0;

        loop {
            ticker.tick().await;
            seq += 1.0;

            for id in &ids {
                let intent = random_intent(&mut rng);
                if world.submit_intent(id, intent, seq, 0.0).await.is_err() {
                    info!("World closed, bots stopping");
                    return;
                }
            }
        }
    })
}
