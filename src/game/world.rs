//! World task and authoritative tick loop

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::util::time::{unix_millis, Timer, SIMULATION_TPS, TICK_DURATION};

use super::intent::PlayerIntent;
use super::motion::PhysicsConfigError;
use super::physics::{PhysicsEngine, PlayerPhysicsPatch, WorldPhysicsPatch};
use super::simulation::Simulation;
use super::snapshot::{Snapshot, SnapshotStats, TickFrame};

const COMMAND_BUFFER: usize = 1024;
const FRAME_BUFFER: usize = 64;
/// Ticks between stats log lines
const STATS_LOG_INTERVAL: u64 = SIMULATION_TPS as u64 * 10;

/// Requests into the world task
#[derive(Debug)]
pub enum WorldCommand {
    Connect {
        player_id: String,
        reply: oneshot::Sender<Snapshot>,
    },
    Disconnect {
        player_id: String,
    },
    Intent {
        player_id: String,
        intent: PlayerIntent,
        seq: f64,
        sent_at: f64,
    },
    PatchWorld {
        patch: WorldPhysicsPatch,
    },
    PatchPlayer {
        player_id: String,
        patch: PlayerPhysicsPatch,
        reply: oneshot::Sender<Result<(), PhysicsConfigError>>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error("World task is not running")]
    Closed,

    #[error(transparent)]
    Config(#[from] PhysicsConfigError),
}

/// Handle to the running world
#[derive(Clone)]
pub struct WorldHandle {
    cmd_tx: mpsc::Sender<WorldCommand>,
    frame_tx: broadcast::Sender<Arc<TickFrame>>,
    player_count: Arc<AtomicUsize>,
}

impl WorldHandle {
    /// Receive every frame from now on. Subscribe before connecting so the
    /// first SYNC after WELCOME is not missed.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<TickFrame>> {
        self.frame_tx.subscribe()
    }

    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    /// Add a player; resolves with the WELCOME snapshot
    pub async fn connect(&self, player_id: &str) -> Result<Snapshot, WorldError> {
        let (reply, rx) = oneshot::channel();
        self.send(WorldCommand::Connect {
            player_id: player_id.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| WorldError::Closed)
    }

    pub async fn disconnect(&self, player_id: &str) -> Result<(), WorldError> {
        self.send(WorldCommand::Disconnect {
            player_id: player_id.to_string(),
        })
        .await
    }

    pub async fn submit_intent(
        &self,
        player_id: &str,
        intent: PlayerIntent,
        seq: f64,
        sent_at: f64,
    ) -> Result<(), WorldError> {
        self.send(WorldCommand::Intent {
            player_id: player_id.to_string(),
            intent,
            seq,
            sent_at,
        })
        .await
    }

    pub async fn patch_world(&self, patch: WorldPhysicsPatch) -> Result<(), WorldError> {
        self.send(WorldCommand::PatchWorld { patch }).await
    }

    pub async fn patch_player(
        &self,
        player_id: &str,
        patch: PlayerPhysicsPatch,
    ) -> Result<(), WorldError> {
        let (reply, rx) = oneshot::channel();
        self.send(WorldCommand::PatchPlayer {
            player_id: player_id.to_string(),
            patch,
            reply,
        })
        .await?;
        rx.await.map_err(|_| WorldError::Closed)??;
        Ok(())
    }

    async fn send(&self, cmd: WorldCommand) -> Result<(), WorldError> {
        self.cmd_tx.send(cmd).await.map_err(|_| WorldError::Closed)
    }
}

/// The world task. Owns the simulation; nothing else touches it.
pub struct GameWorld<E> {
    sim: Simulation<E>,
    cmd_rx: mpsc::Receiver<WorldCommand>,
    frame_tx: broadcast::Sender<Arc<TickFrame>>,
    player_count: Arc<AtomicUsize>,
    stats: SnapshotStats,
    last_broadcast_ms: f64,
}

impl<E: PhysicsEngine> GameWorld<E> {
    pub fn new(sim: Simulation<E>) -> (Self, WorldHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let (frame_tx, _) = broadcast::channel(FRAME_BUFFER);
        let player_count = Arc::new(AtomicUsize::new(0));

        let handle = WorldHandle {
            cmd_tx,
            frame_tx: frame_tx.clone(),
            player_count: player_count.clone(),
        };

        let world = Self {
            sim,
            cmd_rx,
            frame_tx,
            player_count,
            stats: SnapshotStats::default(),
            last_broadcast_ms: 0.0,
        };

        (world, handle)
    }

    /// Run the tick loop until every handle is dropped. Late ticks are
    /// skipped, never replayed.
    pub async fn run(mut self) {
        info!(tps = SIMULATION_TPS, "World started");

        let mut tick_interval = interval(TICK_DURATION);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tick_interval.tick().await;

            // Drain command queue
            if !self.process_commands() {
                break;
            }

            self.run_tick();
        }

        info!(tick = self.sim.current_tick(), "World stopped");
    }

    /// Apply all pending commands. Returns false once every sender is gone.
    fn process_commands(&mut self) -> bool {
        loop {
            match self.cmd_rx.try_recv() {
                Ok(cmd) => self.handle_command(cmd),
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn handle_command(&mut self, cmd: WorldCommand) {
        match cmd {
            WorldCommand::Connect { player_id, reply } => {
                let snapshot = self.sim.add_player(&player_id);
                self.sync_player_count();
                if reply.send(snapshot).is_err() {
                    // Caller went away before the reply: treat as a disconnect
                    self.sim.request_removal(&player_id);
                }
            }
            WorldCommand::Disconnect { player_id } => {
                self.sim.request_removal(&player_id);
            }
            WorldCommand::Intent {
                player_id,
                intent,
                seq,
                sent_at,
            } => {
                self.sim.submit_intent(&player_id, intent, seq, sent_at);
            }
            WorldCommand::PatchWorld { patch } => {
                self.sim.update_world_config(&patch);
            }
            WorldCommand::PatchPlayer {
                player_id,
                patch,
                reply,
            } => {
                let result = self.sim.update_player_config(&player_id, &patch);
                if let Err(e) = &result {
                    warn!(player_id = %player_id, error = %e, "Player physics patch rejected");
                }
                let _ = reply.send(result);
            }
        }
    }

    fn run_tick(&mut self) {
        let report = self.sim.tick(unix_millis());
        if !report.removed.is_empty() {
            self.sync_player_count();
        }

        self.stats
            .record(report.snapshot.dots.len(), report.physics_duration_ms);

        let frame = Arc::new(TickFrame {
            tick: report.tick,
            snapshot: report.snapshot,
            diagnostics: self.sim.diagnostics().clone(),
            physics_duration_ms: report.physics_duration_ms,
            broadcast_duration_ms: self.last_broadcast_ms,
        });

        let timer = Timer::new();
        // No receivers is fine: nobody is connected
        let _ = self.frame_tx.send(frame);
        self.last_broadcast_ms = timer.elapsed_ms();

        if report.tick % STATS_LOG_INTERVAL == 0 && !self.sim.registry().is_empty() {
            debug!(
                tick = report.tick,
                frames = self.stats.total_frames,
                avg_dots = self.stats.avg_dots_per_frame,
                max_physics_ms = self.stats.max_physics_ms,
                "World stats"
            );
        }
    }

    fn sync_player_count(&self) {
        self.player_count
            .store(self.sim.registry().len(), Ordering::Relaxed);
    }
}
