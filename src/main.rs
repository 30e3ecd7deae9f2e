//! Dots Server - authoritative real-time server for a shared 2D platformer
//!
//! This is the main entry point. It handles:
//! - The world task: a fixed 60 Hz tick loop owning the physics simulation
//! - WebSocket connections for real-time play, plus a health endpoint
//! - A separate HTTP listener for live physics tuning
//! - Optional synthetic bot players

mod app;
mod config;
mod game;
mod http;
mod util;
mod ws;

use std::net::SocketAddr;

use rand::Rng;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Config;
use crate::game::bots::spawn_bots;
use crate::game::map::create_map;
use crate::game::rapier::RapierEngine;
use crate::game::simulation::{Simulation, SimulationSettings};
use crate::game::GameWorld;
use crate::http::{build_config_router, build_game_router};
use crate::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize server time tracking
    init_server_time();

    info!("Starting Dots Server");

    // Build the world before anyone can join
    let seed = config
        .world_seed
        .unwrap_or_else(|| rand::thread_rng().gen());
    let settings = SimulationSettings {
        seed,
        ..Default::default()
    };
    let engine = RapierEngine::new(settings.world_physics.gravity);
    let sim = Simulation::new(engine, create_map(), settings);
    let (world, world_handle) = GameWorld::new(sim);
    let world_task = tokio::spawn(world.run());
    info!(seed, "World created");

    // Spawn bots
    let bot_count = config.bot_count();
    if bot_count > 0 {
        spawn_bots(world_handle.clone(), bot_count);
    }

    // Create application state
    let state = AppState::new(config.clone(), world_handle);

    // Build routers
    let game_router = build_game_router(state.clone());
    let config_router = build_config_router(state);

    // Start listeners
    let game_listener = TcpListener::bind(config.server_addr).await?;
    let config_listener = TcpListener::bind(config.config_addr).await?;

    info!("Server listening on {}", config.server_addr);
    info!("Health check: http://{}/health", config.server_addr);
    info!("WebSocket endpoint: ws://{}/ws", config.server_addr);
    info!("Physics config listening on {}", config.config_addr);

    let game_server = axum::serve(
        game_listener,
        game_router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());

    let config_server =
        axum::serve(config_listener, config_router).with_graceful_shutdown(shutdown_signal());

    tokio::try_join!(
        async { game_server.await },
        async { config_server.await }
    )?;

    // Listeners are down; stop ticking
    world_task.abort();

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
