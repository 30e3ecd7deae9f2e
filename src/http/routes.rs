//! HTTP route definitions

use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, patch},
    Router,
};
use serde::Serialize;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

use crate::app::AppState;
use crate::game::physics::{PlayerPhysicsPatch, WorldPhysicsPatch};
use crate::game::WorldError;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

const CONFIG_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
fn cors_layer(state: &AppState, methods: [Method; 3]) -> CorsLayer {
    let origins: Vec<HeaderValue> = state
        .config
        .client_origins
        .iter()
        .filter_map(|s| s.parse::<HeaderValue>().ok())
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(methods)
        .allow_headers([header::CONTENT_TYPE])
}

/// Game endpoint: WebSocket and health
pub fn build_game_router(state: AppState) -> Router {
    let cors = cors_layer(&state, [Method::GET, Method::HEAD, Method::OPTIONS]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Physics config side channel, served on its own listener
pub fn build_config_router(state: AppState) -> Router {
    let cors = cors_layer(&state, [Method::GET, Method::PATCH, Method::OPTIONS]);

    Router::new()
        .route("/world/physics", patch(patch_world_physics))
        .route("/players/:player_id/physics", patch(patch_player_physics))
        .layer(TimeoutLayer::new(CONFIG_REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_connections: usize,
    players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_connections: state.active_connections(),
        players: state.world.player_count(),
    })
}

// ============================================================================
// Physics config endpoints
// ============================================================================

#[derive(Serialize)]
struct OkResponse {
    ok: bool,
}

async fn patch_world_physics(
    State(state): State<AppState>,
    Json(patch): Json<WorldPhysicsPatch>,
) -> Result<Json<OkResponse>, AppError> {
    info!(?patch, "World physics patch");
    state.world.patch_world(patch).await?;
    Ok(Json(OkResponse { ok: true }))
}

async fn patch_player_physics(
    State(state): State<AppState>,
    Path(player_id): Path<String>,
    Json(patch): Json<PlayerPhysicsPatch>,
) -> Result<Json<OkResponse>, AppError> {
    info!(player_id = %player_id, ?patch, "Player physics patch");
    state.world.patch_player(&player_id, patch).await?;
    Ok(Json(OkResponse { ok: true }))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Unprocessable(String),

    #[error("Simulation unavailable")]
    Unavailable,
}

impl From<WorldError> for AppError {
    fn from(e: WorldError) -> Self {
        match e {
            WorldError::Config(e) => AppError::Unprocessable(e.to_string()),
            WorldError::Closed => AppError::Unavailable,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        };

        let body = serde_json::json!({
            "ok": false,
            "error": self.to_string()
        });

        (status, Json(body)).into_response()
    }
}
