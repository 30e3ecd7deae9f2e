//! HTTP routers: game endpoint and physics config side channel

pub mod routes;

pub use routes::{build_config_router, build_game_router};
