//! Application state shared across routes

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::config::Config;
use crate::game::WorldHandle;

/// Bookkeeping for one live WebSocket
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub remote_addr: SocketAddr,
    pub connected_at: DateTime<Utc>,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub world: WorldHandle,
    /// Player id -> connection, WebSocket clients only
    pub connections: Arc<DashMap<String, ConnectionInfo>>,
}

impl AppState {
    pub fn new(config: Config, world: WorldHandle) -> Self {
        Self {
            config: Arc::new(config),
            world,
            connections: Arc::new(DashMap::new()),
        }
    }

    pub fn active_connections(&self) -> usize {
        self.connections.len()
    }
}
