//! WebSocket protocol message definitions
//! These are the wire types for client-server communication. Every message is
//! an envelope `{ "type": "...", "payload": { ... } }`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::game::map::GameMap;
use crate::game::registry::Dot;
use crate::game::PlayerIntent;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMsg {
    /// Input for the upcoming tick
    Intent(IntentPayload),

    /// Latency probe, answered immediately with PONG
    Ping(PingPayload),
}

/// Message types a client may send
const CLIENT_MSG_TYPES: [&str; 2] = ["INTENT", "PING"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentPayload {
    /// Player the intent is for; must match the sending connection
    pub id: String,
    #[serde(default)]
    pub left: bool,
    #[serde(default)]
    pub right: bool,
    #[serde(default)]
    pub down: bool,
    #[serde(default)]
    pub jump: bool,
    /// Client sequence number, echoed back for latency measurement
    #[serde(default)]
    pub seq: f64,
    /// Client send time in millis, possibly fractional; echoed back as sent
    #[serde(default)]
    pub sent_at: f64,
}

impl IntentPayload {
    pub fn intent(&self) -> PlayerIntent {
        PlayerIntent {
            left: self.left,
            right: self.right,
            down: self.down,
            jump: self.jump,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingPayload {
    pub client_time: f64,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMsg {
    /// Sent once, right after the connection is accepted
    Welcome(WelcomePayload),

    /// Full world state, every tick
    Sync(SyncPayload),

    /// Reply to PING
    Pong(PongPayload),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomePayload {
    pub id: String,
    pub world_state: Vec<Dot>,
    pub map: Arc<GameMap>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPayload {
    pub world_state: Vec<Dot>,
    pub map: Arc<GameMap>,
    /// Recipient's last intent sequence number, null before the first intent
    pub last_intent_seq: Option<f64>,
    pub last_intent_sent_at: Option<f64>,
    pub physics_duration_ms: f64,
    pub broadcast_duration_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PongPayload {
    pub client_time: f64,
    pub server_time: u64,
}

/// Inbound decode failures
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct EnvelopeHead {
    #[serde(rename = "type")]
    kind: String,
}

/// Decode an inbound text frame, telling unknown types apart from bad payloads
pub fn decode_client_msg(text: &str) -> Result<ClientMsg, ProtocolError> {
    match serde_json::from_str::<ClientMsg>(text) {
        Ok(msg) => Ok(msg),
        Err(e) => match serde_json::from_str::<EnvelopeHead>(text) {
            Ok(head) if !CLIENT_MSG_TYPES.contains(&head.kind.as_str()) => {
                Err(ProtocolError::UnknownType(head.kind))
            }
            _ => Err(ProtocolError::Malformed(e)),
        },
    }
}
