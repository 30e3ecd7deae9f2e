//! WebSocket upgrade handler

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::Response,
};
use chrono::Utc;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::{AppState, ConnectionInfo};
use crate::game::snapshot::TickFrame;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{decode_client_msg, ClientMsg, PongPayload, ProtocolError, ServerMsg};

/// Replies addressed to one connection (PONG)
const DIRECT_BUFFER: usize = 32;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, remote_addr, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, remote_addr: SocketAddr, state: AppState) {
    let player_id = Uuid::new_v4().to_string();
    info!(player_id = %player_id, remote = %remote_addr, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    // Subscribe before joining so no frame containing the new dot is missed
    let frame_rx = state.world.subscribe();

    let welcome = match state.world.connect(&player_id).await {
        Ok(snapshot) => snapshot.welcome(&player_id),
        Err(e) => {
            error!(player_id = %player_id, error = %e, "Failed to join world");
            return;
        }
    };

    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(player_id = %player_id, error = %e, "Failed to send welcome");
        let _ = state.world.disconnect(&player_id).await;
        return;
    }

    state.connections.insert(
        player_id.clone(),
        ConnectionInfo {
            remote_addr,
            connected_at: Utc::now(),
        },
    );

    run_session(&player_id, &state, ws_sink, ws_stream, frame_rx).await;

    // Cleanup on disconnect; the dot goes away at the end of the next tick
    let session = state.connections.remove(&player_id);
    if state.world.disconnect(&player_id).await.is_err() {
        debug!(player_id = %player_id, "World already stopped");
    }

    let connected_secs = session
        .map(|(_, info)| (Utc::now() - info.connected_at).num_seconds())
        .unwrap_or(0);
    info!(player_id = %player_id, connected_secs, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    player_id: &str,
    state: &AppState,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    mut frame_rx: broadcast::Receiver<std::sync::Arc<TickFrame>>,
) {
    let rate_limiter = ConnectionRateLimiter::new();
    let (direct_tx, mut direct_rx) = mpsc::channel::<ServerMsg>(DIRECT_BUFFER);

    // Spawn writer task: direct replies and tick frames -> WebSocket
    let writer_id = player_id.to_string();
    let writer_handle = tokio::spawn(async move {
        // Frames from before the join are stale
        let mut joined = false;

        loop {
            let msg = tokio::select! {
                direct = direct_rx.recv() => match direct {
                    Some(msg) => msg,
                    None => break,
                },
                frame = frame_rx.recv() => match frame {
                    Ok(frame) => {
                        if !joined {
                            if !frame.snapshot.contains(&writer_id) {
                                continue;
                            }
                            joined = true;
                        }
                        frame.sync_for(&writer_id)
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(
                            player_id = %writer_id,
                            lagged_count = n,
                            "Client lagged, skipping {} frames", n
                        );
                        // Continue - don't disconnect for lag
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(player_id = %writer_id, "Frame channel closed");
                        break;
                    }
                },
            };

            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(player_id = %writer_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> world task
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_inbound() {
                    warn!(player_id = %player_id, "Rate limited inbound message");
                    continue;
                }

                match decode_client_msg(&text) {
                    Ok(ClientMsg::Intent(payload)) => {
                        if payload.id != player_id {
                            warn!(
                                player_id = %player_id,
                                claimed_id = %payload.id,
                                "Intent for another player dropped"
                            );
                            continue;
                        }

                        debug!(player_id = %player_id, seq = payload.seq, "Intent received");
                        let sent = state
                            .world
                            .submit_intent(player_id, payload.intent(), payload.seq, payload.sent_at)
                            .await;
                        if sent.is_err() {
                            debug!(player_id = %player_id, "World channel closed");
                            break;
                        }
                    }
                    Ok(ClientMsg::Ping(ping)) => {
                        let pong = ServerMsg::Pong(PongPayload {
                            client_time: ping.client_time,
                            server_time: unix_millis(),
                        });
                        if direct_tx.send(pong).await.is_err() {
                            break;
                        }
                    }
                    Err(ProtocolError::UnknownType(kind)) => {
                        warn!(player_id = %player_id, kind = %kind, "Unknown message type");
                    }
                    Err(e) => {
                        warn!(player_id = %player_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(player_id = %player_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(player_id = %player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                warn!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
