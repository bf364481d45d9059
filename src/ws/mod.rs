pub mod admin;
pub mod handlers;
pub mod observer;
pub mod team;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::SplitSink, stream::StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::protocol::ClientEvent;
use crate::state::AppState;
use crate::types::Role;

const MAX_WS_MESSAGE_BYTES: usize = 32 * 1024;

/// Helper to serialize and send a message over WebSocket.
async fn send_json<T: Serialize>(
    sender: &mut SplitSink<WebSocket, Message>,
    msg: &T,
) -> Result<(), ()> {
    match serde_json::to_string(msg) {
        Ok(json) => sender
            .send(Message::Text(json.into()))
            .await
            .map_err(|_| ()),
        Err(e) => {
            tracing::error!("Failed to serialize message: {}", e);
            Ok(())
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub role: Option<String>,
}

fn parse_role(raw: Option<&str>) -> Role {
    match raw {
        Some("admin") => Role::Admin,
        Some("observer") => Role::Observer,
        _ => Role::Member,
    }
}

/// WebSocket upgrade handler. The admin role is gated by the Basic Auth
/// middleware in front of this route (see `auth`).
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let role = parse_role(params.role.as_deref());
    ws.on_upgrade(move |socket| handle_socket(socket, role, state))
}

/// Handle one WebSocket connection: register it, then pump its outbound
/// queue, the process-wide broadcast channel, and inbound frames until
/// it closes. The per-connection queue is FIFO, which is what preserves
/// the capability event ordering on the wire.
async fn handle_socket(socket: WebSocket, role: Role, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (conn_id, mut queue_rx) = state.register_connection(role).await;
    let mut broadcast_rx = state.broadcast.subscribe();

    tracing::info!(conn = %conn_id, ?role, "websocket connected");

    loop {
        tokio::select! {
            // events addressed to this connection (or its rooms)
            queued = queue_rx.recv() => {
                match queued {
                    Some(event) => {
                        if send_json(&mut sender, &event).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            // process-wide broadcasts (lobby list, palette, coin flag)
            broadcast_msg = broadcast_rx.recv() => {
                if let Ok(event) = broadcast_msg {
                    if send_json(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
            }

            // inbound frames
            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > MAX_WS_MESSAGE_BYTES {
                            tracing::warn!(conn = %conn_id, len = text.len(), "oversized frame dropped");
                            continue;
                        }
                        match serde_json::from_str::<ClientEvent>(&text) {
                            Ok(event) => {
                                if let Some(reply) =
                                    handlers::handle_event(event, &conn_id, role, &state).await
                                {
                                    // direct replies go through the queue so
                                    // their order against broadcasts holds
                                    state.send_to(&conn_id, reply).await;
                                }
                            }
                            Err(e) => {
                                // closed event set: unknown names are ignored
                                tracing::debug!(conn = %conn_id, error = %e, "unparseable event ignored");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!(conn = %conn_id, "websocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    state.disconnect(&conn_id).await;
    tracing::info!(conn = %conn_id, "websocket closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_role() {
        assert_eq!(parse_role(Some("admin")), Role::Admin);
        assert_eq!(parse_role(Some("observer")), Role::Observer);
        assert_eq!(parse_role(Some("member")), Role::Member);
        assert_eq!(parse_role(Some("anything")), Role::Member);
        assert_eq!(parse_role(None), Role::Member);
    }
}
