use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use serde::Deserialize;
use tokio::time::Instant;
use tracing::debug;

use super::api::{ApiError, SharedState};
use super::hub::{ClientMessage, RelayHub, RoomDelivery, RoomSubscription, room_delivery};

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub actor: String,
}

// ── WebSocket handler ────────────────────────────────────────────────

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(board_id): Path<String>,
    Query(query): Query<ConnectQuery>,
    State(state): State<SharedState>,
) -> Response {
    let actor_id = query.actor.trim().to_string();
    if actor_id.is_empty() || board_id.trim().is_empty() {
        return ApiError::BadRequest("board id and actor are required".into()).into_response();
    }
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, hub, board_id, actor_id))
}

async fn handle_socket(socket: WebSocket, hub: Arc<RelayHub>, board_id: String, actor_id: String) {
    let (sender, receiver) = socket.split();
    let subscription = hub.join(&board_id, &actor_id);
    run_socket_loop(sender, receiver, subscription, &hub).await;
    hub.leave(&board_id, &actor_id);
}

/// Core WebSocket loop with ping/pong keepalive.
///
/// Sends the room welcome, then forwards room traffic to the socket and
/// client text frames to the room. If no Pong arrives within
/// [`PONG_TIMEOUT`] after a Ping, the connection is considered dead.
async fn run_socket_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut subscription: RoomSubscription,
    hub: &RelayHub,
) {
    if sender
        .send(Message::Text(subscription.welcome.clone().into()))
        .await
        .is_err()
    {
        return;
    }

    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // The first tick completes immediately.
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            // ── Periodic ping ───────────────────────────────────────
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    debug!(board_id = %subscription.board_id, actor_id = %subscription.actor_id, "Pong timeout");
                    break;
                }
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }

            // ── Room traffic ────────────────────────────────────────
            result = subscription.rx.recv() => {
                match room_delivery(&subscription.board_id, &subscription.actor_id, result) {
                    RoomDelivery::Deliver(msg) => {
                        if sender.send(Message::Text(msg.into())).await.is_err() {
                            break;
                        }
                    }
                    RoomDelivery::Close => break,
                }
            }

            // ── Client frames ───────────────────────────────────────
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let outcome = hub.handle_client_message(
                            &subscription.board_id,
                            &subscription.actor_id,
                            text.as_str(),
                        );
                        if outcome == ClientMessage::Leave {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    let _ = sender.send(Message::Close(None)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keepalive_constants() {
        assert!(PONG_TIMEOUT > PING_INTERVAL);
        assert_eq!(PING_INTERVAL, Duration::from_secs(30));
    }

    #[test]
    fn test_connect_query_parses_actor() {
        let query: ConnectQuery = serde_json::from_str(r#"{"actor":"tab_1_abc"}"#).unwrap();
        assert_eq!(query.actor, "tab_1_abc");
    }
}
