//! Per-board rooms.
//!
//! Each room has one broadcast channel, so every member sees that board's
//! events in one order. Connections are counted per actor: `user-joined` goes
//! out when an actor's first connection arrives and `user-left` when its last
//! one closes. Every forwarded envelope reaches all members, the sender
//! included; clients drop their own echoes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use async_trait::async_trait;
use board_common::{ChannelEnvelope, ChannelEvent};
use tokio::sync::{Notify, broadcast};
use tracing::{debug, info, warn};

use crate::sync::{ChannelConnection, ChannelTransport};

/// Actor id the relay stamps on envelopes it authors.
pub const RELAY_ACTOR_ID: &str = "relay";

pub const DEFAULT_ROOM_CAPACITY: usize = 256;

struct Room {
    tx: broadcast::Sender<String>,
    actors: HashMap<String, usize>,
}

/// A member's view of a room right after joining.
pub struct RoomSubscription {
    pub board_id: String,
    pub actor_id: String,
    pub rx: broadcast::Receiver<String>,
    /// `current-users` envelope for the joiner alone.
    pub welcome: String,
}

/// What the hub did with a message a client sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMessage {
    Forwarded(usize),
    /// The client announced it is leaving.
    Leave,
    Rejected,
}

pub struct RelayHub {
    rooms: Mutex<HashMap<String, Room>>,
    capacity: usize,
}

impl Default for RelayHub {
    fn default() -> Self {
        Self::new(DEFAULT_ROOM_CAPACITY)
    }
}

impl RelayHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn rooms(&self) -> MutexGuard<'_, HashMap<String, Room>> {
        self.rooms.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn join(&self, board_id: &str, actor_id: &str) -> RoomSubscription {
        let mut rooms = self.rooms();
        let room = rooms.entry(board_id.to_string()).or_insert_with(|| Room {
            tx: broadcast::channel(self.capacity).0,
            actors: HashMap::new(),
        });
        let rx = room.tx.subscribe();

        let mut present: Vec<String> = room.actors.keys().filter(|id| *id != actor_id).cloned().collect();
        present.sort();

        let count = room.actors.entry(actor_id.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            send(&room.tx, &ChannelEnvelope::new(board_id, actor_id, ChannelEvent::UserJoined));
            info!(board_id = %board_id, actor_id = %actor_id, "Actor joined room");
        } else {
            debug!(board_id = %board_id, actor_id = %actor_id, connections = *count, "Additional connection");
        }

        let welcome = ChannelEnvelope::new(
            board_id,
            RELAY_ACTOR_ID,
            ChannelEvent::CurrentUsers { actor_ids: present },
        )
        .to_json()
        .unwrap_or_default();

        RoomSubscription {
            board_id: board_id.to_string(),
            actor_id: actor_id.to_string(),
            rx,
            welcome,
        }
    }

    /// Drop one connection of `actor_id`. Emits `user-left` when it was the last.
    pub fn leave(&self, board_id: &str, actor_id: &str) {
        let mut rooms = self.rooms();
        let Some(room) = rooms.get_mut(board_id) else {
            return;
        };
        let remaining = match room.actors.get_mut(actor_id) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => return,
        };
        if remaining == 0 {
            room.actors.remove(actor_id);
            send(&room.tx, &ChannelEnvelope::new(board_id, actor_id, ChannelEvent::UserLeft));
            info!(board_id = %board_id, actor_id = %actor_id, "Actor left room");
        }
        if room.actors.is_empty() {
            rooms.remove(board_id);
            debug!(board_id = %board_id, "Room closed");
        }
    }

    /// Validate and forward a client message to the room.
    ///
    /// The envelope must name the connection's board and actor. Presence
    /// bookkeeping events are relay-authored and are never forwarded from
    /// clients.
    pub fn handle_client_message(&self, board_id: &str, actor_id: &str, raw: &str) -> ClientMessage {
        let envelope = match ChannelEnvelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(board_id = %board_id, actor_id = %actor_id, error = %e, "Rejected client message");
                return ClientMessage::Rejected;
            }
        };
        if envelope.board_id != board_id || envelope.actor_id != actor_id {
            warn!(board_id = %board_id, actor_id = %actor_id, "Rejected envelope with mismatched identity");
            return ClientMessage::Rejected;
        }
        match envelope.event {
            ChannelEvent::UserLeft => return ClientMessage::Leave,
            ChannelEvent::UserJoined | ChannelEvent::CurrentUsers { .. } => return ClientMessage::Rejected,
            _ => {}
        }
        let rooms = self.rooms();
        match rooms.get(board_id) {
            Some(room) => ClientMessage::Forwarded(room.tx.send(raw.to_string()).unwrap_or(0)),
            None => ClientMessage::Rejected,
        }
    }

    /// Actors currently in a room, sorted.
    pub fn online(&self, board_id: &str) -> Vec<String> {
        let rooms = self.rooms();
        let mut actors: Vec<String> = rooms
            .get(board_id)
            .map(|room| room.actors.keys().cloned().collect())
            .unwrap_or_default();
        actors.sort();
        actors
    }

    pub fn room_count(&self) -> usize {
        self.rooms().len()
    }
}

/// What a connection loop does with one receive from its room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomDelivery {
    Deliver(String),
    /// Stop serving the connection. A lagged subscriber has lost events for
    /// good; the client reconnects and refetches instead.
    Close,
}

pub fn room_delivery(
    board_id: &str,
    actor_id: &str,
    result: Result<String, broadcast::error::RecvError>,
) -> RoomDelivery {
    match result {
        Ok(raw) => RoomDelivery::Deliver(raw),
        Err(broadcast::error::RecvError::Lagged(skipped)) => {
            warn!(board_id = %board_id, actor_id = %actor_id, skipped, "Room subscriber lagged, closing connection");
            RoomDelivery::Close
        }
        Err(broadcast::error::RecvError::Closed) => RoomDelivery::Close,
    }
}

fn send(tx: &broadcast::Sender<String>, envelope: &ChannelEnvelope) {
    match envelope.to_json() {
        Ok(json) => {
            let _ = tx.send(json);
        }
        Err(e) => warn!(error = %e, "Failed to serialize relay envelope"),
    }
}

// ── In-process transport ─────────────────────────────────────────────

/// Connects sync clients straight to a `RelayHub` without a socket.
#[derive(Clone)]
pub struct HubTransport {
    hub: Arc<RelayHub>,
    kill_switches: Arc<Mutex<HashMap<String, Vec<Arc<Notify>>>>>,
}

impl HubTransport {
    pub fn new(hub: Arc<RelayHub>) -> Self {
        Self {
            hub,
            kill_switches: Arc::default(),
        }
    }

    pub fn hub(&self) -> &Arc<RelayHub> {
        &self.hub
    }

    /// Sever every live connection of `actor_id`, as a network drop would.
    pub fn sever(&self, actor_id: &str) {
        let switches = self
            .kill_switches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(actor_id)
            .unwrap_or_default();
        for switch in switches {
            switch.notify_one();
        }
    }
}

#[async_trait]
impl ChannelTransport for HubTransport {
    async fn connect(&self, board_id: &str, actor_id: &str) -> Result<ChannelConnection> {
        let (connection, mut remote) = ChannelConnection::pair();
        let mut subscription = self.hub.join(board_id, actor_id);
        if remote.to_client.send(subscription.welcome.clone()).is_err() {
            self.hub.leave(board_id, actor_id);
            anyhow::bail!("client dropped before welcome");
        }

        let kill = Arc::new(Notify::new());
        self.kill_switches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(actor_id.to_string())
            .or_default()
            .push(kill.clone());

        let hub = self.hub.clone();
        let kill_switches = self.kill_switches.clone();
        tokio::spawn(async move {
            let board_id = subscription.board_id.clone();
            let actor_id = subscription.actor_id.clone();
            loop {
                tokio::select! {
                    _ = kill.notified() => break,
                    outbound = remote.from_client.recv() => match outbound {
                        Some(raw) => {
                            if hub.handle_client_message(&board_id, &actor_id, &raw) == ClientMessage::Leave {
                                break;
                            }
                        }
                        None => break,
                    },
                    inbound = subscription.rx.recv() => match room_delivery(&board_id, &actor_id, inbound) {
                        RoomDelivery::Deliver(raw) => {
                            if remote.to_client.send(raw).is_err() {
                                break;
                            }
                        }
                        RoomDelivery::Close => break,
                    },
                }
            }
            if let Some(switches) = kill_switches
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get_mut(&actor_id)
            {
                switches.retain(|s| !Arc::ptr_eq(s, &kill));
            }
            hub.leave(&board_id, &actor_id);
        });
        Ok(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> ChannelEnvelope {
        ChannelEnvelope::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_join_broadcasts_and_welcomes() {
        let hub = RelayHub::default();
        let mut first = hub.join("b1", "alice");
        let second = hub.join("b1", "bob");

        assert_eq!(parse(&first.welcome).event, ChannelEvent::CurrentUsers { actor_ids: vec![] });
        assert_eq!(
            parse(&second.welcome).event,
            ChannelEvent::CurrentUsers {
                actor_ids: vec!["alice".to_string()]
            }
        );
        assert_eq!(parse(&first.rx.recv().await.unwrap()).actor_id, "alice");
        let joined = parse(&first.rx.recv().await.unwrap());
        assert_eq!(joined.event, ChannelEvent::UserJoined);
        assert_eq!(joined.actor_id, "bob");
        assert_eq!(hub.online("b1"), vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_second_connection_does_not_rejoin_or_leave() {
        let hub = RelayHub::default();
        let mut watcher = hub.join("b1", "watcher");
        let _ = watcher.rx.recv().await;

        let _a1 = hub.join("b1", "alice");
        let _a2 = hub.join("b1", "alice");
        hub.leave("b1", "alice");
        assert_eq!(hub.online("b1"), vec!["alice", "watcher"]);
        hub.leave("b1", "alice");

        let joined = parse(&watcher.rx.recv().await.unwrap());
        assert_eq!(joined.event, ChannelEvent::UserJoined);
        let left = parse(&watcher.rx.recv().await.unwrap());
        assert_eq!(left.event, ChannelEvent::UserLeft);
        assert_eq!(left.actor_id, "alice");
        assert!(watcher.rx.try_recv().is_err());
    }

    #[test]
    fn test_empty_room_is_removed() {
        let hub = RelayHub::default();
        let _sub = hub.join("b1", "alice");
        assert_eq!(hub.room_count(), 1);
        hub.leave("b1", "alice");
        assert_eq!(hub.room_count(), 0);
        hub.leave("b1", "alice");
    }

    #[tokio::test]
    async fn test_client_messages_validated() {
        let hub = RelayHub::default();
        let mut sub = hub.join("b1", "alice");
        let _ = sub.rx.recv().await;

        let update = ChannelEnvelope::new(
            "b1",
            "alice",
            ChannelEvent::ColumnDeleted {
                column_id: "todo".to_string(),
            },
        )
        .to_json()
        .unwrap();
        assert_eq!(hub.handle_client_message("b1", "alice", &update), ClientMessage::Forwarded(1));
        assert_eq!(parse(&sub.rx.recv().await.unwrap()).event.name(), "column-deleted");

        assert_eq!(hub.handle_client_message("b1", "mallory", &update), ClientMessage::Rejected);
        assert_eq!(hub.handle_client_message("b1", "alice", "garbage"), ClientMessage::Rejected);
        let spoofed_join = ChannelEnvelope::new("b1", "alice", ChannelEvent::UserJoined).to_json().unwrap();
        assert_eq!(hub.handle_client_message("b1", "alice", &spoofed_join), ClientMessage::Rejected);
        let leave = ChannelEnvelope::new("b1", "alice", ChannelEvent::UserLeft).to_json().unwrap();
        assert_eq!(hub.handle_client_message("b1", "alice", &leave), ClientMessage::Leave);
    }

    #[tokio::test]
    async fn test_hub_transport_round_trip_and_leave() {
        let hub = Arc::new(RelayHub::default());
        let transport = HubTransport::new(hub.clone());
        let mut alice = transport.connect("b1", "alice").await.unwrap();
        let welcome = parse(&alice.recv().await.unwrap());
        assert_eq!(welcome.actor_id, RELAY_ACTOR_ID);
        assert_eq!(parse(&alice.recv().await.unwrap()).event, ChannelEvent::UserJoined);

        let bob = transport.connect("b1", "bob").await.unwrap();
        assert_eq!(parse(&alice.recv().await.unwrap()).actor_id, "bob");

        bob.send(&ChannelEnvelope::new("b1", "bob", ChannelEvent::UserLeft)).unwrap();
        let left = parse(&alice.recv().await.unwrap());
        assert_eq!(left.event, ChannelEvent::UserLeft);
        assert_eq!(hub.online("b1"), vec!["alice"]);
    }

    #[test]
    fn test_room_delivery_closes_on_lag() {
        assert_eq!(
            room_delivery("b1", "alice", Ok("x".to_string())),
            RoomDelivery::Deliver("x".to_string())
        );
        assert_eq!(
            room_delivery("b1", "alice", Err(broadcast::error::RecvError::Lagged(3))),
            RoomDelivery::Close
        );
        assert_eq!(
            room_delivery("b1", "alice", Err(broadcast::error::RecvError::Closed)),
            RoomDelivery::Close
        );
    }

    #[tokio::test]
    async fn test_lagging_subscriber_is_disconnected() {
        let hub = Arc::new(RelayHub::new(1));
        let transport = HubTransport::new(hub.clone());
        let mut alice = transport.connect("b1", "alice").await.unwrap();

        // The forwarding task has not run yet, so alice's one-slot buffer overflows.
        for column in ["c1", "c2", "c3"] {
            let raw = ChannelEnvelope::new(
                "b1",
                "bob",
                ChannelEvent::ColumnDeleted {
                    column_id: column.to_string(),
                },
            )
            .to_json()
            .unwrap();
            assert!(matches!(hub.handle_client_message("b1", "bob", &raw), ClientMessage::Forwarded(_)));
        }

        let welcome = tokio::time::timeout(std::time::Duration::from_secs(1), alice.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(parse(&welcome).actor_id, RELAY_ACTOR_ID);
        let closed = tokio::time::timeout(std::time::Duration::from_secs(1), alice.recv())
            .await
            .unwrap();
        assert!(closed.is_none());
        assert!(hub.online("b1").is_empty());

        let mut again = transport.connect("b1", "alice").await.unwrap();
        let welcome = parse(&again.recv().await.unwrap());
        assert_eq!(welcome.event.name(), "current-users");
        assert_eq!(hub.online("b1"), vec!["alice"]);
    }

    #[tokio::test]
    async fn test_sever_closes_client_channel() {
        let hub = Arc::new(RelayHub::default());
        let transport = HubTransport::new(hub.clone());
        let mut alice = transport.connect("b1", "alice").await.unwrap();
        let _ = alice.recv().await;
        let _ = alice.recv().await;
        transport.sever("alice");
        assert!(alice.recv().await.is_none());
        assert!(hub.online("b1").is_empty());
    }
}
