//! A collaborating client: one replica wired to persistence and a board channel.
//!
//! `BoardSession` is the entry point an application drives. Mutations go
//! through the optimistic engine and, once persisted, are published on the
//! open board's channel. Inbound traffic is pulled with `next_event`.

use std::sync::Arc;

use anyhow::Context;
use board_common::GuestSession;
use tracing::{info, warn};

use crate::activity::NotificationKind;
use crate::clock::SystemClock;
use crate::config::BoardsyncToml;
use crate::errors::SyncError;
use crate::invite;
use crate::optimistic::{Mutation, MutationEngine, MutationOutcome};
use crate::permission::{self, Actor};
use crate::persistence::{self, BoardCache, BoardPersistence, GuestSessionStore, HttpPersistence, LoadSource};
use crate::replica::Replica;
use crate::sync::{ChannelTransport, InboundOutcome, ReconnectPolicy, SyncClient, WsTransport};

pub struct BoardSession {
    replica: Replica,
    persistence: Arc<dyn BoardPersistence>,
    engine: MutationEngine,
    sync: SyncClient,
    guest_store: Option<GuestSessionStore>,
}

impl BoardSession {
    pub fn new(
        replica: Replica,
        persistence: Arc<dyn BoardPersistence>,
        transport: Arc<dyn ChannelTransport>,
        policy: ReconnectPolicy,
    ) -> Self {
        let actor_id = replica.actor().id.clone();
        Self {
            engine: MutationEngine::new(persistence.clone()),
            sync: SyncClient::new(transport, actor_id, policy),
            persistence,
            replica,
            guest_store: None,
        }
    }

    /// A networked session: HTTP persistence and a WebSocket relay, both
    /// taken from `config`, acting as `actor`.
    pub fn from_config(config: &BoardsyncToml, actor: Actor) -> anyhow::Result<Self> {
        let url = config
            .persistence
            .url
            .as_deref()
            .context("persistence.url is not set; a live session needs a persistence service")?;
        let mut http = HttpPersistence::new(url, config.persistence_timeout())?;
        if let Some(token) = &config.persistence.auth_token {
            http = http.with_auth_token(token.clone());
        }
        let transport = WsTransport::new(&config.relay_url())?;
        let replica = Replica::new(actor, Arc::new(SystemClock), config.replica_options());
        Ok(Self::new(replica, Arc::new(http), Arc::new(transport), config.reconnect_policy())
            .with_guest_store(config.guest_session_store()))
    }

    /// Persist accepted guest sessions to `store`.
    pub fn with_guest_store(mut self, store: GuestSessionStore) -> Self {
        self.guest_store = Some(store);
        self
    }

    /// The guest actor saved by an earlier `accept_invite`, if any.
    pub fn stored_guest(store: &GuestSessionStore) -> anyhow::Result<Option<Actor>> {
        Ok(store.load()?.map(Actor::guest))
    }

    pub fn replica(&self) -> &Replica {
        &self.replica
    }

    pub fn replica_mut(&mut self) -> &mut Replica {
        &mut self.replica
    }

    pub fn actor(&self) -> &Actor {
        self.replica.actor()
    }

    /// The board whose channel is open, if any.
    pub fn current_board(&self) -> Option<&str> {
        self.sync.board_id()
    }

    pub fn is_connected(&self) -> bool {
        self.sync.is_connected()
    }

    /// Fetch boards from persistence, falling back to `cache`.
    pub async fn load(&mut self, cache: &BoardCache) -> LoadSource {
        persistence::load_boards(self.persistence.as_ref(), cache, &mut self.replica).await
    }

    /// Resolve an invite link into a guest session, marking the member accepted
    /// on the local replica and saving the session to the guest store. Resume
    /// as the guest later with [`BoardSession::stored_guest`].
    pub fn accept_invite(&mut self, link: &str, name: Option<&str>) -> Result<GuestSession, SyncError> {
        let now = self.replica.now();
        let session = invite::accept_invite(&mut self.replica.store, link, name, now)?;
        if let Some(store) = &self.guest_store {
            store.save(&session).context("Failed to save guest session")?;
            info!(email = %session.email, path = %store.path().display(), "Guest session saved");
        }
        Ok(session)
    }

    /// Open the channel for `board_id`, leaving the current one first.
    pub async fn open(&mut self, board_id: &str) -> Result<(), SyncError> {
        if permission::resolve_effective_permission(self.replica.actor(), board_id, &self.replica.store).is_none() {
            return Err(SyncError::NoAccess {
                board_id: board_id.to_string(),
            });
        }
        self.sync.switch_board(&mut self.replica, board_id).await
    }

    /// Apply a mutation and broadcast it if it targets the open board.
    ///
    /// A broadcast failure does not undo a persisted change; peers catch up
    /// on their next load.
    pub async fn mutate(&mut self, mutation: Mutation) -> Result<MutationOutcome, SyncError> {
        let board_id = mutation.board_id().to_string();
        let deletes_board = matches!(mutation, Mutation::DeleteBoard { .. });
        let outcome = self.engine.apply(&mut self.replica, mutation).await?;

        if let Some(envelope) = &outcome.envelope
            && self.sync.board_id() == Some(board_id.as_str())
            && let Err(e) = self.sync.publish(envelope)
        {
            warn!(board_id = %board_id, error = %e, "Change saved but not broadcast");
            self.replica.notify(
                NotificationKind::Warning,
                "Live update not sent",
                "Your change was saved but collaborators may not see it until they reload.",
            );
        }
        if deletes_board && self.sync.board_id() == Some(board_id.as_str()) {
            info!(board_id = %board_id, "Open board deleted, leaving channel");
            self.sync.leave(&mut self.replica);
        }
        Ok(outcome)
    }

    /// Announce that the local actor is editing `task_id`.
    pub fn start_editing(&mut self, task_id: &str) -> Result<(), SyncError> {
        self.sync.start_editing(&self.replica, task_id)
    }

    /// Wait for and apply the next inbound channel message. After a
    /// reconnect the board list is refetched from persistence.
    pub async fn next_event(&mut self) -> Result<InboundOutcome, SyncError> {
        let outcome = self.sync.recv(&mut self.replica).await?;
        if outcome == InboundOutcome::Reconnected {
            self.resync().await;
        }
        Ok(outcome)
    }

    async fn resync(&mut self) {
        match self.persistence.fetch_boards().await {
            Ok(boards) => {
                info!(count = boards.len(), "Boards refetched after reconnect");
                self.replica.load(boards, false);
            }
            Err(e) => {
                warn!(error = %e, "Board refetch after reconnect failed");
                self.replica.notify(
                    NotificationKind::Warning,
                    "Board may be out of date",
                    "Changes made while you were disconnected could not be fetched. Reload to refresh.",
                );
            }
        }
    }

    /// Apply everything already queued on the channel.
    pub fn drain(&mut self) -> Vec<InboundOutcome> {
        self.sync.drain(&mut self.replica)
    }

    /// Expire editing leases and notifications. Returns tasks whose indicator cleared.
    pub fn tick(&mut self) -> Vec<String> {
        self.replica.sweep()
    }

    pub fn close(&mut self) {
        self.sync.leave(&mut self.replica);
    }
}

impl Drop for BoardSession {
    fn drop(&mut self) {
        if self.sync.is_connected() {
            self.sync.leave(&mut self.replica);
        }
    }
}
