//! Sync client: one board channel per (board, actor).
//!
//! Inbound envelopes from other actors are applied to the replica through
//! `BoardStore` operations; envelopes the local actor sent itself are
//! suppressed. A dropped channel is reconnected with bounded exponential
//! backoff and only surfaces an error once every attempt has failed.

use std::sync::Arc;

use board_common::{ActorActivity, ChannelEnvelope, ChannelEvent};
use tracing::{debug, info, warn};

use super::channel::{ChannelConnection, ChannelTransport, ReconnectPolicy};
use crate::activity::{ActivityKind, NotificationKind};
use crate::errors::{StoreError, SyncError};
use crate::replica::Replica;

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundOutcome {
    /// A board mutation was applied. Carries the event name.
    Applied(&'static str),
    /// Presence or editing state changed.
    Presence(&'static str),
    /// Sent by the local actor; the store was not touched.
    Suppressed,
    /// Valid but a no-op here, such as a duplicate create.
    Ignored(&'static str),
    /// Malformed or addressed to another board.
    Dropped,
    /// The channel dropped and was re-established. Events sent while it was
    /// down were missed.
    Reconnected,
}

pub struct SyncClient {
    transport: Arc<dyn ChannelTransport>,
    policy: ReconnectPolicy,
    actor_id: String,
    board_id: Option<String>,
    connection: Option<ChannelConnection>,
}

impl SyncClient {
    pub fn new(transport: Arc<dyn ChannelTransport>, actor_id: impl Into<String>, policy: ReconnectPolicy) -> Self {
        Self {
            transport,
            policy,
            actor_id: actor_id.into(),
            board_id: None,
            connection: None,
        }
    }

    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    pub fn board_id(&self) -> Option<&str> {
        self.board_id.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Join `board_id`, leaving the current board first.
    pub async fn join(&mut self, replica: &mut Replica, board_id: &str) -> Result<(), SyncError> {
        if self.board_id.is_some() {
            self.leave(replica);
        }
        replica.presence.clear();
        let now = replica.now();
        replica.presence.upsert(&self.actor_id, now);

        self.board_id = Some(board_id.to_string());
        let connection = self.connect_with_retry(board_id).await?;
        self.connection = Some(connection);
        info!(board_id = %board_id, actor_id = %self.actor_id, "Joined board channel");
        Ok(())
    }

    pub async fn switch_board(&mut self, replica: &mut Replica, board_id: &str) -> Result<(), SyncError> {
        if self.board_id.as_deref() == Some(board_id) && self.is_connected() {
            return Ok(());
        }
        self.join(replica, board_id).await
    }

    /// Send a leave signal and tear the channel down.
    pub fn leave(&mut self, replica: &mut Replica) {
        if let (Some(board_id), Some(connection)) = (self.board_id.take(), self.connection.take()) {
            let envelope = ChannelEnvelope::new(board_id.clone(), self.actor_id.clone(), ChannelEvent::UserLeft);
            if let Err(e) = connection.send(&envelope) {
                debug!(board_id = %board_id, error = %e, "Leave signal not delivered");
            }
            info!(board_id = %board_id, actor_id = %self.actor_id, "Left board channel");
        }
        self.board_id = None;
        replica.presence.clear();
    }

    /// Broadcast an envelope produced by the mutation engine.
    pub fn publish(&self, envelope: &ChannelEnvelope) -> Result<(), SyncError> {
        let stale = || SyncError::StaleChannel {
            board_id: envelope.board_id.clone(),
        };
        if self.board_id.as_deref() != Some(envelope.board_id.as_str()) {
            return Err(stale());
        }
        let connection = self.connection.as_ref().ok_or_else(stale)?;
        connection.send(envelope).map_err(|e| {
            warn!(board_id = %envelope.board_id, error = %e, "Channel send failed");
            stale()
        })
    }

    /// Announce that the local actor is editing `task_id`. Repeat to renew.
    pub fn start_editing(&self, replica: &Replica, task_id: &str) -> Result<(), SyncError> {
        let board_id = self.board_id.clone().ok_or_else(|| SyncError::StaleChannel {
            board_id: String::new(),
        })?;
        let task_title = replica.store.task(&board_id, task_id).map(|t| t.title.clone());
        let envelope = ChannelEnvelope::new(
            board_id,
            self.actor_id.clone(),
            ChannelEvent::UserActivity {
                activity: ActorActivity::EditingTask {
                    task_id: task_id.to_string(),
                    task_title,
                },
            },
        );
        self.publish(&envelope)
    }

    /// Wait for the next inbound message and apply it.
    ///
    /// Reconnects when the channel drops and reports it as `Reconnected`.
    /// Returns `ReconnectExhausted` only after the policy's attempts are used up.
    pub async fn recv(&mut self, replica: &mut Replica) -> Result<InboundOutcome, SyncError> {
        loop {
            let board_id = self.board_id.clone().ok_or_else(|| SyncError::StaleChannel {
                board_id: String::new(),
            })?;
            let Some(connection) = self.connection.as_mut() else {
                return Err(SyncError::StaleChannel { board_id });
            };
            match connection.recv().await {
                Some(raw) => return Ok(self.handle_raw(replica, &raw)),
                None => {
                    warn!(board_id = %board_id, "Board channel dropped, reconnecting");
                    self.connection = None;
                    match self.connect_with_retry(&board_id).await {
                        Ok(connection) => {
                            self.connection = Some(connection);
                            // Peers may have left during the outage; the welcome repopulates.
                            let now = replica.now();
                            replica.presence.clear();
                            replica.presence.upsert(&self.actor_id, now);
                            info!(board_id = %board_id, "Board channel re-established");
                            return Ok(InboundOutcome::Reconnected);
                        }
                        Err(e) => {
                            replica.notify(
                                NotificationKind::Error,
                                "Disconnected",
                                "Live updates stopped. Reload to reconnect.",
                            );
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    /// Apply whatever is already queued without waiting.
    pub fn drain(&mut self, replica: &mut Replica) -> Vec<InboundOutcome> {
        let mut raws = Vec::new();
        if let Some(connection) = self.connection.as_mut() {
            while let Some(raw) = connection.try_recv() {
                raws.push(raw);
            }
        }
        raws.iter().map(|raw| self.handle_raw(replica, raw)).collect()
    }

    pub fn handle_raw(&self, replica: &mut Replica, raw: &str) -> InboundOutcome {
        match ChannelEnvelope::parse(raw) {
            Ok(envelope) => self.apply_envelope(replica, envelope),
            Err(e) => {
                warn!(error = %e, "Dropping malformed channel message");
                InboundOutcome::Dropped
            }
        }
    }

    pub fn apply_envelope(&self, replica: &mut Replica, envelope: ChannelEnvelope) -> InboundOutcome {
        if self.board_id.as_deref() != Some(envelope.board_id.as_str()) {
            warn!(board_id = %envelope.board_id, "Dropping envelope for another board");
            return InboundOutcome::Dropped;
        }
        if envelope.actor_id == self.actor_id {
            return InboundOutcome::Suppressed;
        }

        let ChannelEnvelope {
            board_id,
            actor_id,
            event,
            ..
        } = envelope;
        let name = event.name();
        let now = replica.now();
        match event {
            ChannelEvent::CurrentUsers { actor_ids } => {
                for id in actor_ids.iter().filter(|id| **id != self.actor_id) {
                    replica.presence.upsert(id, now);
                }
                InboundOutcome::Presence(name)
            }
            ChannelEvent::UserJoined => {
                replica.presence.upsert(&actor_id, now);
                InboundOutcome::Presence(name)
            }
            ChannelEvent::UserLeft => {
                replica.presence.remove(&actor_id);
                InboundOutcome::Presence(name)
            }
            ChannelEvent::UserActivity {
                activity: ActorActivity::EditingTask { task_id, .. },
            } => {
                replica.presence.upsert(&actor_id, now);
                replica.presence.renew(&actor_id, &task_id, now);
                InboundOutcome::Presence(name)
            }
            event => match apply_remote(replica, &board_id, event) {
                Ok(Some((kind, subject))) => {
                    let actor_name = replica.presence.display_name(&actor_id);
                    if matches!(
                        kind,
                        ActivityKind::TaskCreated
                            | ActivityKind::TaskUpdated
                            | ActivityKind::TaskMoved
                            | ActivityKind::TaskDeleted
                    ) {
                        replica.notify(
                            NotificationKind::Info,
                            format!("Task {}", kind.verb()),
                            format!("{} {} \"{}\"", actor_name, kind.verb(), subject),
                        );
                    }
                    replica.record_activity(kind, &board_id, &actor_id, subject);
                    debug!(board_id = %board_id, actor_id = %actor_id, event = name, "Applied remote event");
                    InboundOutcome::Applied(name)
                }
                Ok(None) => InboundOutcome::Ignored(name),
                Err(e) => {
                    debug!(board_id = %board_id, event = name, error = %e, "Remote event not applicable");
                    InboundOutcome::Ignored(name)
                }
            },
        }
    }

    async fn connect_with_retry(&self, board_id: &str) -> Result<ChannelConnection, SyncError> {
        let attempts = self.policy.max_attempts.max(1);
        for attempt in 1..=attempts {
            match self.transport.connect(board_id, &self.actor_id).await {
                Ok(connection) => return Ok(connection),
                Err(e) => {
                    warn!(board_id = %board_id, attempt, error = %e, "Channel connect failed");
                    if attempt < attempts {
                        tokio::time::sleep(self.policy.delay(attempt)).await;
                    }
                }
            }
        }
        Err(SyncError::ReconnectExhausted {
            board_id: board_id.to_string(),
            attempts,
        })
    }
}

/// Mirror a remote board mutation. `Ok(None)` means the event was a no-op
/// here (duplicate create, task never seen).
fn apply_remote(
    replica: &mut Replica,
    board_id: &str,
    event: ChannelEvent,
) -> Result<Option<(ActivityKind, String)>, StoreError> {
    let store = &mut replica.store;
    let Some(board) = store.board(board_id) else {
        return Err(StoreError::BoardNotFound {
            board_id: board_id.to_string(),
        });
    };
    let applied = match event {
        ChannelEvent::TaskCreated { column_id, task } => {
            if board.locate_task(&task.id).is_some() {
                return Ok(None);
            }
            let title = task.title.clone();
            store.add_task(board_id, &column_id, task)?;
            (ActivityKind::TaskCreated, title)
        }
        ChannelEvent::TaskUpdated { task_id, patch } => {
            let task = store.update_task(board_id, &task_id, &patch)?;
            (ActivityKind::TaskUpdated, task.title)
        }
        ChannelEvent::TaskDeleted { task_id, task_title } => {
            if board.locate_task(&task_id).is_none() {
                return Ok(None);
            }
            let (_, task) = store.remove_task(board_id, &task_id)?;
            (ActivityKind::TaskDeleted, task_title.unwrap_or(task.title))
        }
        ChannelEvent::TaskMoved {
            task_id,
            to_column_id,
            index,
            task,
            ..
        } => {
            // The sender's source column may be stale; move from wherever the task is now.
            match board.column_of(&task_id).map(str::to_string) {
                Some(current) => store.move_task(board_id, &task_id, &current, &to_column_id, index)?,
                None => match task {
                    Some(task) => store.insert_task(board_id, &to_column_id, index, task)?,
                    None => return Ok(None),
                },
            }
            let title = store
                .task(board_id, &task_id)
                .map(|t| t.title.clone())
                .unwrap_or(task_id);
            (ActivityKind::TaskMoved, title)
        }
        ChannelEvent::BoardUpdated { patch } => {
            store.update_board(board_id, &patch)?;
            let title = store.board(board_id).map(|b| b.title.clone()).unwrap_or_default();
            (ActivityKind::BoardUpdated, title)
        }
        ChannelEvent::ColumnCreated { column } => {
            if board.column(&column.id).is_some() {
                return Ok(None);
            }
            let title = column.title.clone();
            store.add_column(board_id, column)?;
            (ActivityKind::ColumnCreated, title)
        }
        ChannelEvent::ColumnRenamed { column_id, title } => {
            store.rename_column(board_id, &column_id, &title)?;
            (ActivityKind::ColumnRenamed, title)
        }
        ChannelEvent::ColumnDeleted { column_id } => {
            let column = store.remove_column(board_id, &column_id)?;
            (ActivityKind::ColumnDeleted, column.title)
        }
        ChannelEvent::CurrentUsers { .. }
        | ChannelEvent::UserJoined
        | ChannelEvent::UserLeft
        | ChannelEvent::UserActivity { .. } => return Ok(None),
    };
    Ok(Some(applied))
}
