//! Optimistic mutation engine.
//!
//! Each mutation is checked by the permission guard, applied to the replica
//! immediately, then persisted. If persistence fails the replica is restored
//! to the snapshot taken before the change and an error notification is
//! recorded. On success the caller gets the channel envelope to broadcast.

use std::sync::Arc;

use board_common::{
    Board, BoardPatch, ChannelEnvelope, ChannelEvent, Column, MemberPermission, Task, TaskPatch,
};
use tracing::{debug, warn};

use crate::activity::{ActivityKind, NotificationKind};
use crate::errors::{StoreError, SyncError};
use crate::invite::{self, PreparedInvite};
use crate::permission::{self, Action};
use crate::persistence::BoardPersistence;
use crate::replica::Replica;

/// A user-initiated change to the board tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    CreateBoard {
        board: Board,
    },
    UpdateBoard {
        board_id: String,
        patch: BoardPatch,
    },
    DeleteBoard {
        board_id: String,
    },
    AddColumn {
        board_id: String,
        column: Column,
    },
    RenameColumn {
        board_id: String,
        column_id: String,
        title: String,
    },
    DeleteColumn {
        board_id: String,
        column_id: String,
    },
    CreateTask {
        board_id: String,
        column_id: String,
        task: Task,
    },
    UpdateTask {
        board_id: String,
        task_id: String,
        patch: TaskPatch,
    },
    MoveTask {
        board_id: String,
        task_id: String,
        from_column_id: String,
        to_column_id: String,
        index: usize,
    },
    DeleteTask {
        board_id: String,
        task_id: String,
    },
    InviteMember {
        board_id: String,
        email: String,
        permission: MemberPermission,
    },
}

impl Mutation {
    pub fn board_id(&self) -> &str {
        match self {
            Self::CreateBoard { board } => &board.id,
            Self::UpdateBoard { board_id, .. }
            | Self::DeleteBoard { board_id }
            | Self::AddColumn { board_id, .. }
            | Self::RenameColumn { board_id, .. }
            | Self::DeleteColumn { board_id, .. }
            | Self::CreateTask { board_id, .. }
            | Self::UpdateTask { board_id, .. }
            | Self::MoveTask { board_id, .. }
            | Self::DeleteTask { board_id, .. }
            | Self::InviteMember { board_id, .. } => board_id,
        }
    }

    pub fn action(&self) -> Action {
        match self {
            Self::CreateBoard { .. } => Action::CreateBoard,
            Self::UpdateBoard { .. } => Action::UpdateBoard,
            Self::DeleteBoard { .. } => Action::DeleteBoard,
            Self::AddColumn { .. } => Action::AddColumn,
            Self::RenameColumn { .. } => Action::RenameColumn,
            Self::DeleteColumn { .. } => Action::DeleteColumn,
            Self::CreateTask { .. } => Action::CreateTask,
            Self::UpdateTask { .. } => Action::UpdateTask,
            Self::MoveTask { .. } => Action::MoveTask,
            Self::DeleteTask { .. } => Action::DeleteTask,
            Self::InviteMember { .. } => Action::InviteMember,
        }
    }
}

/// Result of a persisted mutation.
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    /// Event to broadcast on the board channel. Board creation and deletion
    /// have no channel counterpart.
    pub envelope: Option<ChannelEnvelope>,
    /// Set for `InviteMember`.
    pub invite: Option<PreparedInvite>,
}

/// What a locally applied mutation still needs: the persistence call and the
/// follow-up bookkeeping.
struct Applied {
    persist: PersistCall,
    event: Option<ChannelEvent>,
    activity: (ActivityKind, String),
    invite: Option<PreparedInvite>,
}

enum PersistCall {
    CreateBoard(Board),
    UpdateBoard(BoardPatch),
    DeleteBoard,
    CreateColumn(Column),
    RenameColumn { column_id: String, title: String },
    DeleteColumn { column_id: String },
    CreateTask { column_id: String, task: Task },
    UpdateTask { task_id: String, patch: TaskPatch },
    MoveTask { task_id: String, to_column_id: String, index: usize },
    DeleteTask { task_id: String },
}

pub struct MutationEngine {
    persistence: Arc<dyn BoardPersistence>,
}

impl MutationEngine {
    pub fn new(persistence: Arc<dyn BoardPersistence>) -> Self {
        Self { persistence }
    }

    /// Guard, apply, persist, and roll back on failure.
    ///
    /// Takes the replica by `&mut` for the whole call, persistence await
    /// included, so no other write can interleave with this one.
    pub async fn apply(&self, replica: &mut Replica, mutation: Mutation) -> Result<MutationOutcome, SyncError> {
        let board_id = mutation.board_id().to_string();
        let action = mutation.action();
        permission::authorize(replica.actor(), &board_id, action, &replica.store)?;
        if replica.is_read_only() {
            return Err(SyncError::ReadOnly);
        }

        let snapshot = replica.store.snapshot();
        let applied = match apply_local(replica, mutation) {
            Ok(applied) => applied,
            Err(e) => {
                replica.store.restore(snapshot);
                return Err(e);
            }
        };

        if let Err(source) = self.persist(&board_id, &applied.persist).await {
            replica.store.restore(snapshot);
            warn!(board_id = %board_id, action = action.as_str(), error = %source, "Mutation rolled back");
            replica.notify(
                NotificationKind::Error,
                "Change not saved",
                format!("Could not {}; your change was undone.", action.as_str().replace('_', " ")),
            );
            return Err(SyncError::NetworkFailure {
                operation: action.as_str(),
                source,
            });
        }

        debug!(board_id = %board_id, action = action.as_str(), "Mutation persisted");
        let actor_id = replica.actor().id.clone();
        let (kind, subject) = applied.activity;
        replica.record_activity(kind, &board_id, &actor_id, subject);
        Ok(MutationOutcome {
            envelope: applied
                .event
                .map(|event| ChannelEnvelope::new(board_id.clone(), actor_id.clone(), event)),
            invite: applied.invite,
        })
    }

    async fn persist(&self, board_id: &str, call: &PersistCall) -> anyhow::Result<()> {
        let p = &self.persistence;
        match call {
            PersistCall::CreateBoard(board) => p.create_board(board).await,
            PersistCall::UpdateBoard(patch) => p.update_board(board_id, patch).await,
            PersistCall::DeleteBoard => p.delete_board(board_id).await,
            PersistCall::CreateColumn(column) => p.create_column(board_id, column).await,
            PersistCall::RenameColumn { column_id, title } => p.rename_column(board_id, column_id, title).await,
            PersistCall::DeleteColumn { column_id } => p.delete_column(board_id, column_id).await,
            PersistCall::CreateTask { column_id, task } => p.create_task(board_id, column_id, task).await,
            PersistCall::UpdateTask { task_id, patch } => p.update_task(board_id, task_id, patch).await,
            PersistCall::MoveTask {
                task_id,
                to_column_id,
                index,
            } => p.move_task(board_id, task_id, to_column_id, *index).await,
            PersistCall::DeleteTask { task_id } => p.delete_task(board_id, task_id).await,
        }
    }
}

fn apply_local(replica: &mut Replica, mutation: Mutation) -> Result<Applied, SyncError> {
    let actor_id = replica.actor().id.clone();
    let now = replica.now();
    let store = &mut replica.store;
    let applied = match mutation {
        Mutation::CreateBoard { mut board } => {
            if board.owner_id.is_none() {
                board.owner_id = Some(actor_id);
            }
            store.add_board(board.clone())?;
            Applied {
                activity: (ActivityKind::BoardCreated, board.title.clone()),
                persist: PersistCall::CreateBoard(board),
                event: None,
                invite: None,
            }
        }
        Mutation::UpdateBoard { board_id, patch } => {
            store.update_board(&board_id, &patch)?;
            let title = board_title(store, &board_id);
            Applied {
                activity: (ActivityKind::BoardUpdated, title),
                persist: PersistCall::UpdateBoard(patch.clone()),
                event: Some(ChannelEvent::BoardUpdated { patch }),
                invite: None,
            }
        }
        Mutation::DeleteBoard { board_id } => {
            let board = store.remove_board(&board_id)?;
            Applied {
                activity: (ActivityKind::BoardDeleted, board.title),
                persist: PersistCall::DeleteBoard,
                event: None,
                invite: None,
            }
        }
        Mutation::AddColumn { board_id, column } => {
            store.add_column(&board_id, column.clone())?;
            Applied {
                activity: (ActivityKind::ColumnCreated, column.title.clone()),
                persist: PersistCall::CreateColumn(column.clone()),
                event: Some(ChannelEvent::ColumnCreated { column }),
                invite: None,
            }
        }
        Mutation::RenameColumn {
            board_id,
            column_id,
            title,
        } => {
            store.rename_column(&board_id, &column_id, &title)?;
            Applied {
                activity: (ActivityKind::ColumnRenamed, title.clone()),
                persist: PersistCall::RenameColumn {
                    column_id: column_id.clone(),
                    title: title.clone(),
                },
                event: Some(ChannelEvent::ColumnRenamed { column_id, title }),
                invite: None,
            }
        }
        Mutation::DeleteColumn { board_id, column_id } => {
            let column = store.remove_column(&board_id, &column_id)?;
            Applied {
                activity: (ActivityKind::ColumnDeleted, column.title),
                persist: PersistCall::DeleteColumn {
                    column_id: column_id.clone(),
                },
                event: Some(ChannelEvent::ColumnDeleted { column_id }),
                invite: None,
            }
        }
        Mutation::CreateTask {
            board_id,
            column_id,
            task,
        } => {
            store.add_task(&board_id, &column_id, task.clone())?;
            Applied {
                activity: (ActivityKind::TaskCreated, task.title.clone()),
                persist: PersistCall::CreateTask {
                    column_id: column_id.clone(),
                    task: task.clone(),
                },
                event: Some(ChannelEvent::TaskCreated { column_id, task }),
                invite: None,
            }
        }
        Mutation::UpdateTask {
            board_id,
            task_id,
            patch,
        } => {
            let task = store.update_task(&board_id, &task_id, &patch)?;
            Applied {
                activity: (ActivityKind::TaskUpdated, task.title),
                persist: PersistCall::UpdateTask {
                    task_id: task_id.clone(),
                    patch: patch.clone(),
                },
                event: Some(ChannelEvent::TaskUpdated { task_id, patch }),
                invite: None,
            }
        }
        Mutation::MoveTask {
            board_id,
            task_id,
            from_column_id,
            to_column_id,
            index,
        } => {
            store.move_task(&board_id, &task_id, &from_column_id, &to_column_id, index)?;
            let board = store.board(&board_id).ok_or_else(|| StoreError::BoardNotFound {
                board_id: board_id.clone(),
            })?;
            let placed = board
                .column(&to_column_id)
                .and_then(|c| c.position_of(&task_id))
                .unwrap_or(index);
            let task = board.task(&task_id).cloned();
            let title = task.as_ref().map(|t| t.title.clone()).unwrap_or_else(|| task_id.clone());
            Applied {
                activity: (ActivityKind::TaskMoved, title),
                persist: PersistCall::MoveTask {
                    task_id: task_id.clone(),
                    to_column_id: to_column_id.clone(),
                    index: placed,
                },
                event: Some(ChannelEvent::TaskMoved {
                    task_id,
                    from_column_id,
                    to_column_id,
                    index: placed,
                    task,
                }),
                invite: None,
            }
        }
        Mutation::DeleteTask { board_id, task_id } => {
            let (_, task) = store.remove_task(&board_id, &task_id)?;
            Applied {
                activity: (ActivityKind::TaskDeleted, task.title.clone()),
                persist: PersistCall::DeleteTask {
                    task_id: task_id.clone(),
                },
                event: Some(ChannelEvent::TaskDeleted {
                    task_id,
                    task_title: Some(task.title),
                }),
                invite: None,
            }
        }
        Mutation::InviteMember {
            board_id,
            email,
            permission,
        } => {
            let board = store.board(&board_id).ok_or_else(|| StoreError::BoardNotFound {
                board_id: board_id.clone(),
            })?;
            let prepared = invite::prepare_invite(board, &email, permission, now)?;
            store.record_invite(&board_id, prepared.member.clone())?;
            let members = store.board(&board_id).map(|b| b.members.clone()).unwrap_or_default();
            let patch = BoardPatch {
                members: Some(members),
                ..BoardPatch::default()
            };
            Applied {
                activity: (ActivityKind::MemberInvited, prepared.member.email.clone()),
                persist: PersistCall::UpdateBoard(patch.clone()),
                event: Some(ChannelEvent::BoardUpdated { patch }),
                invite: Some(prepared),
            }
        }
    };
    Ok(applied)
}

fn board_title(store: &crate::store::BoardStore, board_id: &str) -> String {
    store
        .board(board_id)
        .map(|b| b.title.clone())
        .unwrap_or_else(|| board_id.to_string())
}
