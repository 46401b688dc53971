use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{BoardPatch, Column, Task, TaskPatch};

// ── Channel event types ──────────────────────────────────────────────

/// Everything that travels over a board channel, one variant per event name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ChannelEvent {
    /// Presence snapshot sent by the relay to a joining actor only.
    CurrentUsers {
        actor_ids: Vec<String>,
    },
    UserJoined,
    UserLeft,
    UserActivity {
        activity: ActorActivity,
    },
    TaskCreated {
        column_id: String,
        task: Task,
    },
    TaskUpdated {
        task_id: String,
        patch: TaskPatch,
    },
    TaskDeleted {
        task_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task_title: Option<String>,
    },
    TaskMoved {
        task_id: String,
        from_column_id: String,
        to_column_id: String,
        index: usize,
        /// Full task so peers that never saw it can still place it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task: Option<Task>,
    },
    BoardUpdated {
        patch: BoardPatch,
    },
    ColumnCreated {
        column: Column,
    },
    ColumnRenamed {
        column_id: String,
        title: String,
    },
    ColumnDeleted {
        column_id: String,
    },
}

impl ChannelEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CurrentUsers { .. } => "current-users",
            Self::UserJoined => "user-joined",
            Self::UserLeft => "user-left",
            Self::UserActivity { .. } => "user-activity",
            Self::TaskCreated { .. } => "task-created",
            Self::TaskUpdated { .. } => "task-updated",
            Self::TaskDeleted { .. } => "task-deleted",
            Self::TaskMoved { .. } => "task-moved",
            Self::BoardUpdated { .. } => "board-updated",
            Self::ColumnCreated { .. } => "column-created",
            Self::ColumnRenamed { .. } => "column-renamed",
            Self::ColumnDeleted { .. } => "column-deleted",
        }
    }

    /// Presence traffic, as opposed to events that mutate the board tree.
    pub fn is_presence(&self) -> bool {
        matches!(
            self,
            Self::CurrentUsers { .. } | Self::UserJoined | Self::UserLeft | Self::UserActivity { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "activity",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ActorActivity {
    EditingTask {
        task_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task_title: Option<String>,
    },
}

// ── Envelope ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("Malformed channel message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Channel message is missing {0}")]
    MissingField(&'static str),
}

/// A channel event stamped with its board and originating actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelEnvelope {
    pub board_id: String,
    pub actor_id: String,
    pub sent_at: DateTime<Utc>,
    pub event: ChannelEvent,
}

impl ChannelEnvelope {
    pub fn new(board_id: impl Into<String>, actor_id: impl Into<String>, event: ChannelEvent) -> Self {
        Self {
            board_id: board_id.into(),
            actor_id: actor_id.into(),
            sent_at: Utc::now(),
            event,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse and validate a raw channel message.
    pub fn parse(raw: &str) -> Result<Self, EnvelopeError> {
        let envelope: Self = serde_json::from_str(raw)?;
        envelope.validate()?;
        Ok(envelope)
    }

    pub fn validate(&self) -> Result<(), EnvelopeError> {
        if self.board_id.trim().is_empty() {
            return Err(EnvelopeError::MissingField("boardId"));
        }
        if self.actor_id.trim().is_empty() {
            return Err(EnvelopeError::MissingField("actorId"));
        }
        match &self.event {
            ChannelEvent::TaskCreated { column_id, task } => {
                non_empty(column_id, "columnId")?;
                non_empty(&task.id, "task.id")?;
            }
            ChannelEvent::TaskUpdated { task_id, .. } | ChannelEvent::TaskDeleted { task_id, .. } => {
                non_empty(task_id, "taskId")?;
            }
            ChannelEvent::TaskMoved {
                task_id,
                from_column_id,
                to_column_id,
                ..
            } => {
                non_empty(task_id, "taskId")?;
                non_empty(from_column_id, "fromColumnId")?;
                non_empty(to_column_id, "toColumnId")?;
            }
            ChannelEvent::UserActivity {
                activity: ActorActivity::EditingTask { task_id, .. },
            } => non_empty(task_id, "data.taskId")?,
            ChannelEvent::ColumnCreated { column } => non_empty(&column.id, "column.id")?,
            ChannelEvent::ColumnRenamed { column_id, .. } | ChannelEvent::ColumnDeleted { column_id } => {
                non_empty(column_id, "columnId")?;
            }
            ChannelEvent::CurrentUsers { .. }
            | ChannelEvent::UserJoined
            | ChannelEvent::UserLeft
            | ChannelEvent::BoardUpdated { .. } => {}
        }
        Ok(())
    }
}

fn non_empty(value: &str, field: &'static str) -> Result<(), EnvelopeError> {
    if value.trim().is_empty() {
        Err(EnvelopeError::MissingField(field))
    } else {
        Ok(())
    }
}
