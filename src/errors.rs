//! Typed error hierarchy for boardsync.
//!
//! Three top-level enums cover the three layers:
//! - `StoreError` — structural failures inside the in-memory board tree
//! - `InviteError` — invite token and invite lifecycle failures
//! - `SyncError` — everything a mutation or channel operation can surface

use thiserror::Error;

/// Errors from the board store. These never involve I/O.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Board {board_id} not found")]
    BoardNotFound { board_id: String },

    #[error("Board {board_id} already exists")]
    DuplicateBoard { board_id: String },

    #[error("Column {column_id} not found on board {board_id}")]
    ColumnNotFound { board_id: String, column_id: String },

    #[error("Column {column_id} already exists on board {board_id}")]
    DuplicateColumn { board_id: String, column_id: String },

    #[error("Task {task_id} not found on board {board_id}")]
    TaskNotFound { board_id: String, task_id: String },

    #[error("Task {task_id} already exists on board {board_id}")]
    DuplicateTask { board_id: String, task_id: String },

    #[error("Task {task_id} is not in column {column_id}")]
    TaskNotInColumn { task_id: String, column_id: String },

    #[error("Member {member_id} not found on board {board_id}")]
    MemberNotFound { board_id: String, member_id: String },
}

/// Errors from invite token decoding and invite handling.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InviteError {
    #[error("Invalid invite token: {0}")]
    InvalidToken(String),

    #[error("Failed to encode invite: {0}")]
    Encode(String),

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("{email} has already accepted an invite to this board")]
    AlreadyMember { email: String },

    #[error("Invite is no longer valid ({status})")]
    NoLongerValid { status: String },
}

/// Errors surfaced by the mutation engine and the sync client.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Permission denied on board {board_id}: {action} requires {required}")]
    PermissionDenied {
        board_id: String,
        action: &'static str,
        required: &'static str,
    },

    #[error("No access to board {board_id}")]
    NoAccess { board_id: String },

    #[error("Boards are in read-only fallback mode")]
    ReadOnly,

    #[error("Persistence call {operation} failed: {source}")]
    NetworkFailure {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("Channel for board {board_id} is stale")]
    StaleChannel { board_id: String },

    #[error("Reconnection to board {board_id} failed after {attempts} attempts")]
    ReconnectExhausted { board_id: String, attempts: u32 },

    #[error("Invalid channel event: {0}")]
    InvalidEvent(#[from] board_common::EnvelopeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Invite(#[from] InviteError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SyncError {
    /// Mutation failures that were rolled back locally, as opposed to
    /// requests rejected before dispatch.
    pub fn is_rolled_back(&self) -> bool {
        matches!(self, Self::NetworkFailure { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_messages_name_the_entity() {
        let err = StoreError::TaskNotInColumn {
            task_id: "t1".to_string(),
            column_id: "todo".to_string(),
        };
        assert_eq!(err.to_string(), "Task t1 is not in column todo");
    }

    #[test]
    fn sync_error_wraps_store_error() {
        let err: SyncError = StoreError::BoardNotFound {
            board_id: "b1".to_string(),
        }
        .into();
        match &err {
            SyncError::Store(StoreError::BoardNotFound { board_id }) => assert_eq!(board_id, "b1"),
            _ => panic!("Expected Store variant"),
        }
        assert!(!err.is_rolled_back());
    }

    #[test]
    fn network_failure_is_rolled_back_and_keeps_source() {
        let err = SyncError::NetworkFailure {
            operation: "update_task",
            source: anyhow::anyhow!("HTTP 503"),
        };
        assert!(err.is_rolled_back());
        assert!(err.to_string().contains("update_task"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn invite_error_converts_into_sync_error() {
        let err: SyncError = InviteError::InvalidToken("bad base64".to_string()).into();
        assert!(matches!(err, SyncError::Invite(InviteError::InvalidToken(_))));
        assert_eq!(err.to_string(), "Invalid invite token: bad base64");
    }
}
