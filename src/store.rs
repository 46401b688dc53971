//! In-memory board tree: boards → columns → tasks.
//!
//! `BoardStore` is the only place the tree is mutated. Both local mutations
//! (through `optimistic::MutationEngine`) and remote ones (through
//! `sync::SyncClient`) call these operations, so the single-column membership
//! invariant for tasks is enforced in exactly one place. The store does no I/O.

use board_common::{Board, BoardMember, BoardPatch, Column, MemberStatus, Task, TaskPatch};
use chrono::{DateTime, Utc};

use crate::errors::StoreError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoardStore {
    boards: Vec<Board>,
}

impl BoardStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_boards(boards: Vec<Board>) -> Self {
        Self { boards }
    }

    pub fn boards(&self) -> &[Board] {
        &self.boards
    }

    pub fn into_boards(self) -> Vec<Board> {
        self.boards
    }

    pub fn board(&self, board_id: &str) -> Option<&Board> {
        self.boards.iter().find(|b| b.id == board_id)
    }

    fn board_mut(&mut self, board_id: &str) -> Result<&mut Board, StoreError> {
        self.boards
            .iter_mut()
            .find(|b| b.id == board_id)
            .ok_or_else(|| StoreError::BoardNotFound {
                board_id: board_id.to_string(),
            })
    }

    pub fn task(&self, board_id: &str, task_id: &str) -> Option<&Task> {
        self.board(board_id).and_then(|b| b.task(task_id))
    }

    /// Copy of the full tree, used as a rollback point.
    pub fn snapshot(&self) -> BoardStore {
        self.clone()
    }

    /// Replace the whole tree with a previously taken snapshot.
    pub fn restore(&mut self, snapshot: BoardStore) {
        *self = snapshot;
    }

    // ── Boards ───────────────────────────────────────────────────────

    pub fn add_board(&mut self, board: Board) -> Result<(), StoreError> {
        if self.board(&board.id).is_some() {
            return Err(StoreError::DuplicateBoard { board_id: board.id });
        }
        self.boards.push(board);
        Ok(())
    }

    pub fn update_board(&mut self, board_id: &str, patch: &BoardPatch) -> Result<(), StoreError> {
        patch.apply(self.board_mut(board_id)?);
        Ok(())
    }

    pub fn remove_board(&mut self, board_id: &str) -> Result<Board, StoreError> {
        let index = self
            .boards
            .iter()
            .position(|b| b.id == board_id)
            .ok_or_else(|| StoreError::BoardNotFound {
                board_id: board_id.to_string(),
            })?;
        Ok(self.boards.remove(index))
    }

    // ── Columns ──────────────────────────────────────────────────────

    pub fn add_column(&mut self, board_id: &str, column: Column) -> Result<(), StoreError> {
        let board = self.board_mut(board_id)?;
        if board.column(&column.id).is_some() {
            return Err(StoreError::DuplicateColumn {
                board_id: board_id.to_string(),
                column_id: column.id,
            });
        }
        if let Some(task) = column.tasks.iter().find(|t| board.locate_task(&t.id).is_some()) {
            return Err(StoreError::DuplicateTask {
                board_id: board_id.to_string(),
                task_id: task.id.clone(),
            });
        }
        board.columns.push(column);
        Ok(())
    }

    pub fn rename_column(&mut self, board_id: &str, column_id: &str, title: &str) -> Result<(), StoreError> {
        let column = self
            .board_mut(board_id)?
            .column_mut(column_id)
            .ok_or_else(|| column_not_found(board_id, column_id))?;
        column.title = title.to_string();
        Ok(())
    }

    /// Remove a column together with the tasks it holds.
    pub fn remove_column(&mut self, board_id: &str, column_id: &str) -> Result<Column, StoreError> {
        let board = self.board_mut(board_id)?;
        let index = board
            .columns
            .iter()
            .position(|c| c.id == column_id)
            .ok_or_else(|| column_not_found(board_id, column_id))?;
        Ok(board.columns.remove(index))
    }

    // ── Tasks ────────────────────────────────────────────────────────

    /// Append a task to the end of a column.
    pub fn add_task(&mut self, board_id: &str, column_id: &str, task: Task) -> Result<(), StoreError> {
        self.insert_task(board_id, column_id, usize::MAX, task)
    }

    /// Insert a task at `index` (clamped to the column length).
    pub fn insert_task(
        &mut self,
        board_id: &str,
        column_id: &str,
        index: usize,
        task: Task,
    ) -> Result<(), StoreError> {
        let board = self.board_mut(board_id)?;
        if board.locate_task(&task.id).is_some() {
            return Err(StoreError::DuplicateTask {
                board_id: board_id.to_string(),
                task_id: task.id,
            });
        }
        let column = board
            .column_mut(column_id)
            .ok_or_else(|| column_not_found(board_id, column_id))?;
        let index = index.min(column.tasks.len());
        column.tasks.insert(index, task);
        Ok(())
    }

    /// Merge `patch` into the task and return the updated task.
    pub fn update_task(&mut self, board_id: &str, task_id: &str, patch: &TaskPatch) -> Result<Task, StoreError> {
        let board = self.board_mut(board_id)?;
        let (ci, ti) = board
            .locate_task(task_id)
            .ok_or_else(|| task_not_found(board_id, task_id))?;
        let task = &mut board.columns[ci].tasks[ti];
        patch.apply(task);
        Ok(task.clone())
    }

    /// Move a task out of `from_column_id` and into `to_column_id` at `index`.
    ///
    /// The destination index is clamped. Moving within one column is a reorder.
    /// Nothing is modified unless both columns exist and the task is in the
    /// source column.
    pub fn move_task(
        &mut self,
        board_id: &str,
        task_id: &str,
        from_column_id: &str,
        to_column_id: &str,
        index: usize,
    ) -> Result<(), StoreError> {
        let board = self.board_mut(board_id)?;
        if board.column(to_column_id).is_none() {
            return Err(column_not_found(board_id, to_column_id));
        }
        let source = board
            .column_mut(from_column_id)
            .ok_or_else(|| column_not_found(board_id, from_column_id))?;
        let position = source
            .position_of(task_id)
            .ok_or_else(|| StoreError::TaskNotInColumn {
                task_id: task_id.to_string(),
                column_id: from_column_id.to_string(),
            })?;
        let task = source.tasks.remove(position);

        let Some(dest) = board.column_mut(to_column_id) else {
            return Err(column_not_found(board_id, to_column_id));
        };
        let index = index.min(dest.tasks.len());
        dest.tasks.insert(index, task);
        Ok(())
    }

    /// Remove a task from whichever column holds it. Returns the column id and the task.
    pub fn remove_task(&mut self, board_id: &str, task_id: &str) -> Result<(String, Task), StoreError> {
        let board = self.board_mut(board_id)?;
        let (ci, ti) = board
            .locate_task(task_id)
            .ok_or_else(|| task_not_found(board_id, task_id))?;
        let column = &mut board.columns[ci];
        let task = column.tasks.remove(ti);
        Ok((column.id.clone(), task))
    }

    // ── Members ──────────────────────────────────────────────────────

    /// Record a new pending invite, expiring any earlier non-accepted,
    /// non-expired invite for the same email. Returns the expired member ids.
    pub fn record_invite(&mut self, board_id: &str, member: BoardMember) -> Result<Vec<String>, StoreError> {
        let board = self.board_mut(board_id)?;
        let mut expired = Vec::new();
        for existing in board.members.iter_mut().filter(|m| {
            m.email.eq_ignore_ascii_case(&member.email)
                && !matches!(m.status, MemberStatus::Accepted | MemberStatus::Expired)
        }) {
            existing.status = MemberStatus::Expired;
            expired.push(existing.id.clone());
        }
        board.members.push(member);
        Ok(expired)
    }

    pub fn set_member_status(
        &mut self,
        board_id: &str,
        member_id: &str,
        status: MemberStatus,
        at: DateTime<Utc>,
        name: Option<String>,
    ) -> Result<(), StoreError> {
        let member = self
            .board_mut(board_id)?
            .members
            .iter_mut()
            .find(|m| m.id == member_id)
            .ok_or_else(|| StoreError::MemberNotFound {
                board_id: board_id.to_string(),
                member_id: member_id.to_string(),
            })?;
        member.status = status;
        if status == MemberStatus::Accepted {
            member.accepted_at = Some(at);
        }
        if name.is_some() {
            member.name = name;
        }
        Ok(())
    }
}

fn column_not_found(board_id: &str, column_id: &str) -> StoreError {
    StoreError::ColumnNotFound {
        board_id: board_id.to_string(),
        column_id: column_id.to_string(),
    }
}

fn task_not_found(board_id: &str, task_id: &str) -> StoreError {
    StoreError::TaskNotFound {
        board_id: board_id.to_string(),
        task_id: task_id.to_string(),
    }
}
