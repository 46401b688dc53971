//! In-memory persistence with failure injection.

use std::sync::Mutex;

use anyhow::{Result, bail};
use async_trait::async_trait;
use board_common::{Board, BoardPatch, Column, Task, TaskPatch};

use super::BoardPersistence;
use crate::store::BoardStore;

#[derive(Debug, Default)]
struct Inner {
    store: BoardStore,
    calls: Vec<String>,
    failing: bool,
    fail_next: usize,
}

/// Keeps its own `BoardStore` and records every call made against it.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    inner: Mutex<Inner>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_boards(boards: Vec<Board>) -> Self {
        let persistence = Self::default();
        if let Ok(mut inner) = persistence.inner.lock() {
            inner.store = BoardStore::from_boards(boards);
        }
        persistence
    }

    /// Fail every call until switched off.
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failing = failing;
        }
    }

    /// Fail the next `count` calls.
    pub fn fail_next(&self, count: usize) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.fail_next = count;
        }
    }

    /// Operation names in call order, failed calls included.
    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().map(|inner| inner.calls.clone()).unwrap_or_default()
    }

    pub fn boards(&self) -> Vec<Board> {
        self.inner
            .lock()
            .map(|inner| inner.store.boards().to_vec())
            .unwrap_or_default()
    }

    fn call<T>(&self, operation: &str, f: impl FnOnce(&mut BoardStore) -> Result<T>) -> Result<T> {
        let Ok(mut inner) = self.inner.lock() else {
            bail!("persistence state poisoned");
        };
        inner.calls.push(operation.to_string());
        if inner.failing {
            bail!("{} failed: persistence unavailable", operation);
        }
        if inner.fail_next > 0 {
            inner.fail_next -= 1;
            bail!("{} failed: injected failure", operation);
        }
        f(&mut inner.store)
    }
}

#[async_trait]
impl BoardPersistence for MemoryPersistence {
    async fn fetch_boards(&self) -> Result<Vec<Board>> {
        self.call("fetch_boards", |store| Ok(store.boards().to_vec()))
    }

    async fn create_board(&self, board: &Board) -> Result<()> {
        self.call("create_board", |store| Ok(store.add_board(board.clone())?))
    }

    async fn update_board(&self, board_id: &str, patch: &BoardPatch) -> Result<()> {
        self.call("update_board", |store| Ok(store.update_board(board_id, patch)?))
    }

    async fn delete_board(&self, board_id: &str) -> Result<()> {
        self.call("delete_board", |store| {
            store.remove_board(board_id)?;
            Ok(())
        })
    }

    async fn create_column(&self, board_id: &str, column: &Column) -> Result<()> {
        self.call("create_column", |store| Ok(store.add_column(board_id, column.clone())?))
    }

    async fn rename_column(&self, board_id: &str, column_id: &str, title: &str) -> Result<()> {
        self.call("rename_column", |store| Ok(store.rename_column(board_id, column_id, title)?))
    }

    async fn delete_column(&self, board_id: &str, column_id: &str) -> Result<()> {
        self.call("delete_column", |store| {
            store.remove_column(board_id, column_id)?;
            Ok(())
        })
    }

    async fn create_task(&self, board_id: &str, column_id: &str, task: &Task) -> Result<()> {
        self.call("create_task", |store| Ok(store.add_task(board_id, column_id, task.clone())?))
    }

    async fn update_task(&self, board_id: &str, task_id: &str, patch: &TaskPatch) -> Result<()> {
        self.call("update_task", |store| {
            store.update_task(board_id, task_id, patch)?;
            Ok(())
        })
    }

    async fn move_task(&self, board_id: &str, task_id: &str, to_column_id: &str, index: usize) -> Result<()> {
        self.call("move_task", |store| {
            let from = store
                .board(board_id)
                .and_then(|b| b.column_of(task_id))
                .map(str::to_string);
            match from {
                Some(from) => Ok(store.move_task(board_id, task_id, &from, to_column_id, index)?),
                None => bail!("task {} not found on board {}", task_id, board_id),
            }
        })
    }

    async fn delete_task(&self, board_id: &str, task_id: &str) -> Result<()> {
        self.call("delete_task", |store| {
            store.remove_task(board_id, task_id)?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_calls_and_mirrors_state() {
        let persistence = MemoryPersistence::with_boards(vec![Board::new("b1", "Sales")]);
        persistence.create_column("b1", &Column::new("todo", "To do")).await.unwrap();
        persistence
            .create_task("b1", "todo", &Task::with_id("t1", "Call"))
            .await
            .unwrap();
        persistence.move_task("b1", "t1", "todo", 0).await.unwrap();
        assert_eq!(persistence.calls(), vec!["create_column", "create_task", "move_task"]);
        assert_eq!(persistence.boards()[0].task_count(), 1);
    }

    #[tokio::test]
    async fn test_fail_next_then_recover() {
        let persistence = MemoryPersistence::with_boards(vec![Board::new("b1", "Sales")]);
        persistence.fail_next(1);
        assert!(persistence.delete_board("b1").await.is_err());
        assert!(persistence.delete_board("b1").await.is_ok());
        assert_eq!(persistence.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_set_failing() {
        let persistence = MemoryPersistence::new();
        persistence.set_failing(true);
        assert!(persistence.fetch_boards().await.is_err());
        persistence.set_failing(false);
        assert!(persistence.fetch_boards().await.unwrap().is_empty());
    }
}
