//! Persistence collaborator: the remote store boards are saved to.
//!
//! `BoardPersistence` is the seam the mutation engine awaits on. The HTTP
//! client is the production implementation, `MemoryPersistence` backs tests
//! and offline demos. `load_boards` performs the initial fetch and falls back
//! to the on-disk cache in read-only mode when the remote is unreachable.

pub mod cache;
pub mod http;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use board_common::{Board, BoardPatch, Column, Task, TaskPatch};
use tracing::{info, warn};

use crate::activity::NotificationKind;
use crate::replica::Replica;

pub use cache::{BoardCache, GuestSessionStore};
pub use http::HttpPersistence;
pub use memory::MemoryPersistence;

#[async_trait]
pub trait BoardPersistence: Send + Sync {
    async fn fetch_boards(&self) -> Result<Vec<Board>>;

    async fn create_board(&self, board: &Board) -> Result<()>;

    async fn update_board(&self, board_id: &str, patch: &BoardPatch) -> Result<()>;

    async fn delete_board(&self, board_id: &str) -> Result<()>;

    async fn create_column(&self, board_id: &str, column: &Column) -> Result<()>;

    async fn rename_column(&self, board_id: &str, column_id: &str, title: &str) -> Result<()>;

    async fn delete_column(&self, board_id: &str, column_id: &str) -> Result<()>;

    async fn create_task(&self, board_id: &str, column_id: &str, task: &Task) -> Result<()>;

    async fn update_task(&self, board_id: &str, task_id: &str, patch: &TaskPatch) -> Result<()>;

    async fn move_task(&self, board_id: &str, task_id: &str, to_column_id: &str, index: usize) -> Result<()>;

    async fn delete_task(&self, board_id: &str, task_id: &str) -> Result<()>;
}

/// Where the board list in a replica came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Remote,
    /// Remote failed; boards came from the local cache and are read-only.
    Cache,
    /// Remote failed and there was nothing cached.
    Empty,
}

/// Fetch the board list into `replica`, falling back to `cache`.
pub async fn load_boards(
    persistence: &dyn BoardPersistence,
    cache: &BoardCache,
    replica: &mut Replica,
) -> LoadSource {
    match persistence.fetch_boards().await {
        Ok(boards) => {
            if let Err(e) = cache.save(&boards) {
                warn!(error = %e, "Failed to write board cache");
            }
            info!(count = boards.len(), "Loaded boards from persistence");
            replica.load(boards, false);
            LoadSource::Remote
        }
        Err(e) => {
            warn!(error = %e, "Board fetch failed, falling back to local cache");
            let cached = match cache.load() {
                Ok(cached) => cached,
                Err(cache_err) => {
                    warn!(error = %cache_err, "Board cache unreadable");
                    None
                }
            };
            let source = match cached {
                Some(boards) => {
                    replica.load(boards, true);
                    LoadSource::Cache
                }
                None => {
                    replica.load(Vec::new(), true);
                    LoadSource::Empty
                }
            };
            replica.notify(
                NotificationKind::Warning,
                "Working offline",
                "Boards could not be loaded from the server. Changes are disabled.",
            );
            source
        }
    }
}
