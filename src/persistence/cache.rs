//! JSON files on disk: the board fallback cache and the guest session.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use board_common::{Board, GuestSession};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Last successfully fetched board list.
#[derive(Debug, Clone)]
pub struct BoardCache {
    path: PathBuf,
}

impl BoardCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when nothing has been cached yet.
    pub fn load(&self) -> Result<Option<Vec<Board>>> {
        read_json(&self.path)
    }

    pub fn save(&self, boards: &[Board]) -> Result<()> {
        write_json(&self.path, &boards)
    }
}

/// The guest session created by accepting an invite.
#[derive(Debug, Clone)]
pub struct GuestSessionStore {
    path: PathBuf,
}

impl GuestSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<GuestSession>> {
        read_json(&self.path)
    }

    pub fn save(&self, session: &GuestSession) -> Result<()> {
        write_json(&self.path, session)
    }

    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", self.path.display())),
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let value =
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}

/// Write through a sibling temp file so a crash never leaves half a file.
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(value).context("Failed to serialize JSON")?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, content).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use board_common::{BoardAccess, MemberPermission};
    use chrono::Utc;
    use tempfile::tempdir;

    #[test]
    fn test_board_cache_missing_file_is_none() {
        let dir = tempdir().unwrap();
        let cache = BoardCache::new(dir.path().join("boards.json"));
        assert!(cache.load().unwrap().is_none());
    }

    #[test]
    fn test_board_cache_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let cache = BoardCache::new(dir.path().join("nested/deeper/boards.json"));
        cache.save(&[Board::new("b1", "Sales")]).unwrap();
        let boards = cache.load().unwrap().unwrap();
        assert_eq!(boards[0].title, "Sales");
        assert!(!dir.path().join("nested/deeper/boards.json.tmp").exists());
    }

    #[test]
    fn test_board_cache_corrupt_file_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("boards.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = BoardCache::new(&path).load().unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_guest_session_store_camel_case_file() {
        let dir = tempdir().unwrap();
        let store = GuestSessionStore::new(dir.path().join("guest.json"));
        let session = GuestSession {
            email: "guest@x.com".to_string(),
            name: "guest".to_string(),
            board_access: vec![BoardAccess {
                board_id: "b1".to_string(),
                permission: MemberPermission::Edit,
            }],
            is_guest: true,
            joined_at: Utc::now(),
        };
        store.save(&session).unwrap();
        let raw = std::fs::read_to_string(dir.path().join("guest.json")).unwrap();
        assert!(raw.contains("\"boardAccess\""));
        assert!(raw.contains("\"isGuest\": true"));
        assert_eq!(store.load().unwrap(), Some(session));

        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
