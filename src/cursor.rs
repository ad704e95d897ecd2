//! Durable "last notified offense" cursor
//!
//! The cursor is a single decimal integer on disk. It only ever moves
//! forward: a save below the stored value is refused and logged.

use crate::atomic::{read_optional, write_atomic, FileLock};
use crate::error::{Result, WatchError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Trait for persisting the forward scanner's cursor
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Load the cursor, `None` if it was never seeded
    async fn load(&self) -> Result<Option<u64>>;

    /// Persist a new cursor value
    async fn save(&self, id: u64) -> Result<()>;
}

/// File-backed cursor
///
/// Writes go through a temp file + rename so a crash mid-save leaves the
/// previous value intact. The backwards check and the write happen under
/// the file's advisory lock, so another process cannot slip a save between
/// them.
pub struct FileCursorStore {
    path: PathBuf,
}

impl FileCursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Parse cursor file content; blank content means "not seeded"
pub(crate) fn parse_cursor(path: &Path, content: &str) -> Result<Option<u64>> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<u64>()
        .map(Some)
        .map_err(|e| WatchError::CorruptState {
            path: path.to_path_buf(),
            reason: format!("cursor is not an integer ({:?}): {}", trimmed, e),
        })
}

#[async_trait]
impl CursorStore for FileCursorStore {
    async fn load(&self) -> Result<Option<u64>> {
        match read_optional(&self.path).await? {
            Some(content) => parse_cursor(&self.path, &content),
            None => Ok(None),
        }
    }

    async fn save(&self, id: u64) -> Result<()> {
        let _lock = FileLock::acquire(&self.path).await?;
        if let Some(current) = self.load().await? {
            if id < current {
                tracing::warn!(
                    path = %self.path.display(),
                    current,
                    requested = id,
                    "Refusing to move cursor backwards"
                );
                return Ok(());
            }
        }

        write_atomic(&self.path, &id.to_string()).await?;
        tracing::debug!(path = %self.path.display(), cursor = id, "Cursor saved");
        Ok(())
    }
}

/// In-memory cursor for tests
#[derive(Default)]
pub struct MemoryCursorStore {
    value: Mutex<Option<u64>>,
}

impl MemoryCursorStore {
    /// Create a store already seeded with `id`
    pub fn seeded(id: u64) -> Self {
        Self {
            value: Mutex::new(Some(id)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<u64>> {
        self.value.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn load(&self) -> Result<Option<u64>> {
        Ok(*self.lock())
    }

    async fn save(&self, id: u64) -> Result<()> {
        let mut value = self.lock();
        match *value {
            Some(current) if id < current => {
                tracing::warn!(current, requested = id, "Refusing to move cursor backwards");
            }
            _ => *value = Some(id),
        }
        Ok(())
    }
}
