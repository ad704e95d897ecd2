//! Failure queue: offenses whose notification failed and must be retried
//!
//! The queue is a deduplicated set of offense ids persisted as one
//! comma-separated line. The forward scanner appends to it and the retry
//! drainer prunes it, so every mutation runs load → mutate → atomic rewrite
//! under a store-owned mutex plus an advisory lock on `<file>.lock`. The
//! mutex orders tasks within the process; the file lock orders separate
//! handles and processes, such as a `--once` run beside the daemon.

use crate::atomic::{read_optional, write_atomic, FileLock};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tokio::sync::Mutex;

/// Trait for the durable retry backlog
#[async_trait]
pub trait FailureQueueStore: Send + Sync {
    /// Load every queued id
    async fn load_all(&self) -> Result<BTreeSet<u64>>;

    /// Queue an id; returns `false` if it was already present
    async fn add(&self, id: u64) -> Result<bool>;

    /// Drop an id; returns `false` if it was not queued
    async fn remove(&self, id: u64) -> Result<bool>;
}

/// Parse the on-disk queue format
///
/// Returns the ids plus any entries that were not integers. Blank entries
/// (leading, trailing, or doubled commas) are ignored silently.
pub fn parse_queue(content: &str) -> (BTreeSet<u64>, Vec<String>) {
    let mut ids = BTreeSet::new();
    let mut rejected = Vec::new();

    for entry in content.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        match entry.parse::<u64>() {
            Ok(id) => {
                ids.insert(id);
            }
            Err(_) => rejected.push(entry.to_string()),
        }
    }

    (ids, rejected)
}

/// Render ids in the on-disk queue format (ascending, no trailing comma)
pub fn render_queue(ids: &BTreeSet<u64>) -> String {
    ids.iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// File-backed failure queue
pub struct FileFailureQueue {
    path: PathBuf,
    /// Serializes every read-modify-write of the file
    guard: Mutex<()>,
}

impl FileFailureQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    /// Caller must hold `guard` and the file lock
    async fn read_ids(&self) -> Result<BTreeSet<u64>> {
        let Some(content) = read_optional(&self.path).await? else {
            return Ok(BTreeSet::new());
        };

        let (ids, rejected) = parse_queue(&content);
        if !rejected.is_empty() {
            tracing::warn!(
                path = %self.path.display(),
                rejected = ?rejected,
                "Dropping malformed failure-queue entries"
            );
        }
        Ok(ids)
    }

    /// Caller must hold `guard` and the file lock
    async fn write_ids(&self, ids: &BTreeSet<u64>) -> Result<()> {
        write_atomic(&self.path, &render_queue(ids)).await
    }
}

#[async_trait]
impl FailureQueueStore for FileFailureQueue {
    async fn load_all(&self) -> Result<BTreeSet<u64>> {
        let _guard = self.guard.lock().await;
        self.read_ids().await
    }

    async fn add(&self, id: u64) -> Result<bool> {
        let _guard = self.guard.lock().await;
        let _lock = FileLock::acquire(&self.path).await?;
        let mut ids = self.read_ids().await?;
        if !ids.insert(id) {
            tracing::debug!(offense_id = id, "Offense already queued for retry");
            return Ok(false);
        }

        self.write_ids(&ids).await?;
        tracing::info!(
            offense_id = id,
            queued = ids.len(),
            path = %self.path.display(),
            "Offense added to failure queue"
        );
        Ok(true)
    }

    async fn remove(&self, id: u64) -> Result<bool> {
        let _guard = self.guard.lock().await;
        let _lock = FileLock::acquire(&self.path).await?;
        let mut ids = self.read_ids().await?;
        if !ids.remove(&id) {
            tracing::warn!(
                offense_id = id,
                path = %self.path.display(),
                "Offense was not in the failure queue; was the file edited by hand?"
            );
            return Ok(false);
        }

        self.write_ids(&ids).await?;
        tracing::info!(
            offense_id = id,
            queued = ids.len(),
            "Offense removed from failure queue"
        );
        Ok(true)
    }
}

/// In-memory failure queue for tests
#[derive(Default)]
pub struct MemoryFailureQueue {
    ids: Mutex<BTreeSet<u64>>,
}

impl MemoryFailureQueue {
    pub fn with_ids(ids: impl IntoIterator<Item = u64>) -> Self {
        Self {
            ids: Mutex::new(ids.into_iter().collect()),
        }
    }
}

#[async_trait]
impl FailureQueueStore for MemoryFailureQueue {
    async fn load_all(&self) -> Result<BTreeSet<u64>> {
        Ok(self.ids.lock().await.clone())
    }

    async fn add(&self, id: u64) -> Result<bool> {
        Ok(self.ids.lock().await.insert(id))
    }

    async fn remove(&self, id: u64) -> Result<bool> {
        let removed = self.ids.lock().await.remove(&id);
        if !removed {
            tracing::warn!(offense_id = id, "Offense was not in the failure queue");
        }
        Ok(removed)
    }
}
