//! Crash-safe file replacement and cross-process locking for the state stores
//!
//! Every writer stages its bytes in a uniquely named scratch file next to the
//! target, so concurrent writers (including a second process) never share a
//! scratch path. Read-modify-write sequences that must not interleave across
//! processes hold an advisory lock on a `<file>.lock` sidecar.

use crate::error::Result;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;

/// `path` with `suffix` appended to its file name
pub(crate) fn sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// Directory that holds `path`, `.` for a bare file name
fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> std::io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let value = tokio::task::spawn_blocking(f)
        .await
        .map_err(std::io::Error::other)??;
    Ok(value)
}

/// Flush directory metadata so a completed rename survives power loss
#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Replace the contents of `path` so readers see either the old or the new
/// bytes, never a prefix of the new ones.
pub(crate) async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let path = path.to_path_buf();
    let contents = contents.to_string();

    blocking(move || {
        let dir = parent_dir(&path);
        std::fs::create_dir_all(&dir)?;

        let prefix = path
            .file_name()
            .map(|n| format!(".{}.", n.to_string_lossy()))
            .unwrap_or_else(|| ".state.".to_string());
        let mut scratch = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".tmp")
            .tempfile_in(&dir)?;
        scratch.write_all(contents.as_bytes())?;
        scratch.as_file().sync_all()?;
        scratch.persist(&path).map_err(|e| e.error)?;

        sync_dir(&dir)
    })
    .await
}

/// Read `path` to a string, treating a missing file as `None`
pub(crate) async fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Exclusive advisory lock on a state file's `.lock` sidecar
///
/// Released when dropped.
pub(crate) struct FileLock {
    file: File,
}

impl FileLock {
    /// Block (off the async workers) until the lock for `path` is ours
    pub(crate) async fn acquire(path: &Path) -> Result<Self> {
        let lock_path = sidecar_path(path, ".lock");

        blocking(move || {
            std::fs::create_dir_all(parent_dir(&lock_path))?;
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&lock_path)?;
            file.lock_exclusive()?;
            Ok(FileLock { file })
        })
        .await
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(error = %e, "Failed to release state file lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn scratch_files(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp"))
            .collect()
    }

    #[test]
    fn test_sidecar_path_keeps_extension() {
        assert_eq!(
            sidecar_path(Path::new("/var/state/queue.csv"), ".lock"),
            PathBuf::from("/var/state/queue.csv.lock")
        );
        assert_eq!(
            sidecar_path(Path::new("cursor"), ".tmp"),
            PathBuf::from("cursor.tmp")
        );
    }

    #[test]
    fn test_parent_dir_of_bare_name() {
        assert_eq!(parent_dir(Path::new("cursor")), PathBuf::from("."));
        assert_eq!(parent_dir(Path::new("/a/b")), PathBuf::from("/a"));
    }

    #[tokio::test]
    async fn test_write_atomic_creates_parents_and_leaves_no_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested/deep");
        let path = nested.join("cursor");

        write_atomic(&path, "42").await.unwrap();
        write_atomic(&path, "43").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "43");
        assert!(scratch_files(&nested).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue");

        let mut handles = Vec::new();
        for i in 0..32 {
            let path = path.clone();
            handles.push(tokio::spawn(async move {
                write_atomic(&path, &i.to_string()).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let last: u32 = std::fs::read_to_string(&path).unwrap().parse().unwrap();
        assert!(last < 32);
        assert!(scratch_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_read_optional_missing() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = read_optional(&dir.path().join("absent")).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_file_lock_excludes_second_holder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue");

        let held = FileLock::acquire(&path).await.unwrap();
        assert!(sidecar_path(&path, ".lock").exists());

        let waiter = {
            let path = path.clone();
            tokio::spawn(async move { FileLock::acquire(&path).await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!waiter.is_finished());

        drop(held);
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
