//! Per-root index cache.
//!
//! Each repository root holds at most one snapshot and at most one build in
//! flight. Readers that arrive during a build wait on the build lock and
//! then share the fresh snapshot instead of starting their own.

use crate::error::{EngineError, Result};
use crate::index::{IndexBuilder, RepositoryIndex};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Default)]
struct CacheEntry {
    /// Serializes builds for one root.
    build_lock: tokio::sync::Mutex<()>,
    current: parking_lot::RwLock<Option<Arc<RepositoryIndex>>>,
}

impl CacheEntry {
    fn current(&self) -> Option<Arc<RepositoryIndex>> {
        self.current.read().clone()
    }
}

#[derive(Default)]
pub struct IndexCache {
    entries: DashMap<PathBuf, Arc<CacheEntry>>,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached snapshot for `root`, rebuilding first when no
    /// snapshot exists or the snapshot went stale.
    pub async fn get_or_build(
        &self,
        root: &Path,
        builder: &IndexBuilder,
    ) -> Result<Arc<RepositoryIndex>> {
        let root = root
            .canonicalize()
            .map_err(|_| EngineError::not_found(root))?;

        let entry = {
            let guard = self.entries.entry(root.clone()).or_default();
            Arc::clone(guard.value())
        };

        if let Some(index) = entry.current() {
            if is_fresh(&index).await? {
                debug!(root = %root.display(), "cache hit");
                return Ok(index);
            }
        }

        let _build = entry.build_lock.lock().await;
        // A waiter that queued behind another build finds its result here.
        if let Some(index) = entry.current() {
            if is_fresh(&index).await? {
                return Ok(index);
            }
        }

        info!(root = %root.display(), "building index");
        let index = Arc::new(builder.build(&root).await?);
        *entry.current.write() = Some(Arc::clone(&index));
        Ok(index)
    }

    /// Drop the snapshot for one root; the next access rebuilds.
    pub fn invalidate(&self, root: &Path) {
        let key = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        self.entries.remove(&key);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

async fn is_fresh(index: &Arc<RepositoryIndex>) -> Result<bool> {
    let probe = Arc::clone(index);
    tokio::task::spawn_blocking(move || !probe.is_stale())
        .await
        .map_err(|e| EngineError::Internal(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn repeated_calls_share_one_snapshot() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.py"), "def a(): pass\n").unwrap();

        let cache = IndexCache::new();
        let builder = IndexBuilder::new();
        let first = cache.get_or_build(temp.path(), &builder).await.unwrap();
        let second = cache.get_or_build(temp.path(), &builder).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_build() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.py"), "def a(): pass\n").unwrap();

        let cache = Arc::new(IndexCache::new());
        let builder = IndexBuilder::new();
        let root = temp.path().to_path_buf();

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let builder = builder.clone();
                let root = root.clone();
                tokio::spawn(async move { cache.get_or_build(&root, &builder).await.unwrap() })
            })
            .collect();

        let mut snapshots = Vec::new();
        for task in tasks {
            snapshots.push(task.await.unwrap());
        }
        for snapshot in &snapshots[1..] {
            assert!(Arc::ptr_eq(&snapshots[0], snapshot));
        }
    }

    #[tokio::test]
    async fn stale_snapshot_rebuilds() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.py"), "def a(): pass\n").unwrap();

        let cache = IndexCache::new();
        let builder = IndexBuilder::new();
        let first = cache.get_or_build(temp.path(), &builder).await.unwrap();

        fs::write(temp.path().join("a.py"), "def a(): pass\ndef b(): pass\n").unwrap();
        let second = cache.get_or_build(temp.path(), &builder).await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.symbols().len(), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_rebuild() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.py"), "def a(): pass\n").unwrap();

        let cache = IndexCache::new();
        let builder = IndexBuilder::new();
        let first = cache.get_or_build(temp.path(), &builder).await.unwrap();

        cache.invalidate(temp.path());
        let second = cache.get_or_build(temp.path(), &builder).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn missing_root_is_not_found() {
        let cache = IndexCache::new();
        let builder = IndexBuilder::new();
        let err = cache
            .get_or_build(Path::new("/nonexistent/xyz"), &builder)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }
}
