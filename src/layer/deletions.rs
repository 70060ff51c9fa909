//! Deletion markers ("whiteouts") for the union view.
//!
//! A path deleted through the merged namespace while the source tree still
//! holds it is recorded as a marker file in a reserved overlay directory.
//! Marker names are the SHA-256 of the path; the file body is the path so
//! the directory stays inspectable by hand.

use moka::future::Cache;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fs::FsResult;

/// Default name of the reserved marker directory at the overlay root.
pub const DEFAULT_DELETION_DIRNAME: &str = ".regenfs-deletions";

pub struct DeletionStore {
    dir: PathBuf,
    cache: Cache<String, bool>,
}

impl DeletionStore {
    pub fn new(overlay_root: &Path, dirname: &str, ttl: Duration) -> Self {
        let cache = Cache::builder().max_capacity(65_536).time_to_live(ttl).build();
        Self { dir: overlay_root.join(dirname), cache }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn marker_path(&self, path: &str) -> PathBuf {
        let digest = Sha256::digest(path.as_bytes());
        let name: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        self.dir.join(name)
    }

    /// Whether `path` itself carries a marker.
    pub async fn is_marked(&self, path: &str) -> bool {
        if let Some(hit) = self.cache.get(path).await {
            return hit;
        }
        let marked = tokio::fs::try_exists(self.marker_path(path)).await.unwrap_or(false);
        self.cache.insert(path.to_string(), marked).await;
        marked
    }

    /// Whether `path` or any of its ancestors has been deleted.
    pub async fn is_deleted(&self, path: &str) -> bool {
        if self.is_marked(path).await {
            return true;
        }
        for ancestor in crate::fs::path::ancestors(path) {
            if self.is_marked(ancestor).await {
                return true;
            }
        }
        false
    }

    pub async fn mark(&self, path: &str) -> FsResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.marker_path(path), path.as_bytes()).await?;
        self.cache.insert(path.to_string(), true).await;
        tracing::debug!(path = %path, "recorded deletion marker");
        Ok(())
    }

    pub async fn clear(&self, path: &str) -> FsResult<()> {
        match tokio::fs::remove_file(self.marker_path(path)).await {
            Ok(()) => tracing::debug!(path = %path, "cleared deletion marker"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.cache.insert(path.to_string(), false).await;
        Ok(())
    }

    /// Clear the markers of `path` and of everything below it.
    pub async fn clear_tree(&self, path: &str) -> FsResult<()> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let Ok(marked) = tokio::fs::read_to_string(entry.path()).await else {
                continue;
            };
            let below = marked.strip_prefix(path).is_some_and(|rest| rest.starts_with('/'));
            if marked == path || below {
                self.clear(&marked).await?;
            }
        }
        Ok(())
    }
}
