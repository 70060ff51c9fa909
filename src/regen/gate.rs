//! Staleness gate.
//!
//! Runs before an operation touches a path: if the source file is newer than
//! what the overlay holds, the configured regenerator is invoked and its
//! output is written into the overlay. Sources that disappeared take their
//! overlay entry with them. Every failure here is logged and swallowed; the
//! calling operation always proceeds with whatever the overlay already has.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{self, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;

use super::{RegenError, Regeneration, Regenerator};
use crate::fs::path::{normalize_path, relative};

/// How the gate decides that a path needs regenerating.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum StalenessPolicy {
    /// Compare source and overlay modification times. Needs no state and
    /// survives restarts.
    #[default]
    Mtime,
    /// Remember when each path was last confirmed fresh.
    Record,
}

#[derive(Debug, Clone)]
pub struct GateOptions {
    pub policy: StalenessPolicy,
    /// Mirror source directories into the overlay on first access.
    pub precreate_dirs: bool,
    /// Write through a temporary file and rename it into place.
    pub atomic_writes: bool,
    /// Permission bits of materialized files.
    pub file_mode: u32,
    /// Upper bound for a single regenerator call.
    pub timeout: Option<Duration>,
    /// Normalized paths (and everything below them) the gate never touches.
    pub reserved: Vec<String>,
}

impl Default for GateOptions {
    fn default() -> Self {
        Self {
            policy: StalenessPolicy::Mtime,
            precreate_dirs: false,
            atomic_writes: true,
            file_mode: 0o644,
            timeout: None,
            reserved: Vec::new(),
        }
    }
}

/// Last confirmation time per path. Entries are never pruned; the map grows
/// with the set of paths that have been checked.
#[derive(Debug, Default)]
pub struct FreshnessRecord {
    stamps: HashMap<String, DateTime<Utc>>,
}

impl FreshnessRecord {
    pub fn get(&self, path: &str) -> Option<DateTime<Utc>> {
        self.stamps.get(path).copied()
    }

    fn stamp(&mut self, path: &str, at: DateTime<Utc>) {
        self.stamps.insert(path.to_string(), at);
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }
}

pub struct StalenessGate {
    source_root: PathBuf,
    overlay_root: PathBuf,
    regenerator: Option<Arc<dyn Regenerator>>,
    options: GateOptions,
    // Held for the whole check so no two regenerations overlap.
    record: Mutex<FreshnessRecord>,
}

impl StalenessGate {
    pub fn new(
        source_root: impl Into<PathBuf>,
        overlay_root: impl Into<PathBuf>,
        regenerator: Option<Arc<dyn Regenerator>>,
        options: GateOptions,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            overlay_root: overlay_root.into(),
            regenerator,
            options,
            record: Mutex::new(FreshnessRecord::default()),
        }
    }

    /// A gate without a regenerator does nothing at all.
    pub fn is_inert(&self) -> bool {
        self.regenerator.is_none()
    }

    pub fn options(&self) -> &GateOptions {
        &self.options
    }

    /// Number of paths currently held in the freshness record.
    pub async fn recorded_paths(&self) -> usize {
        self.record.lock().await.len()
    }

    fn is_reserved(&self, path: &str) -> bool {
        self.options.reserved.iter().any(|reserved| {
            path == reserved
                || path.strip_prefix(reserved.as_str()).is_some_and(|rest| rest.starts_with('/'))
        })
    }

    /// Bring the overlay copy of `path` up to date with its source.
    ///
    /// `op` names the filesystem operation that triggered the check and is
    /// only used for logging.
    pub async fn check_and_refresh(&self, op: &str, path: &str) {
        let Some(regenerator) = &self.regenerator else {
            return;
        };
        let path = match normalize_path(path) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(reason = op, path = %path, error = %e, "skipping freshness check");
                return;
            }
        };
        if self.is_reserved(&path) {
            return;
        }

        let mut record = self.record.lock().await;

        let source = self.source_root.join(relative(&path));
        let overlay = self.overlay_root.join(relative(&path));

        let source_meta = match tokio::fs::metadata(&source).await {
            Ok(meta) => meta,
            Err(_) => {
                self.propagate_deletion(op, &path, &overlay).await;
                return;
            }
        };

        if source_meta.is_dir() {
            if self.options.precreate_dirs {
                self.precreate_dir(&path, &overlay, &source_meta).await;
            }
            return;
        }

        let source_mtime = match source_meta.modified() {
            Ok(mtime) => mtime,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "source has no modification time");
                return;
            }
        };

        if !self.is_stale(&record, &path, source_mtime, &overlay).await {
            tracing::trace!(reason = op, path = %path, "overlay is fresh");
            return;
        }

        tracing::debug!(reason = op, path = %path, "about to regenerate file");
        let outcome = match self.options.timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, regenerator.regenerate(&source)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(RegenError::TimedOut(limit)),
                }
            }
            None => regenerator.regenerate(&source).await,
        };

        match outcome {
            Err(e) => {
                tracing::error!(reason = op, path = %path, error = %e, "failed to regenerate file");
            }
            Ok(Regeneration::Unchanged) => {
                tracing::debug!(path = %path, "no regeneration needed");
                if self.options.policy == StalenessPolicy::Record {
                    record.stamp(&path, Utc::now());
                }
            }
            Ok(Regeneration::Updated(content)) => {
                let bytes = content.len();
                let mode = self.options.file_mode;
                let atomic = self.options.atomic_writes;
                let dest = overlay.clone();
                let written = tokio::task::spawn_blocking(move || {
                    write_overlay(&dest, &content, mode, source_mtime, atomic)
                })
                .await
                .map_err(io::Error::other)
                .and_then(|result| result);

                match written {
                    Ok(()) => {
                        tracing::info!(reason = op, path = %path, bytes, "regenerated file");
                        if self.options.policy == StalenessPolicy::Record {
                            record.stamp(&path, Utc::now());
                        }
                    }
                    Err(e) => {
                        tracing::error!(path = %path, error = %e, "failed to write regenerated file");
                    }
                }
            }
        }
    }

    async fn is_stale(
        &self,
        record: &FreshnessRecord,
        path: &str,
        source_mtime: SystemTime,
        overlay: &Path,
    ) -> bool {
        match self.options.policy {
            StalenessPolicy::Record => match record.get(path) {
                Some(confirmed) => DateTime::<Utc>::from(source_mtime) > confirmed,
                None => true,
            },
            StalenessPolicy::Mtime => {
                match tokio::fs::symlink_metadata(overlay).await.and_then(|m| m.modified()) {
                    Ok(overlay_mtime) => overlay_mtime < source_mtime,
                    Err(_) => true,
                }
            }
        }
    }

    async fn propagate_deletion(&self, op: &str, path: &str, overlay: &Path) {
        if path == "/" {
            return;
        }
        let meta = match tokio::fs::symlink_metadata(overlay).await {
            Ok(meta) => meta,
            Err(_) => return,
        };
        let removed = if meta.is_dir() {
            tokio::fs::remove_dir_all(overlay).await
        } else {
            tokio::fs::remove_file(overlay).await
        };
        match removed {
            Ok(()) => {
                tracing::info!(reason = op, path = %path, "removed overlay entry for deleted source")
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::error!(path = %path, error = %e, "failed to remove overlay entry")
            }
        }
    }

    async fn precreate_dir(&self, path: &str, overlay: &Path, source_meta: &std::fs::Metadata) {
        if tokio::fs::symlink_metadata(overlay).await.is_ok() {
            return;
        }
        let mode = source_meta.permissions().mode() & 0o7777;
        match tokio::fs::DirBuilder::new().recursive(true).mode(mode).create(overlay).await {
            Ok(()) => tracing::debug!(path = %path, "created overlay directory"),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => tracing::error!(path = %path, error = %e, "failed to create overlay directory"),
        }
    }
}

fn write_overlay(
    dest: &Path,
    content: &[u8],
    mode: u32,
    mtime: SystemTime,
    atomic: bool,
) -> io::Result<()> {
    let parent = dest
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "overlay path has no parent"))?;
    match std::fs::create_dir_all(parent) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
        Err(e) => return Err(e),
    }

    if !atomic {
        return write_with_mtime(dest, content, mode, mtime);
    }

    let name = dest.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let tmp = parent.join(format!(".{}.regen-{}", name, uuid::Uuid::new_v4()));
    let result = write_with_mtime(&tmp, content, mode, mtime).and_then(|()| std::fs::rename(&tmp, dest));
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

// The overlay takes the source's mtime so an unchanged source reads as fresh.
fn write_with_mtime(path: &Path, content: &[u8], mode: u32, mtime: SystemTime) -> io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)?;
    file.write_all(content)?;
    file.set_modified(mtime)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regen::{RegenResult, from_fn};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct Fixture {
        source: TempDir,
        overlay: TempDir,
        calls: Arc<AtomicUsize>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                source: tempfile::tempdir().unwrap(),
                overlay: tempfile::tempdir().unwrap(),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn appending(&self, suffix: &'static [u8]) -> Arc<dyn Regenerator> {
            let calls = self.calls.clone();
            Arc::new(from_fn(move |path: &Path| {
                calls.fetch_add(1, Ordering::SeqCst);
                let mut content = std::fs::read(path)?;
                content.extend_from_slice(suffix);
                Ok(Regeneration::Updated(content))
            }))
        }

        fn returning(&self, f: fn() -> RegenResult) -> Arc<dyn Regenerator> {
            let calls = self.calls.clone();
            Arc::new(from_fn(move |_: &Path| {
                calls.fetch_add(1, Ordering::SeqCst);
                f()
            }))
        }

        fn gate(&self, regenerator: Arc<dyn Regenerator>, options: GateOptions) -> StalenessGate {
            StalenessGate::new(self.source.path(), self.overlay.path(), Some(regenerator), options)
        }

        fn write_source(&self, rel: &str, content: &[u8], mtime: SystemTime) {
            let path = self.source.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, content).unwrap();
            set_mtime(&path, mtime);
        }

        fn overlay_file(&self, rel: &str) -> PathBuf {
            self.overlay.path().join(rel)
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn set_mtime(path: &Path, mtime: SystemTime) {
        std::fs::File::options().write(true).open(path).unwrap().set_modified(mtime).unwrap();
    }

    fn hours_ago(h: u64) -> SystemTime {
        SystemTime::now() - Duration::from_secs(h * 3600)
    }

    #[tokio::test]
    async fn test_regenerates_once_until_source_changes() {
        let fx = Fixture::new();
        let t1 = hours_ago(2);
        fx.write_source("a/b.txt", b"original", t1);
        let gate = fx.gate(fx.appending(b"X"), GateOptions::default());

        gate.check_and_refresh("stat", "/a/b.txt").await;
        assert_eq!(fx.calls(), 1);
        assert_eq!(std::fs::read(fx.overlay_file("a/b.txt")).unwrap(), b"originalX");
        assert_eq!(std::fs::metadata(fx.overlay_file("a/b.txt")).unwrap().modified().unwrap(), t1);

        gate.check_and_refresh("stat", "/a/b.txt").await;
        assert_eq!(fx.calls(), 1);

        fx.write_source("a/b.txt", b"rewritten", hours_ago(1));
        gate.check_and_refresh("stat", "/a/b.txt").await;
        assert_eq!(fx.calls(), 2);
        assert_eq!(std::fs::read(fx.overlay_file("a/b.txt")).unwrap(), b"rewrittenX");
    }

    #[tokio::test]
    async fn test_record_policy_regenerates_once_until_source_changes() {
        let fx = Fixture::new();
        fx.write_source("a/b.txt", b"original", hours_ago(2));
        let options = GateOptions { policy: StalenessPolicy::Record, ..Default::default() };
        let gate = fx.gate(fx.appending(b"X"), options);

        gate.check_and_refresh("stat", "/a/b.txt").await;
        gate.check_and_refresh("stat", "/a/b.txt").await;
        assert_eq!(fx.calls(), 1);
        assert_eq!(gate.recorded_paths().await, 1);
        assert_eq!(std::fs::read(fx.overlay_file("a/b.txt")).unwrap(), b"originalX");

        // record stamps use the wall clock, so the new mtime has to be later than now
        fx.write_source("a/b.txt", b"rewritten", SystemTime::now() + Duration::from_secs(60));
        gate.check_and_refresh("stat", "/a/b.txt").await;
        assert_eq!(fx.calls(), 2);
    }

    #[tokio::test]
    async fn test_unchanged_leaves_overlay_untouched() {
        let fx = Fixture::new();
        fx.write_source("f.txt", b"source", hours_ago(1));
        std::fs::write(fx.overlay_file("f.txt"), b"user edit").unwrap();
        set_mtime(&fx.overlay_file("f.txt"), hours_ago(3));
        let gate = fx.gate(fx.returning(|| Ok(Regeneration::Unchanged)), GateOptions::default());

        gate.check_and_refresh("open", "/f.txt").await;
        assert_eq!(fx.calls(), 1);
        assert_eq!(std::fs::read(fx.overlay_file("f.txt")).unwrap(), b"user edit");

        // mtime policy keeps asking until something changes
        gate.check_and_refresh("open", "/f.txt").await;
        assert_eq!(fx.calls(), 2);
    }

    #[tokio::test]
    async fn test_unchanged_is_sticky_under_record_policy() {
        let fx = Fixture::new();
        fx.write_source("f.txt", b"source", hours_ago(1));
        let options = GateOptions { policy: StalenessPolicy::Record, ..Default::default() };
        let gate = fx.gate(fx.returning(|| Ok(Regeneration::Unchanged)), options);

        gate.check_and_refresh("open", "/f.txt").await;
        gate.check_and_refresh("open", "/f.txt").await;
        assert_eq!(fx.calls(), 1);
        assert!(!fx.overlay_file("f.txt").exists());
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_overlay() {
        let fx = Fixture::new();
        fx.write_source("f.txt", b"source", hours_ago(1));
        std::fs::write(fx.overlay_file("f.txt"), b"last good").unwrap();
        set_mtime(&fx.overlay_file("f.txt"), hours_ago(3));
        let gate = fx.gate(
            fx.returning(|| Err(RegenError::Failed("compiler crashed".into()))),
            GateOptions::default(),
        );

        gate.check_and_refresh("open", "/f.txt").await;
        assert_eq!(std::fs::read(fx.overlay_file("f.txt")).unwrap(), b"last good");

        gate.check_and_refresh("open", "/f.txt").await;
        assert_eq!(fx.calls(), 2);
    }

    struct SlowRegenerator;

    #[async_trait::async_trait]
    impl Regenerator for SlowRegenerator {
        async fn regenerate(&self, _source: &Path) -> RegenResult {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Regeneration::Updated(b"late".to_vec()))
        }
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let fx = Fixture::new();
        fx.write_source("f.txt", b"source", hours_ago(1));
        let options =
            GateOptions { timeout: Some(Duration::from_millis(20)), ..Default::default() };
        let gate = fx.gate(Arc::new(SlowRegenerator), options);

        gate.check_and_refresh("open", "/f.txt").await;
        assert!(!fx.overlay_file("f.txt").exists());
    }

    #[tokio::test]
    async fn test_timeout_applies_to_blocking_closure() {
        let fx = Fixture::new();
        fx.write_source("f.txt", b"source", hours_ago(1));
        let calls = fx.calls.clone();
        let regenerator: Arc<dyn Regenerator> = Arc::new(from_fn(move |_: &Path| {
            calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(400));
            Ok(Regeneration::Updated(b"late".to_vec()))
        }));
        let options =
            GateOptions { timeout: Some(Duration::from_millis(50)), ..Default::default() };
        let gate = fx.gate(regenerator, options);

        let started = std::time::Instant::now();
        gate.check_and_refresh("open", "/f.txt").await;
        assert!(started.elapsed() < Duration::from_millis(350));
        assert!(!fx.overlay_file("f.txt").exists());

        // the abandoned call finishing later must not write anything
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(fx.calls(), 1);
        assert!(!fx.overlay_file("f.txt").exists());
    }

    #[tokio::test]
    async fn test_deleted_source_removes_overlay_file() {
        let fx = Fixture::new();
        std::fs::write(fx.overlay_file("stale.txt"), b"old").unwrap();
        let gate = fx.gate(fx.appending(b"X"), GateOptions::default());

        gate.check_and_refresh("stat", "/stale.txt").await;
        assert!(!fx.overlay_file("stale.txt").exists());
        assert_eq!(fx.calls(), 0);

        // idempotent
        gate.check_and_refresh("stat", "/stale.txt").await;
        assert!(!fx.overlay_file("stale.txt").exists());
    }

    #[tokio::test]
    async fn test_deleted_source_removes_overlay_directory() {
        let fx = Fixture::new();
        std::fs::create_dir_all(fx.overlay_file("a/nested")).unwrap();
        std::fs::write(fx.overlay_file("a/nested/file.txt"), b"old").unwrap();
        let gate = fx.gate(fx.appending(b"X"), GateOptions::default());

        gate.check_and_refresh("stat", "/a").await;
        assert!(!fx.overlay_file("a").exists());
    }

    #[tokio::test]
    async fn test_source_directory_is_not_regenerated() {
        let fx = Fixture::new();
        std::fs::create_dir(fx.source.path().join("dir")).unwrap();
        let gate = fx.gate(fx.appending(b"X"), GateOptions::default());

        gate.check_and_refresh("readdir", "/dir").await;
        assert_eq!(fx.calls(), 0);
        assert!(!fx.overlay_file("dir").exists());
    }

    #[tokio::test]
    async fn test_precreate_dirs() {
        let fx = Fixture::new();
        std::fs::create_dir_all(fx.source.path().join("x/y")).unwrap();
        let options = GateOptions { precreate_dirs: true, ..Default::default() };
        let gate = fx.gate(fx.appending(b"X"), options);

        gate.check_and_refresh("stat", "/x/y").await;
        assert!(fx.overlay_file("x/y").is_dir());
        assert_eq!(fx.calls(), 0);
    }

    #[tokio::test]
    async fn test_inert_without_regenerator() {
        let fx = Fixture::new();
        std::fs::write(fx.overlay_file("orphan"), b"kept").unwrap();
        let gate =
            StalenessGate::new(fx.source.path(), fx.overlay.path(), None, GateOptions::default());

        assert!(gate.is_inert());
        gate.check_and_refresh("stat", "/orphan").await;
        assert!(fx.overlay_file("orphan").exists());
    }

    #[tokio::test]
    async fn test_reserved_paths_are_skipped() {
        let fx = Fixture::new();
        std::fs::create_dir(fx.overlay_file(".markers")).unwrap();
        std::fs::write(fx.overlay_file(".markers/m"), b"/x").unwrap();
        let options = GateOptions { reserved: vec!["/.markers".to_string()], ..Default::default() };
        let gate = fx.gate(fx.appending(b"X"), options);

        gate.check_and_refresh("stat", "/.markers/m").await;
        gate.check_and_refresh("stat", "/.markers").await;
        assert!(fx.overlay_file(".markers/m").exists());
    }

    #[tokio::test]
    async fn test_root_is_never_removed() {
        let fx = Fixture::new();
        let gate = StalenessGate::new(
            fx.source.path().join("missing"),
            fx.overlay.path(),
            Some(fx.appending(b"X")),
            GateOptions::default(),
        );
        gate.check_and_refresh("statfs", "/").await;
        assert!(fx.overlay.path().is_dir());
    }

    #[tokio::test]
    async fn test_file_mode_and_direct_writes() {
        let fx = Fixture::new();
        fx.write_source("m.txt", b"m", hours_ago(1));
        let options = GateOptions { file_mode: 0o600, atomic_writes: false, ..Default::default() };
        let gate = fx.gate(fx.appending(b"!"), options);

        gate.check_and_refresh("open", "/m.txt").await;
        let meta = std::fs::metadata(fx.overlay_file("m.txt")).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
        assert_eq!(std::fs::read(fx.overlay_file("m.txt")).unwrap(), b"m!");
    }

    #[tokio::test]
    async fn test_atomic_write_leaves_no_temporaries() {
        let fx = Fixture::new();
        fx.write_source("d/t.txt", b"t", hours_ago(1));
        let gate = fx.gate(fx.appending(b"!"), GateOptions::default());

        gate.check_and_refresh("open", "/d/t.txt").await;
        let names: Vec<_> = std::fs::read_dir(fx.overlay_file("d"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["t.txt".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checks_regenerate_once() {
        let fx = Fixture::new();
        fx.write_source("hot.txt", b"hot", hours_ago(1));
        let gate = Arc::new(fx.gate(fx.appending(b"X"), GateOptions::default()));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let gate = gate.clone();
            handles.push(tokio::spawn(async move {
                gate.check_and_refresh("stat", "/hot.txt").await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(fx.calls(), 1);
        assert_eq!(std::fs::read(fx.overlay_file("hot.txt")).unwrap(), b"hotX");
    }

    #[test]
    fn test_policy_serde_names() {
        assert_eq!(serde_json::to_string(&StalenessPolicy::Mtime).unwrap(), "\"mtime\"");
        let policy: StalenessPolicy = serde_json::from_str("\"record\"").unwrap();
        assert_eq!(policy, StalenessPolicy::Record);
    }
}
