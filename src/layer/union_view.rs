//! Union view module.
//!
//! Presents a read-only source directory and a writable overlay directory as
//! one namespace. Overlay entries shadow source entries, deletions of source
//! entries are recorded as markers in the overlay, and the source tree is
//! never written.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::future::Future;
use std::os::unix::fs::{FileExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use crate::fs::path::{ancestors, join, normalize_path, relative, split_path};
use crate::fs::{FsError, FsResult, blocking};
use crate::fuse::interface::{DirEntry, FileAttr, FileType, FilesystemInterface, StatFs};
use crate::layer::deletions::{DEFAULT_DELETION_DIRNAME, DeletionStore};
use crate::layer::xattr;

/// Which tree an entry was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Overlay,
    Source,
}

/// Represents the state of a path in the union view.
#[derive(Debug)]
pub enum FileState {
    /// Entry exists; `real_path` is where it lives on the host.
    Exists { branch: Branch, real_path: PathBuf, metadata: std::fs::Metadata },
    /// Entry exists in the source but was deleted through the union view.
    Deleted,
    /// Entry does not exist in either tree.
    NotFound,
}

impl FileState {
    /// Returns true if the entry exists.
    pub fn exists(&self) -> bool {
        matches!(self, FileState::Exists { .. })
    }

    /// Returns the branch the entry was found in.
    pub fn branch(&self) -> Option<Branch> {
        match self {
            FileState::Exists { branch, .. } => Some(*branch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UnionOptions {
    /// Name of the reserved marker directory at the overlay root.
    pub deletion_dirname: String,
    /// How long marker lookups stay cached.
    pub deletion_cache_ttl: Duration,
}

impl Default for UnionOptions {
    fn default() -> Self {
        Self {
            deletion_dirname: DEFAULT_DELETION_DIRNAME.to_string(),
            deletion_cache_ttl: Duration::from_secs(5),
        }
    }
}

/// Union view over a source tree and an overlay tree.
pub struct UnionView {
    source_root: PathBuf,
    overlay_root: PathBuf,
    reserved: String,
    deletions: DeletionStore,
    debug: AtomicBool,
}

impl UnionView {
    pub fn new(
        source_root: impl Into<PathBuf>,
        overlay_root: impl Into<PathBuf>,
        options: UnionOptions,
    ) -> Self {
        let source_root = source_root.into();
        let overlay_root = overlay_root.into();
        let deletions = DeletionStore::new(
            &overlay_root,
            &options.deletion_dirname,
            options.deletion_cache_ttl,
        );
        Self {
            source_root,
            overlay_root,
            reserved: format!("/{}", options.deletion_dirname),
            deletions,
            debug: AtomicBool::new(false),
        }
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn overlay_root(&self) -> &Path {
        &self.overlay_root
    }

    /// Mount-relative path of the marker directory, hidden from the namespace.
    pub fn reserved_path(&self) -> &str {
        &self.reserved
    }

    pub fn source_path(&self, path: &str) -> PathBuf {
        self.source_root.join(relative(path))
    }

    pub fn overlay_path(&self, path: &str) -> PathBuf {
        self.overlay_root.join(relative(path))
    }

    fn is_reserved(&self, path: &str) -> bool {
        path == self.reserved
            || path.strip_prefix(self.reserved.as_str()).is_some_and(|rest| rest.starts_with('/'))
    }

    fn trace_op(&self, op: &str, path: &str) {
        if self.debug.load(Ordering::Relaxed) {
            tracing::debug!(op, path = %path, "union view operation");
        }
    }

    /// Lookup a normalized path in the union view.
    ///
    /// A marker on the path or an ancestor hides both trees; otherwise the
    /// overlay wins over the source.
    pub async fn lookup(&self, path: &str) -> FsResult<FileState> {
        if self.is_reserved(path) {
            return Ok(FileState::NotFound);
        }

        if path != "/" && self.deletions.is_deleted(path).await {
            return Ok(FileState::Deleted);
        }

        let overlay = self.overlay_path(path);
        match tokio::fs::symlink_metadata(&overlay).await {
            Ok(metadata) => {
                return Ok(FileState::Exists {
                    branch: Branch::Overlay,
                    real_path: overlay,
                    metadata,
                });
            }
            Err(e) if is_missing(&e) => {}
            Err(e) => return Err(e.into()),
        }

        let source = self.source_path(path);
        match tokio::fs::symlink_metadata(&source).await {
            Ok(metadata) => {
                Ok(FileState::Exists { branch: Branch::Source, real_path: source, metadata })
            }
            Err(e) if is_missing(&e) => Ok(FileState::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    async fn resolve(&self, path: &str) -> FsResult<(PathBuf, std::fs::Metadata)> {
        match self.lookup(path).await? {
            FileState::Exists { real_path, metadata, .. } => Ok((real_path, metadata)),
            FileState::Deleted | FileState::NotFound => Err(FsError::PathNotFound(path.into())),
        }
    }

    async fn source_has(&self, path: &str) -> bool {
        tokio::fs::symlink_metadata(self.source_path(path)).await.is_ok()
    }

    /// Fail unless the parent of `path` is an existing directory.
    async fn require_parent_dir(&self, path: &str) -> FsResult<()> {
        let (parent, _) = split_path(path)?;
        let (_, metadata) = self.resolve(&parent).await?;
        if !metadata.is_dir() {
            return Err(FsError::NotDirectory(parent));
        }
        Ok(())
    }

    /// Make sure every ancestor directory of `path` exists in the overlay.
    async fn promote_parent(&self, path: &str) -> FsResult<()> {
        let mut dirs = ancestors(path);
        dirs.reverse();
        for dir in dirs {
            let dest = self.overlay_path(dir);
            if tokio::fs::symlink_metadata(&dest).await.is_ok() {
                continue;
            }
            let mode = match tokio::fs::metadata(self.source_path(dir)).await {
                Ok(meta) => meta.permissions().mode() & 0o7777,
                Err(_) => 0o755,
            };
            match tokio::fs::DirBuilder::new().mode(mode).create(&dest).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Copy an existing entry into the overlay if it only lives in the source.
    /// Returns the overlay path.
    pub async fn promote(&self, path: &str) -> FsResult<PathBuf> {
        match self.lookup(path).await? {
            FileState::Exists { branch: Branch::Overlay, real_path, .. } => Ok(real_path),
            FileState::Exists { branch: Branch::Source, real_path, metadata } => {
                self.promote_parent(path).await?;
                let dest = self.overlay_path(path);
                copy_entry(&real_path, &dest, &metadata).await?;
                tracing::debug!(path = %path, "copied entry up into overlay");
                Ok(dest)
            }
            FileState::Deleted | FileState::NotFound => Err(FsError::PathNotFound(path.into())),
        }
    }

    /// Promote an entry and, for directories, everything visible below it.
    fn promote_tree<'a>(
        &'a self,
        path: &'a str,
    ) -> Pin<Box<dyn Future<Output = FsResult<PathBuf>> + Send + 'a>> {
        Box::pin(async move {
            let dest = self.promote(path).await?;
            if tokio::fs::symlink_metadata(&dest).await?.is_dir() {
                for entry in self.list_merged(path).await? {
                    let child = join(path, &entry.name);
                    self.promote_tree(&child).await?;
                }
            }
            Ok(dest)
        })
    }

    /// Mark every source child of a directory deleted so a recreated
    /// directory starts out empty.
    async fn hide_source_children(&self, path: &str) -> FsResult<()> {
        let source = self.source_path(path);
        let mut entries = match tokio::fs::read_dir(&source).await {
            Ok(entries) => entries,
            Err(_) => return Ok(()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let child = join(path, &name);
            if tokio::fs::symlink_metadata(self.overlay_path(&child)).await.is_ok() {
                continue;
            }
            self.deletions.mark(&child).await?;
        }
        Ok(())
    }

    /// Remove what a deleted path left behind in the overlay before the name
    /// is reused. Regeneration can write content under a marker.
    async fn discard_hidden(&self, path: &str) -> FsResult<()> {
        let dest = self.overlay_path(path);
        let removed = match tokio::fs::symlink_metadata(&dest).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&dest).await,
            Ok(_) => tokio::fs::remove_file(&dest).await,
            Err(_) => return Ok(()),
        };
        match removed {
            Ok(()) => {
                tracing::debug!(path = %path, "discarded hidden overlay entry");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Fail if `path` is visible, otherwise clear the way for a new entry.
    /// Returns whether the name was deleted before.
    async fn claim_name(&self, path: &str) -> FsResult<bool> {
        match self.lookup(path).await? {
            FileState::Exists { .. } => Err(FsError::AlreadyExists(path.to_string())),
            FileState::Deleted => {
                self.discard_hidden(path).await?;
                Ok(true)
            }
            FileState::NotFound => Ok(false),
        }
    }

    async fn list_merged(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        let (real_path, metadata) = self.resolve(path).await?;
        if !metadata.is_dir() {
            return Err(FsError::NotDirectory(path.into()));
        }

        let mut merged: BTreeMap<String, DirEntry> = BTreeMap::new();

        let overlay = self.overlay_path(path);
        let overlay_is_dir = real_path == overlay;
        if overlay_is_dir {
            let mut entries = tokio::fs::read_dir(&overlay).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                let child = join(path, &name);
                if self.is_reserved(&child) || self.deletions.is_deleted(&child).await {
                    continue;
                }
                let kind = FileType::from_std(entry.file_type().await?);
                merged.insert(name.clone(), DirEntry { inode: entry.ino(), name, kind });
            }
        }

        let source = self.source_path(path);
        if let Ok(mut entries) = tokio::fs::read_dir(&source).await {
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                if merged.contains_key(&name) {
                    continue;
                }
                let child = join(path, &name);
                if self.is_reserved(&child) || self.deletions.is_deleted(&child).await {
                    continue;
                }
                let kind = FileType::from_std(entry.file_type().await?);
                merged.insert(name.clone(), DirEntry { inode: entry.ino(), name, kind });
            }
        }

        Ok(merged.into_values().collect())
    }
}

async fn copy_entry(src: &Path, dest: &Path, metadata: &std::fs::Metadata) -> FsResult<()> {
    let file_type = metadata.file_type();
    if file_type.is_dir() {
        let mode = metadata.permissions().mode() & 0o7777;
        match tokio::fs::DirBuilder::new().mode(mode).create(dest).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e.into()),
        }
    } else if file_type.is_symlink() {
        let target = tokio::fs::read_link(src).await?;
        tokio::fs::symlink(target, dest).await?;
        Ok(())
    } else if file_type.is_file() {
        tokio::fs::copy(src, dest).await?;
        // keep the source timestamps so a copy never looks newer than its origin
        let atime = metadata.accessed().ok();
        let mtime = metadata.modified().ok();
        let dest = dest.to_path_buf();
        blocking(move || set_times(&dest, atime, mtime)).await
    } else {
        Err(FsError::NotSupported(format!("Cannot copy special file {}", src.display())))
    }
}

pub(crate) fn set_times(
    path: &Path,
    atime: Option<SystemTime>,
    mtime: Option<SystemTime>,
) -> FsResult<()> {
    let mut times = std::fs::FileTimes::new();
    if let Some(atime) = atime {
        times = times.set_accessed(atime);
    }
    if let Some(mtime) = mtime {
        times = times.set_modified(mtime);
    }
    std::fs::File::open(path)?.set_times(times)?;
    Ok(())
}

// A file standing where a directory component should be hides everything below it.
fn is_missing(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::NotFound || e.raw_os_error() == Some(libc::ENOTDIR)
}

fn write_flags(flags: i32) -> bool {
    (flags & libc::O_ACCMODE) != libc::O_RDONLY || (flags & libc::O_TRUNC) != 0
}

#[async_trait::async_trait]
impl FilesystemInterface for UnionView {
    async fn get_attr(&self, path: &str) -> FsResult<FileAttr> {
        let path = normalize_path(path)?;
        self.trace_op("get_attr", &path);
        let (_, metadata) = self.resolve(&path).await?;
        Ok(FileAttr::from_metadata(&metadata))
    }

    async fn access(&self, path: &str, mask: i32) -> FsResult<()> {
        let path = normalize_path(path)?;
        self.trace_op("access", &path);
        let (real_path, _) = self.resolve(&path).await?;
        blocking(move || {
            nix::unistd::access(&real_path, nix::unistd::AccessFlags::from_bits_truncate(mask))?;
            Ok(())
        })
        .await
    }

    async fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        let path = normalize_path(path)?;
        self.trace_op("chmod", &path);
        let real_path = self.promote(&path).await?;
        tokio::fs::set_permissions(&real_path, std::fs::Permissions::from_mode(mode & 0o7777))
            .await?;
        Ok(())
    }

    async fn chown(&self, path: &str, uid: Option<u32>, gid: Option<u32>) -> FsResult<()> {
        let path = normalize_path(path)?;
        self.trace_op("chown", &path);
        let real_path = self.promote(&path).await?;
        blocking(move || {
            std::os::unix::fs::lchown(&real_path, uid, gid)?;
            Ok(())
        })
        .await
    }

    async fn truncate(&self, path: &str, size: u64) -> FsResult<()> {
        let path = normalize_path(path)?;
        self.trace_op("truncate", &path);
        let real_path = self.promote(&path).await?;
        let file = tokio::fs::OpenOptions::new().write(true).open(&real_path).await?;
        file.set_len(size).await?;
        Ok(())
    }

    async fn utimens(
        &self,
        path: &str,
        atime: Option<DateTime<Utc>>,
        mtime: Option<DateTime<Utc>>,
    ) -> FsResult<()> {
        let path = normalize_path(path)?;
        self.trace_op("utimens", &path);
        let real_path = self.promote(&path).await?;
        let atime = atime.map(SystemTime::from);
        let mtime = mtime.map(SystemTime::from);
        blocking(move || set_times(&real_path, atime, mtime)).await
    }

    async fn open(&self, path: &str, flags: i32) -> FsResult<()> {
        let path = normalize_path(path)?;
        self.trace_op("open", &path);
        let (_, metadata) = self.resolve(&path).await?;
        if !write_flags(flags) {
            return Ok(());
        }
        if metadata.is_dir() {
            return Err(FsError::IsDirectory(path));
        }
        let real_path = self.promote(&path).await?;
        if flags & libc::O_TRUNC != 0 {
            let file = tokio::fs::OpenOptions::new().write(true).open(&real_path).await?;
            file.set_len(0).await?;
        }
        Ok(())
    }

    async fn create(&self, path: &str, flags: i32, mode: u32) -> FsResult<FileAttr> {
        let path = normalize_path(path)?;
        self.trace_op("create", &path);
        self.require_parent_dir(&path).await?;

        match self.lookup(&path).await? {
            FileState::Exists { metadata, .. } => {
                if flags & libc::O_EXCL != 0 {
                    return Err(FsError::AlreadyExists(path));
                }
                if metadata.is_dir() {
                    return Err(FsError::IsDirectory(path));
                }
                let real_path = self.promote(&path).await?;
                if flags & libc::O_TRUNC != 0 {
                    let file = tokio::fs::OpenOptions::new().write(true).open(&real_path).await?;
                    file.set_len(0).await?;
                }
            }
            state => {
                if matches!(state, FileState::Deleted) {
                    self.discard_hidden(&path).await?;
                }
                self.promote_parent(&path).await?;
                tokio::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .mode(mode & 0o7777)
                    .open(self.overlay_path(&path))
                    .await?;
                self.deletions.clear(&path).await?;
            }
        }
        self.get_attr(&path).await
    }

    async fn mknod(&self, path: &str, mode: u32, rdev: u32) -> FsResult<FileAttr> {
        let path = normalize_path(path)?;
        self.trace_op("mknod", &path);
        self.require_parent_dir(&path).await?;
        self.claim_name(&path).await?;
        self.promote_parent(&path).await?;
        let dest = self.overlay_path(&path);
        blocking(move || {
            let kind = nix::sys::stat::SFlag::from_bits_truncate(
                mode as libc::mode_t & libc::S_IFMT,
            );
            let perm = nix::sys::stat::Mode::from_bits_truncate((mode & 0o7777) as libc::mode_t);
            nix::sys::stat::mknod(&dest, kind, perm, rdev as libc::dev_t)?;
            Ok(())
        })
        .await?;
        self.deletions.clear(&path).await?;
        self.get_attr(&path).await
    }

    async fn unlink(&self, path: &str) -> FsResult<()> {
        let path = normalize_path(path)?;
        self.trace_op("unlink", &path);
        match self.lookup(&path).await? {
            FileState::Exists { metadata, .. } if metadata.is_dir() => {
                Err(FsError::IsDirectory(path))
            }
            FileState::Exists { branch, real_path, .. } => {
                if branch == Branch::Overlay {
                    tokio::fs::remove_file(&real_path).await?;
                }
                if self.source_has(&path).await {
                    self.deletions.mark(&path).await?;
                }
                Ok(())
            }
            FileState::Deleted | FileState::NotFound => Err(FsError::PathNotFound(path)),
        }
    }

    async fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        let from = normalize_path(from)?;
        let to = normalize_path(to)?;
        self.trace_op("rename", &from);
        if from == "/" || to == "/" {
            return Err(FsError::InvalidPath("Cannot rename the root".to_string()));
        }

        let (_, from_meta) = self.resolve(&from).await?;
        self.require_parent_dir(&to).await?;
        if from == to {
            return Ok(());
        }
        match self.lookup(&to).await? {
            FileState::Exists { metadata: to_meta, .. } => {
                if from_meta.is_dir() && !to_meta.is_dir() {
                    return Err(FsError::NotDirectory(to));
                }
                if !from_meta.is_dir() && to_meta.is_dir() {
                    return Err(FsError::IsDirectory(to));
                }
                if to_meta.is_dir() && !self.list_merged(&to).await?.is_empty() {
                    return Err(FsError::DirectoryNotEmpty(to));
                }
            }
            FileState::Deleted => self.discard_hidden(&to).await?,
            FileState::NotFound => {}
        }

        let src = self.promote_tree(&from).await?;
        self.promote_parent(&to).await?;
        tokio::fs::rename(&src, self.overlay_path(&to)).await?;

        if self.source_has(&from).await {
            self.deletions.mark(&from).await?;
        }
        if from_meta.is_dir() {
            // markers left under the destination would hide the moved entries
            self.deletions.clear_tree(&to).await?;
            self.hide_source_children(&to).await?;
        } else {
            self.deletions.clear(&to).await?;
        }
        Ok(())
    }

    async fn link(&self, orig: &str, new_path: &str) -> FsResult<FileAttr> {
        let orig = normalize_path(orig)?;
        let new_path = normalize_path(new_path)?;
        self.trace_op("link", &orig);
        self.require_parent_dir(&new_path).await?;
        self.claim_name(&new_path).await?;
        let src = self.promote(&orig).await?;
        self.promote_parent(&new_path).await?;
        tokio::fs::hard_link(&src, self.overlay_path(&new_path)).await?;
        self.deletions.clear(&new_path).await?;
        self.get_attr(&new_path).await
    }

    async fn read_file(&self, path: &str, offset: u64, size: u32) -> FsResult<Vec<u8>> {
        let path = normalize_path(path)?;
        let (real_path, _) = self.resolve(&path).await?;
        blocking(move || {
            let file = std::fs::File::open(&real_path)?;
            let mut buf = vec![0u8; size as usize];
            let mut filled = 0;
            while filled < buf.len() {
                let n = file.read_at(&mut buf[filled..], offset + filled as u64)?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            buf.truncate(filled);
            Ok(buf)
        })
        .await
    }

    async fn write_file(&self, path: &str, offset: u64, data: &[u8]) -> FsResult<u32> {
        let path = normalize_path(path)?;
        let real_path = self.promote(&path).await?;
        let data = data.to_vec();
        blocking(move || {
            let file = std::fs::OpenOptions::new().write(true).open(&real_path)?;
            file.write_all_at(&data, offset)?;
            Ok(data.len() as u32)
        })
        .await
    }

    async fn create_dir(&self, path: &str, mode: u32) -> FsResult<FileAttr> {
        let path = normalize_path(path)?;
        self.trace_op("create_dir", &path);
        self.require_parent_dir(&path).await?;
        let deleted = self.claim_name(&path).await?;
        self.promote_parent(&path).await?;
        tokio::fs::DirBuilder::new().mode(mode & 0o7777).create(self.overlay_path(&path)).await?;
        if deleted {
            self.hide_source_children(&path).await?;
        }
        self.deletions.clear(&path).await?;
        self.get_attr(&path).await
    }

    async fn read_dir(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        let path = normalize_path(path)?;
        self.trace_op("read_dir", &path);
        self.list_merged(&path).await
    }

    async fn remove_dir(&self, path: &str) -> FsResult<()> {
        let path = normalize_path(path)?;
        self.trace_op("remove_dir", &path);
        if path == "/" {
            return Err(FsError::PermissionDenied("Cannot remove the root".to_string()));
        }
        let (real_path, metadata) = self.resolve(&path).await?;
        if !metadata.is_dir() {
            return Err(FsError::NotDirectory(path));
        }
        if !self.list_merged(&path).await?.is_empty() {
            return Err(FsError::DirectoryNotEmpty(path));
        }
        if real_path == self.overlay_path(&path) {
            tokio::fs::remove_dir(&real_path).await?;
        }
        if self.source_has(&path).await {
            self.deletions.mark(&path).await?;
        }
        Ok(())
    }

    async fn create_symlink(&self, target: &Path, link: &str) -> FsResult<FileAttr> {
        let link = normalize_path(link)?;
        self.trace_op("create_symlink", &link);
        self.require_parent_dir(&link).await?;
        self.claim_name(&link).await?;
        self.promote_parent(&link).await?;
        tokio::fs::symlink(target, self.overlay_path(&link)).await?;
        self.deletions.clear(&link).await?;
        self.get_attr(&link).await
    }

    async fn read_symlink(&self, path: &str) -> FsResult<PathBuf> {
        let path = normalize_path(path)?;
        self.trace_op("read_symlink", &path);
        let (real_path, _) = self.resolve(&path).await?;
        Ok(tokio::fs::read_link(&real_path).await?)
    }

    async fn setxattr(&self, path: &str, name: &str, value: &[u8], flags: i32) -> FsResult<()> {
        let path = normalize_path(path)?;
        self.trace_op("setxattr", &path);
        let real_path = self.promote(&path).await?;
        let name = name.to_string();
        let value = value.to_vec();
        blocking(move || Ok(xattr::set(&real_path, &name, &value, flags)?)).await
    }

    async fn getxattr(&self, path: &str, name: &str) -> FsResult<Vec<u8>> {
        let path = normalize_path(path)?;
        self.trace_op("getxattr", &path);
        let (real_path, _) = self.resolve(&path).await?;
        let name = name.to_string();
        blocking(move || Ok(xattr::get(&real_path, &name)?)).await
    }

    async fn listxattr(&self, path: &str) -> FsResult<Vec<String>> {
        let path = normalize_path(path)?;
        self.trace_op("listxattr", &path);
        let (real_path, _) = self.resolve(&path).await?;
        blocking(move || Ok(xattr::list(&real_path)?)).await
    }

    async fn removexattr(&self, path: &str, name: &str) -> FsResult<()> {
        let path = normalize_path(path)?;
        self.trace_op("removexattr", &path);
        let real_path = self.promote(&path).await?;
        let name = name.to_string();
        blocking(move || Ok(xattr::remove(&real_path, &name)?)).await
    }

    async fn statfs(&self, path: &str) -> FsResult<StatFs> {
        self.trace_op("statfs", path);
        let root = self.overlay_root.clone();
        blocking(move || {
            let stats = nix::sys::statvfs::statvfs(&root)?;
            Ok(StatFs {
                blocks: stats.blocks() as u64,
                bfree: stats.blocks_free() as u64,
                bavail: stats.blocks_available() as u64,
                files: stats.files() as u64,
                ffree: stats.files_free() as u64,
                bsize: stats.block_size() as u32,
                namelen: stats.name_max() as u32,
                frsize: stats.fragment_size() as u32,
            })
        })
        .await
    }

    fn set_debug(&self, debug: bool) {
        self.debug.store(debug, Ordering::Relaxed);
    }

    fn name(&self) -> String {
        format!("union({}:{})", self.overlay_root.display(), self.source_root.display())
    }
}
