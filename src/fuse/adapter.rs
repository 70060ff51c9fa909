// FUSE adapter - bridges sync FUSE callbacks to async FilesystemInterface
//
// This adapter implements the fuser::Filesystem trait and delegates all operations
// to the async FilesystemInterface implementation. It handles:
// - Async to sync conversion using a dedicated tokio runtime
// - Inode to path mapping
// - FUSE types to FilesystemInterface types conversion
// - Error code translation
//
// The adapter owns its runtime. FUSE callbacks are synchronous and arrive on
// the session thread; calling block_on on a runtime the caller is already
// inside of would panic, so the session must never run inside one.

use super::interface::{FileAttr, FileType, FilesystemInterface, FsError, SetAttr};
use crate::fs::path::{join, split_path};
use fuser::{
    FileType as FuseFileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, ReplyXattr, Request, TimeOrNow,
};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::runtime::Runtime;

/// Default TTL for file attributes
pub const DEFAULT_ATTR_TTL: Duration = Duration::from_secs(1);

/// Default TTL for directory entries
pub const DEFAULT_ENTRY_TTL: Duration = Duration::from_secs(1);

/// FUSE adapter that bridges sync FUSE callbacks to async FilesystemInterface
pub struct FuseAdapter {
    backend: Arc<dyn FilesystemInterface>,

    /// Dedicated tokio runtime for async operations
    runtime: Arc<Runtime>,

    /// FUSE uses inodes, the backend uses paths
    inode_map: Arc<RwLock<InodeMap>>,

    entry_ttl: Duration,
    attr_ttl: Duration,
}

/// Manages inode <-> path bidirectional mapping
struct InodeMap {
    inode_to_path: HashMap<u64, String>,
    path_to_inode: HashMap<String, u64>,

    /// Next inode to allocate
    next_inode: u64,
}

impl InodeMap {
    fn new() -> Self {
        let mut map = Self {
            inode_to_path: HashMap::new(),
            path_to_inode: HashMap::new(),
            next_inode: 2, // 1 is reserved for root
        };

        map.insert(fuser::FUSE_ROOT_ID, "/".to_string());

        map
    }

    fn insert(&mut self, inode: u64, path: String) {
        self.inode_to_path.insert(inode, path.clone());
        self.path_to_inode.insert(path, inode);
    }

    fn get_or_create(&mut self, path: &str) -> u64 {
        if let Some(&inode) = self.path_to_inode.get(path) {
            return inode;
        }

        let inode = self.next_inode;
        self.next_inode += 1;
        self.insert(inode, path.to_string());
        inode
    }

    fn get_path(&self, inode: u64) -> Option<&str> {
        self.inode_to_path.get(&inode).map(|s| s.as_str())
    }

    fn get_inode(&self, path: &str) -> Option<u64> {
        self.path_to_inode.get(path).copied()
    }

    fn remove_path(&mut self, path: &str) {
        if let Some(inode) = self.path_to_inode.remove(path) {
            self.inode_to_path.remove(&inode);
        }
    }

    /// Re-key `from` and everything below it under `to`, keeping inode numbers.
    fn rename(&mut self, from: &str, to: &str) {
        self.remove_path(to);

        let prefix = format!("{}/", from.trim_end_matches('/'));
        let moved: Vec<(String, u64)> = self
            .path_to_inode
            .iter()
            .filter(|(path, _)| path.as_str() == from || path.starts_with(&prefix))
            .map(|(path, &inode)| (path.clone(), inode))
            .collect();

        for (old, inode) in moved {
            self.path_to_inode.remove(&old);
            let new = format!("{}{}", to, &old[from.len()..]);
            self.insert(inode, new);
        }
    }
}

impl FuseAdapter {
    /// Create a new FUSE adapter with a dedicated runtime
    pub fn new(backend: Arc<dyn FilesystemInterface>) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .thread_name("regenfs-fuse")
            .enable_all()
            .build()?;

        Ok(Self::with_runtime(backend, Arc::new(runtime)))
    }

    /// Create a new FUSE adapter with a provided runtime
    ///
    /// The runtime must not be the one driving the caller, see the module
    /// comment.
    pub fn with_runtime(backend: Arc<dyn FilesystemInterface>, runtime: Arc<Runtime>) -> Self {
        Self {
            backend,
            runtime,
            inode_map: Arc::new(RwLock::new(InodeMap::new())),
            entry_ttl: DEFAULT_ENTRY_TTL,
            attr_ttl: DEFAULT_ATTR_TTL,
        }
    }

    pub fn with_ttl(mut self, entry_ttl: Duration, attr_ttl: Duration) -> Self {
        self.entry_ttl = entry_ttl;
        self.attr_ttl = attr_ttl;
        self
    }

    fn get_path(&self, inode: u64) -> Result<String, libc::c_int> {
        let map = self.inode_map.read().unwrap_or_else(PoisonError::into_inner);
        map.get_path(inode).map(|s| s.to_string()).ok_or(libc::ENOENT)
    }

    fn child_path(&self, parent: u64, name: &OsStr) -> Result<String, libc::c_int> {
        let name = name.to_str().ok_or(libc::EINVAL)?;
        let parent_path = self.get_path(parent)?;
        Ok(join(&parent_path, name))
    }

    fn inode_for(&self, path: &str) -> u64 {
        let mut map = self.inode_map.write().unwrap_or_else(PoisonError::into_inner);
        map.get_or_create(path)
    }

    fn forget_path(&self, path: &str) {
        let mut map = self.inode_map.write().unwrap_or_else(PoisonError::into_inner);
        map.remove_path(path);
    }

    fn parent_inode(&self, path: &str, fallback: u64) -> u64 {
        let Ok((parent, _)) = split_path(path) else {
            return fallback;
        };
        let map = self.inode_map.read().unwrap_or_else(PoisonError::into_inner);
        map.get_inode(&parent).unwrap_or(fallback)
    }

    /// Execute async operation in tokio runtime
    fn block_on<F, T>(&self, future: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        self.runtime.block_on(future)
    }

    fn error_to_errno(error: FsError) -> libc::c_int {
        error.to_errno()
    }

    fn reply_entry(&self, path: &str, result: Result<FileAttr, FsError>, reply: ReplyEntry) {
        match result {
            Ok(mut attr) => {
                attr.inode = self.inode_for(path);
                reply.entry(&self.entry_ttl, &to_fuse_attr(&attr), 0);
            }
            Err(e) => reply.error(Self::error_to_errno(e)),
        }
    }

    fn reply_empty(result: Result<(), FsError>, reply: ReplyEmpty) {
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(Self::error_to_errno(e)),
        }
    }
}

fn to_fuse_kind(kind: FileType) -> FuseFileType {
    match kind {
        FileType::RegularFile => FuseFileType::RegularFile,
        FileType::Directory => FuseFileType::Directory,
        FileType::Symlink => FuseFileType::Symlink,
        FileType::NamedPipe => FuseFileType::NamedPipe,
        FileType::CharDevice => FuseFileType::CharDevice,
        FileType::BlockDevice => FuseFileType::BlockDevice,
        FileType::Socket => FuseFileType::Socket,
    }
}

/// Convert our FileAttr to fuser FileAttr
fn to_fuse_attr(attr: &FileAttr) -> fuser::FileAttr {
    fuser::FileAttr {
        ino: attr.inode,
        size: attr.size,
        blocks: attr.blocks,
        atime: datetime_to_systemtime(attr.atime),
        mtime: datetime_to_systemtime(attr.mtime),
        ctime: datetime_to_systemtime(attr.ctime),
        crtime: UNIX_EPOCH,
        kind: to_fuse_kind(attr.kind),
        perm: (attr.mode & 0o7777) as u16,
        nlink: attr.nlinks,
        uid: attr.uid,
        gid: attr.gid,
        rdev: attr.rdev,
        blksize: 4096,
        flags: 0,
    }
}

fn datetime_to_systemtime(dt: chrono::DateTime<chrono::Utc>) -> SystemTime {
    SystemTime::from(dt)
}

fn systemtime_to_datetime(st: SystemTime) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from(st)
}

fn time_or_now(time: TimeOrNow) -> chrono::DateTime<chrono::Utc> {
    match time {
        TimeOrNow::SpecificTime(st) => systemtime_to_datetime(st),
        TimeOrNow::Now => chrono::Utc::now(),
    }
}

impl Filesystem for FuseAdapter {
    fn init(
        &mut self,
        _req: &Request,
        _config: &mut fuser::KernelConfig,
    ) -> Result<(), libc::c_int> {
        tracing::info!(backend = %self.backend.name(), "FUSE filesystem initialized");
        Ok(())
    }

    fn destroy(&mut self) {
        tracing::info!("FUSE filesystem destroyed");
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let path = match self.child_path(parent, name) {
            Ok(p) => p,
            Err(e) => {
                reply.error(e);
                return;
            }
        };

        let result = self.block_on(self.backend.get_attr(&path));
        self.reply_entry(&path, result, reply);
    }

    fn getattr(&mut self, _req: &Request, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let path = match self.get_path(ino) {
            Ok(p) => p,
            Err(e) => {
                reply.error(e);
                return;
            }
        };

        match self.block_on(self.backend.get_attr(&path)) {
            Ok(mut attr) => {
                attr.inode = ino;
                reply.attr(&self.attr_ttl, &to_fuse_attr(&attr));
            }
            Err(e) => reply.error(Self::error_to_errno(e)),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let path = match self.get_path(ino) {
            Ok(p) => p,
            Err(e) => {
                reply.error(e);
                return;
            }
        };

        let set_attr = SetAttr {
            mode: mode.map(|m| m & 0o7777),
            uid,
            gid,
            size,
            atime: atime.map(time_or_now),
            mtime: mtime.map(time_or_now),
        };

        match self.block_on(self.backend.set_attr(&path, set_attr)) {
            Ok(mut attr) => {
                attr.inode = ino;
                reply.attr(&self.attr_ttl, &to_fuse_attr(&attr));
            }
            Err(e) => reply.error(Self::error_to_errno(e)),
        }
    }

    fn readlink(&mut self, _req: &Request, ino: u64, reply: ReplyData) {
        let path = match self.get_path(ino) {
            Ok(p) => p,
            Err(e) => {
                reply.error(e);
                return;
            }
        };

        match self.block_on(self.backend.read_symlink(&path)) {
            Ok(target) => {
                use std::os::unix::ffi::OsStrExt;
                reply.data(target.as_os_str().as_bytes());
            }
            Err(e) => reply.error(Self::error_to_errno(e)),
        }
    }

    fn mknod(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        rdev: u32,
        reply: ReplyEntry,
    ) {
        let path = match self.child_path(parent, name) {
            Ok(p) => p,
            Err(e) => {
                reply.error(e);
                return;
            }
        };

        let result = self.block_on(self.backend.mknod(&path, mode, rdev));
        self.reply_entry(&path, result, reply);
    }

    fn mkdir(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let path = match self.child_path(parent, name) {
            Ok(p) => p,
            Err(e) => {
                reply.error(e);
                return;
            }
        };

        let result = self.block_on(self.backend.create_dir(&path, mode));
        self.reply_entry(&path, result, reply);
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = match self.child_path(parent, name) {
            Ok(p) => p,
            Err(e) => {
                reply.error(e);
                return;
            }
        };

        let result = self.block_on(self.backend.unlink(&path));
        if result.is_ok() {
            self.forget_path(&path);
        }
        Self::reply_empty(result, reply);
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = match self.child_path(parent, name) {
            Ok(p) => p,
            Err(e) => {
                reply.error(e);
                return;
            }
        };

        let result = self.block_on(self.backend.remove_dir(&path));
        if result.is_ok() {
            self.forget_path(&path);
        }
        Self::reply_empty(result, reply);
    }

    fn symlink(
        &mut self,
        _req: &Request,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        let path = match self.child_path(parent, link_name) {
            Ok(p) => p,
            Err(e) => {
                reply.error(e);
                return;
            }
        };

        let result = self.block_on(self.backend.create_symlink(target, &path));
        self.reply_entry(&path, result, reply);
    }

    fn rename(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        // RENAME_EXCHANGE and RENAME_NOREPLACE have no merged-view equivalent
        if flags != 0 {
            reply.error(libc::EINVAL);
            return;
        }

        let (from, to) = match (self.child_path(parent, name), self.child_path(newparent, newname))
        {
            (Ok(from), Ok(to)) => (from, to),
            (Err(e), _) | (_, Err(e)) => {
                reply.error(e);
                return;
            }
        };

        let result = self.block_on(self.backend.rename(&from, &to));
        if result.is_ok() {
            let mut map = self.inode_map.write().unwrap_or_else(PoisonError::into_inner);
            map.rename(&from, &to);
        }
        Self::reply_empty(result, reply);
    }

    fn link(
        &mut self,
        _req: &Request,
        ino: u64,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEntry,
    ) {
        let (orig, path) = match (self.get_path(ino), self.child_path(newparent, newname)) {
            (Ok(orig), Ok(path)) => (orig, path),
            (Err(e), _) | (_, Err(e)) => {
                reply.error(e);
                return;
            }
        };

        let result = self.block_on(self.backend.link(&orig, &path));
        self.reply_entry(&path, result, reply);
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        let path = match self.get_path(ino) {
            Ok(p) => p,
            Err(e) => {
                reply.error(e);
                return;
            }
        };

        // Stateless: reads and writes address the file by path, not handle
        match self.block_on(self.backend.open(&path, flags)) {
            Ok(()) => reply.opened(0, 0),
            Err(e) => reply.error(Self::error_to_errno(e)),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let path = match self.get_path(ino) {
            Ok(p) => p,
            Err(e) => {
                reply.error(e);
                return;
            }
        };

        match self.block_on(self.backend.read_file(&path, offset.max(0) as u64, size)) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(Self::error_to_errno(e)),
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let path = match self.get_path(ino) {
            Ok(p) => p,
            Err(e) => {
                reply.error(e);
                return;
            }
        };

        match self.block_on(self.backend.write_file(&path, offset.max(0) as u64, data)) {
            Ok(written) => reply.written(written),
            Err(e) => reply.error(Self::error_to_errno(e)),
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn opendir(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.get_path(ino) {
            Ok(_) => reply.opened(0, 0),
            Err(e) => reply.error(e),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let path = match self.get_path(ino) {
            Ok(p) => p,
            Err(e) => {
                reply.error(e);
                return;
            }
        };

        let entries = match self.block_on(self.backend.read_dir(&path)) {
            Ok(entries) => entries,
            Err(e) => {
                reply.error(Self::error_to_errno(e));
                return;
            }
        };

        let mut all_entries = vec![
            (ino, FuseFileType::Directory, ".".to_string()),
            (self.parent_inode(&path, ino), FuseFileType::Directory, "..".to_string()),
        ];
        for entry in entries {
            let inode = self.inode_for(&join(&path, &entry.name));
            all_entries.push((inode, to_fuse_kind(entry.kind), entry.name));
        }

        for (i, (inode, kind, name)) in all_entries.iter().enumerate().skip(offset.max(0) as usize) {
            let buffer_full = reply.add(*inode, (i + 1) as i64, *kind, name);
            if buffer_full {
                break;
            }
        }

        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request, _ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request, ino: u64, reply: ReplyStatfs) {
        let path = self.get_path(ino).unwrap_or_else(|_| "/".to_string());

        match self.block_on(self.backend.statfs(&path)) {
            Ok(stats) => reply.statfs(
                stats.blocks,
                stats.bfree,
                stats.bavail,
                stats.files,
                stats.ffree,
                stats.bsize,
                stats.namelen,
                stats.frsize,
            ),
            Err(e) => reply.error(Self::error_to_errno(e)),
        }
    }

    fn setxattr(
        &mut self,
        _req: &Request,
        ino: u64,
        name: &OsStr,
        value: &[u8],
        flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        let (path, name) = match (self.get_path(ino), name.to_str()) {
            (Ok(path), Some(name)) => (path, name),
            (Err(e), _) => {
                reply.error(e);
                return;
            }
            (_, None) => {
                reply.error(libc::EINVAL);
                return;
            }
        };

        let result = self.block_on(self.backend.setxattr(&path, name, value, flags));
        Self::reply_empty(result, reply);
    }

    fn getxattr(&mut self, _req: &Request, ino: u64, name: &OsStr, size: u32, reply: ReplyXattr) {
        let (path, name) = match (self.get_path(ino), name.to_str()) {
            (Ok(path), Some(name)) => (path, name),
            (Err(e), _) => {
                reply.error(e);
                return;
            }
            (_, None) => {
                reply.error(libc::EINVAL);
                return;
            }
        };

        match self.block_on(self.backend.getxattr(&path, name)) {
            Ok(value) => reply_xattr(&value, size, reply),
            Err(e) => reply.error(Self::error_to_errno(e)),
        }
    }

    fn listxattr(&mut self, _req: &Request, ino: u64, size: u32, reply: ReplyXattr) {
        let path = match self.get_path(ino) {
            Ok(p) => p,
            Err(e) => {
                reply.error(e);
                return;
            }
        };

        match self.block_on(self.backend.listxattr(&path)) {
            Ok(names) => {
                let mut buf = Vec::new();
                for name in names {
                    buf.extend_from_slice(name.as_bytes());
                    buf.push(0);
                }
                reply_xattr(&buf, size, reply);
            }
            Err(e) => reply.error(Self::error_to_errno(e)),
        }
    }

    fn removexattr(&mut self, _req: &Request, ino: u64, name: &OsStr, reply: ReplyEmpty) {
        let (path, name) = match (self.get_path(ino), name.to_str()) {
            (Ok(path), Some(name)) => (path, name),
            (Err(e), _) => {
                reply.error(e);
                return;
            }
            (_, None) => {
                reply.error(libc::EINVAL);
                return;
            }
        };

        let result = self.block_on(self.backend.removexattr(&path, name));
        Self::reply_empty(result, reply);
    }

    fn access(&mut self, _req: &Request, ino: u64, mask: i32, reply: ReplyEmpty) {
        let path = match self.get_path(ino) {
            Ok(p) => p,
            Err(e) => {
                reply.error(e);
                return;
            }
        };

        let result = self.block_on(self.backend.access(&path, mask));
        Self::reply_empty(result, reply);
    }

    fn create(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let path = match self.child_path(parent, name) {
            Ok(p) => p,
            Err(e) => {
                reply.error(e);
                return;
            }
        };

        match self.block_on(self.backend.create(&path, flags, mode)) {
            Ok(mut attr) => {
                attr.inode = self.inode_for(&path);
                reply.created(&self.entry_ttl, &to_fuse_attr(&attr), 0, 0, 0);
            }
            Err(e) => reply.error(Self::error_to_errno(e)),
        }
    }
}

/// Size probe (size == 0) gets the length, otherwise the data if it fits.
fn reply_xattr(value: &[u8], size: u32, reply: ReplyXattr) {
    match xattr_reply_kind(value.len(), size) {
        XattrReply::Size(len) => reply.size(len),
        XattrReply::Data => reply.data(value),
        XattrReply::Range => reply.error(libc::ERANGE),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum XattrReply {
    Size(u32),
    Data,
    Range,
}

fn xattr_reply_kind(len: usize, size: u32) -> XattrReply {
    if size == 0 {
        XattrReply::Size(len as u32)
    } else if len <= size as usize {
        XattrReply::Data
    } else {
        XattrReply::Range
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fuse::interface::MockFilesystemInterface;

    #[test]
    fn test_inode_map_new() {
        let map = InodeMap::new();
        assert_eq!(map.get_path(1), Some("/"));
        assert_eq!(map.next_inode, 2);
    }

    #[test]
    fn test_inode_map_get_or_create() {
        let mut map = InodeMap::new();
        let ino1 = map.get_or_create("/test");
        let ino2 = map.get_or_create("/test");
        assert_eq!(ino1, ino2);
        assert_eq!(map.get_path(ino1), Some("/test"));
    }

    #[test]
    fn test_inode_map_remove_path() {
        let mut map = InodeMap::new();
        let ino = map.get_or_create("/test");
        map.remove_path("/test");
        assert_eq!(map.get_path(ino), None);
        assert_eq!(map.get_inode("/test"), None);
    }

    #[test]
    fn test_inode_map_rename_subtree() {
        let mut map = InodeMap::new();
        let dir = map.get_or_create("/a");
        let child = map.get_or_create("/a/b.php");
        let sibling = map.get_or_create("/ab");
        let replaced = map.get_or_create("/z");

        map.rename("/a", "/z");

        assert_eq!(map.get_path(dir), Some("/z"));
        assert_eq!(map.get_path(child), Some("/z/b.php"));
        assert_eq!(map.get_path(sibling), Some("/ab"));
        assert_eq!(map.get_path(replaced), None);
        assert_eq!(map.get_inode("/a/b.php"), None);
    }

    #[test]
    fn test_datetime_conversion() {
        let dt = chrono::Utc::now();
        let st = datetime_to_systemtime(dt);
        assert_eq!(systemtime_to_datetime(st), dt);
    }

    #[test]
    fn test_to_fuse_attr() {
        let now = chrono::Utc::now();
        let attr = FileAttr {
            inode: 9,
            kind: FileType::NamedPipe,
            size: 0,
            blocks: 0,
            atime: now,
            mtime: now,
            ctime: now,
            mode: 0o100644,
            uid: 1000,
            gid: 100,
            nlinks: 2,
            rdev: 0,
        };

        let fuse = to_fuse_attr(&attr);
        assert_eq!(fuse.ino, 9);
        assert_eq!(fuse.kind, FuseFileType::NamedPipe);
        assert_eq!(fuse.perm, 0o644);
        assert_eq!(fuse.nlink, 2);
    }

    #[test]
    fn test_xattr_reply_kind() {
        assert_eq!(xattr_reply_kind(10, 0), XattrReply::Size(10));
        assert_eq!(xattr_reply_kind(10, 10), XattrReply::Data);
        assert_eq!(xattr_reply_kind(10, 4), XattrReply::Range);
    }

    #[test]
    fn test_child_path_and_parent_inode() {
        let adapter = FuseAdapter::new(Arc::new(MockFilesystemInterface::new())).unwrap();
        assert_eq!(adapter.child_path(1, OsStr::new("a")).unwrap(), "/a");
        assert_eq!(adapter.child_path(42, OsStr::new("a")), Err(libc::ENOENT));

        let dir = adapter.inode_for("/a");
        assert_eq!(adapter.child_path(dir, OsStr::new("b")).unwrap(), "/a/b");
        assert_eq!(adapter.parent_inode("/a/b", 0), dir);
        assert_eq!(adapter.parent_inode("/a", 0), 1);
        assert_eq!(adapter.parent_inode("/", 1), 1);
    }
}
