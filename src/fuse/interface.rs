// Filesystem interface abstraction
//
// Defines the operation surface shared by the merged view, the regeneration
// wrapper and the FUSE adapter. Every layer speaks the same trait, so the
// wrapper can sit in front of any view and the adapter behind any wrapper.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

pub use crate::fs::error::{FsError, FsResult};

/// File type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    RegularFile,
    Directory,
    Symlink,
    NamedPipe,
    CharDevice,
    BlockDevice,
    Socket,
}

impl FileType {
    pub fn from_std(ft: std::fs::FileType) -> Self {
        use std::os::unix::fs::FileTypeExt;

        if ft.is_dir() {
            FileType::Directory
        } else if ft.is_symlink() {
            FileType::Symlink
        } else if ft.is_fifo() {
            FileType::NamedPipe
        } else if ft.is_char_device() {
            FileType::CharDevice
        } else if ft.is_block_device() {
            FileType::BlockDevice
        } else if ft.is_socket() {
            FileType::Socket
        } else {
            FileType::RegularFile
        }
    }
}

/// File attributes structure
#[derive(Debug, Clone)]
pub struct FileAttr {
    pub inode: u64,
    pub kind: FileType,
    pub size: u64,
    pub blocks: u64,
    pub atime: DateTime<Utc>,
    pub mtime: DateTime<Utc>,
    pub ctime: DateTime<Utc>,
    pub mode: u32, // Permission bits
    pub uid: u32,
    pub gid: u32,
    pub nlinks: u32,
    pub rdev: u32,
}

impl FileAttr {
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        FileAttr {
            inode: meta.ino(),
            kind: FileType::from_std(meta.file_type()),
            size: meta.size(),
            blocks: meta.blocks(),
            atime: timestamp(meta.atime(), meta.atime_nsec()),
            mtime: timestamp(meta.mtime(), meta.mtime_nsec()),
            ctime: timestamp(meta.ctime(), meta.ctime_nsec()),
            mode: meta.mode() & 0o7777,
            uid: meta.uid(),
            gid: meta.gid(),
            nlinks: meta.nlink() as u32,
            rdev: meta.rdev() as u32,
        }
    }
}

fn timestamp(secs: i64, nsecs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, nsecs as u32).unwrap_or_default()
}

/// Directory entry structure
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub inode: u64,
    pub name: String,
    pub kind: FileType,
}

/// Set attributes parameters
#[derive(Debug, Default)]
pub struct SetAttr {
    pub size: Option<u64>,
    pub atime: Option<DateTime<Utc>>,
    pub mtime: Option<DateTime<Utc>>,
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

/// Filesystem statistics
#[derive(Debug, Clone)]
pub struct StatFs {
    pub blocks: u64,  // Total blocks
    pub bfree: u64,   // Free blocks
    pub bavail: u64,  // Available blocks for unprivileged users
    pub files: u64,   // Total inodes
    pub ffree: u64,   // Free inodes
    pub bsize: u32,   // Block size
    pub namelen: u32, // Maximum filename length
    pub frsize: u32,  // Fragment size
}

/// Unified filesystem interface
///
/// Paths are mount-relative in `/a/b` form. Implementations return the
/// underlying error unchanged; nothing above them rewrites errno values.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait FilesystemInterface: Send + Sync {
    // Metadata operations
    async fn get_attr(&self, path: &str) -> FsResult<FileAttr>;
    async fn access(&self, path: &str, mask: i32) -> FsResult<()>;
    async fn chmod(&self, path: &str, mode: u32) -> FsResult<()>;
    async fn chown(&self, path: &str, uid: Option<u32>, gid: Option<u32>) -> FsResult<()>;
    async fn truncate(&self, path: &str, size: u64) -> FsResult<()>;
    async fn utimens(
        &self,
        path: &str,
        atime: Option<DateTime<Utc>>,
        mtime: Option<DateTime<Utc>>,
    ) -> FsResult<()>;

    /// Apply a combined attribute change and return the resulting attributes.
    async fn set_attr(&self, path: &str, attr: SetAttr) -> FsResult<FileAttr> {
        if let Some(mode) = attr.mode {
            self.chmod(path, mode).await?;
        }
        if attr.uid.is_some() || attr.gid.is_some() {
            self.chown(path, attr.uid, attr.gid).await?;
        }
        if let Some(size) = attr.size {
            self.truncate(path, size).await?;
        }
        if attr.atime.is_some() || attr.mtime.is_some() {
            self.utimens(path, attr.atime, attr.mtime).await?;
        }
        self.get_attr(path).await
    }

    // File operations
    async fn open(&self, path: &str, flags: i32) -> FsResult<()>;
    async fn create(&self, path: &str, flags: i32, mode: u32) -> FsResult<FileAttr>;
    async fn mknod(&self, path: &str, mode: u32, rdev: u32) -> FsResult<FileAttr>;
    async fn unlink(&self, path: &str) -> FsResult<()>;
    async fn rename(&self, from: &str, to: &str) -> FsResult<()>;
    async fn link(&self, orig: &str, new_path: &str) -> FsResult<FileAttr>;
    async fn read_file(&self, path: &str, offset: u64, size: u32) -> FsResult<Vec<u8>>;
    async fn write_file(&self, path: &str, offset: u64, data: &[u8]) -> FsResult<u32>;

    // Directory operations
    async fn create_dir(&self, path: &str, mode: u32) -> FsResult<FileAttr>;
    async fn read_dir(&self, path: &str) -> FsResult<Vec<DirEntry>>;
    async fn remove_dir(&self, path: &str) -> FsResult<()>;

    // Link operations
    async fn create_symlink(&self, target: &Path, link: &str) -> FsResult<FileAttr>;
    async fn read_symlink(&self, path: &str) -> FsResult<PathBuf>;

    // Extended attributes
    async fn setxattr(&self, path: &str, name: &str, value: &[u8], flags: i32) -> FsResult<()>;
    async fn getxattr(&self, path: &str, name: &str) -> FsResult<Vec<u8>>;
    async fn listxattr(&self, path: &str) -> FsResult<Vec<String>>;
    async fn removexattr(&self, path: &str, name: &str) -> FsResult<()>;

    // Filesystem information
    async fn statfs(&self, path: &str) -> FsResult<StatFs>;

    fn set_debug(&self, debug: bool);
    fn name(&self) -> String;
}
