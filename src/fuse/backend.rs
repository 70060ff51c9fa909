// RegenBackend - freshness checks in front of a merged view
//
// Operations that observe or modify existing entries run the staleness gate
// on the path they observe, then delegate. Operations that only create new
// entries go straight through. Results from the inner view are returned
// untouched.

use super::interface::*;
use crate::regen::StalenessGate;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct RegenBackend {
    inner: Arc<dyn FilesystemInterface>,
    gate: Arc<StalenessGate>,
}

impl RegenBackend {
    pub fn new(inner: Arc<dyn FilesystemInterface>, gate: Arc<StalenessGate>) -> Self {
        Self { inner, gate }
    }

    pub fn gate(&self) -> &StalenessGate {
        &self.gate
    }

    async fn refresh(&self, op: &str, path: &str) {
        self.gate.check_and_refresh(op, path).await;
    }
}

#[async_trait::async_trait]
impl FilesystemInterface for RegenBackend {
    async fn get_attr(&self, path: &str) -> FsResult<FileAttr> {
        self.refresh("getattr", path).await;
        self.inner.get_attr(path).await
    }

    async fn access(&self, path: &str, mask: i32) -> FsResult<()> {
        self.refresh("access", path).await;
        self.inner.access(path, mask).await
    }

    async fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        self.refresh("chmod", path).await;
        self.inner.chmod(path, mode).await
    }

    async fn chown(&self, path: &str, uid: Option<u32>, gid: Option<u32>) -> FsResult<()> {
        self.refresh("chown", path).await;
        self.inner.chown(path, uid, gid).await
    }

    async fn truncate(&self, path: &str, size: u64) -> FsResult<()> {
        self.refresh("truncate", path).await;
        self.inner.truncate(path, size).await
    }

    async fn utimens(
        &self,
        path: &str,
        atime: Option<DateTime<Utc>>,
        mtime: Option<DateTime<Utc>>,
    ) -> FsResult<()> {
        self.refresh("utimens", path).await;
        self.inner.utimens(path, atime, mtime).await
    }

    // One check for the whole request, however many changes it carries.
    async fn set_attr(&self, path: &str, attr: SetAttr) -> FsResult<FileAttr> {
        self.refresh("setattr", path).await;
        self.inner.set_attr(path, attr).await
    }

    async fn open(&self, path: &str, flags: i32) -> FsResult<()> {
        self.refresh("open", path).await;
        self.inner.open(path, flags).await
    }

    async fn create(&self, path: &str, flags: i32, mode: u32) -> FsResult<FileAttr> {
        self.inner.create(path, flags, mode).await
    }

    async fn mknod(&self, path: &str, mode: u32, rdev: u32) -> FsResult<FileAttr> {
        self.inner.mknod(path, mode, rdev).await
    }

    async fn unlink(&self, path: &str) -> FsResult<()> {
        self.refresh("unlink", path).await;
        self.inner.unlink(path).await
    }

    async fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        self.refresh("rename", from).await;
        self.inner.rename(from, to).await
    }

    async fn link(&self, orig: &str, new_path: &str) -> FsResult<FileAttr> {
        self.refresh("link", orig).await;
        self.inner.link(orig, new_path).await
    }

    async fn read_file(&self, path: &str, offset: u64, size: u32) -> FsResult<Vec<u8>> {
        self.inner.read_file(path, offset, size).await
    }

    async fn write_file(&self, path: &str, offset: u64, data: &[u8]) -> FsResult<u32> {
        self.inner.write_file(path, offset, data).await
    }

    async fn create_dir(&self, path: &str, mode: u32) -> FsResult<FileAttr> {
        self.inner.create_dir(path, mode).await
    }

    async fn read_dir(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        self.refresh("readdir", path).await;
        self.inner.read_dir(path).await
    }

    async fn remove_dir(&self, path: &str) -> FsResult<()> {
        self.refresh("rmdir", path).await;
        self.inner.remove_dir(path).await
    }

    async fn create_symlink(&self, target: &Path, link: &str) -> FsResult<FileAttr> {
        self.inner.create_symlink(target, link).await
    }

    async fn read_symlink(&self, path: &str) -> FsResult<PathBuf> {
        self.refresh("readlink", path).await;
        self.inner.read_symlink(path).await
    }

    async fn setxattr(&self, path: &str, name: &str, value: &[u8], flags: i32) -> FsResult<()> {
        self.refresh("setxattr", path).await;
        self.inner.setxattr(path, name, value, flags).await
    }

    async fn getxattr(&self, path: &str, name: &str) -> FsResult<Vec<u8>> {
        self.refresh("getxattr", path).await;
        self.inner.getxattr(path, name).await
    }

    async fn listxattr(&self, path: &str) -> FsResult<Vec<String>> {
        self.refresh("listxattr", path).await;
        self.inner.listxattr(path).await
    }

    async fn removexattr(&self, path: &str, name: &str) -> FsResult<()> {
        self.refresh("removexattr", path).await;
        self.inner.removexattr(path, name).await
    }

    async fn statfs(&self, path: &str) -> FsResult<StatFs> {
        self.refresh("statfs", path).await;
        self.inner.statfs(path).await
    }

    fn set_debug(&self, debug: bool) {
        self.inner.set_debug(debug);
    }

    fn name(&self) -> String {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regen::{GateOptions, Regeneration, Regenerator, from_fn};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    struct Trees {
        source: TempDir,
        overlay: TempDir,
        calls: Arc<AtomicUsize>,
    }

    impl Trees {
        fn new() -> Self {
            let trees = Self {
                source: tempfile::tempdir().unwrap(),
                overlay: tempfile::tempdir().unwrap(),
                calls: Arc::new(AtomicUsize::new(0)),
            };
            let file = trees.source.path().join("page.php");
            std::fs::write(&file, b"<?php").unwrap();
            std::fs::File::options()
                .write(true)
                .open(&file)
                .unwrap()
                .set_modified(SystemTime::now() - Duration::from_secs(600))
                .unwrap();
            trees
        }

        fn gate(&self) -> Arc<StalenessGate> {
            let calls = self.calls.clone();
            let regenerator: Arc<dyn Regenerator> = Arc::new(from_fn(move |_: &Path| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Regeneration::Updated(b"fresh".to_vec()))
            }));
            Arc::new(StalenessGate::new(
                self.source.path(),
                self.overlay.path(),
                Some(regenerator),
                GateOptions::default(),
            ))
        }

        fn regenerated(&self) -> bool {
            self.overlay.path().join("page.php").exists()
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn sample_attr() -> FileAttr {
        let now = Utc::now();
        FileAttr {
            inode: 7,
            kind: FileType::RegularFile,
            size: 5,
            blocks: 1,
            atime: now,
            mtime: now,
            ctime: now,
            mode: 0o644,
            uid: 0,
            gid: 0,
            nlinks: 1,
            rdev: 0,
        }
    }

    #[tokio::test]
    async fn test_get_attr_refreshes_before_delegating() {
        let trees = Trees::new();
        let mut inner = MockFilesystemInterface::new();
        inner.expect_get_attr().withf(|path| path == "/page.php").times(1).returning(|_| Ok(sample_attr()));

        let backend = RegenBackend::new(Arc::new(inner), trees.gate());
        let attr = backend.get_attr("/page.php").await.unwrap();

        assert_eq!(attr.inode, 7);
        assert!(trees.regenerated());
        assert_eq!(trees.calls(), 1);
    }

    #[tokio::test]
    async fn test_errors_are_forwarded_verbatim() {
        let trees = Trees::new();
        let mut inner = MockFilesystemInterface::new();
        inner
            .expect_open()
            .returning(|_, _| Err(FsError::Io(std::io::Error::from_raw_os_error(libc::EACCES))));
        inner.expect_unlink().returning(|_| Err(FsError::PathNotFound("/page.php".into())));

        let backend = RegenBackend::new(Arc::new(inner), trees.gate());

        let err = backend.open("/page.php", libc::O_RDONLY).await.unwrap_err();
        assert_eq!(err.to_errno(), libc::EACCES);
        let err = backend.unlink("/page.php").await.unwrap_err();
        assert_eq!(err.to_errno(), libc::ENOENT);
    }

    #[tokio::test]
    async fn test_creation_does_not_refresh() {
        let trees = Trees::new();
        let mut inner = MockFilesystemInterface::new();
        inner.expect_create().times(1).returning(|_, _, _| Ok(sample_attr()));
        inner.expect_create_dir().times(1).returning(|_, _| Ok(sample_attr()));
        inner.expect_mknod().times(1).returning(|_, _, _| Ok(sample_attr()));
        inner.expect_create_symlink().times(1).returning(|_, _| Ok(sample_attr()));

        let backend = RegenBackend::new(Arc::new(inner), trees.gate());
        backend.create("/page.php", libc::O_WRONLY, 0o644).await.unwrap();
        backend.create_dir("/page.php", 0o755).await.unwrap();
        backend.mknod("/page.php", libc::S_IFIFO | 0o644, 0).await.unwrap();
        backend.create_symlink(Path::new("target"), "/page.php").await.unwrap();

        assert_eq!(trees.calls(), 0);
        assert!(!trees.regenerated());
    }

    #[tokio::test]
    async fn test_data_path_does_not_refresh() {
        let trees = Trees::new();
        let mut inner = MockFilesystemInterface::new();
        inner.expect_read_file().returning(|_, _, _| Ok(b"data".to_vec()));
        inner.expect_write_file().returning(|_, _, data| Ok(data.len() as u32));

        let backend = RegenBackend::new(Arc::new(inner), trees.gate());
        assert_eq!(backend.read_file("/page.php", 0, 4).await.unwrap(), b"data");
        assert_eq!(backend.write_file("/page.php", 0, b"abc").await.unwrap(), 3);
        assert_eq!(trees.calls(), 0);
    }

    #[tokio::test]
    async fn test_rename_refreshes_source_path() {
        let trees = Trees::new();
        let mut inner = MockFilesystemInterface::new();
        inner
            .expect_rename()
            .withf(|from, to| from == "/page.php" && to == "/moved.php")
            .times(1)
            .returning(|_, _| Ok(()));

        let backend = RegenBackend::new(Arc::new(inner), trees.gate());
        backend.rename("/page.php", "/moved.php").await.unwrap();
        assert!(trees.regenerated());
    }

    #[tokio::test]
    async fn test_link_refreshes_existing_path() {
        let trees = Trees::new();
        let mut inner = MockFilesystemInterface::new();
        inner.expect_link().times(1).returning(|_, _| Ok(sample_attr()));

        let backend = RegenBackend::new(Arc::new(inner), trees.gate());
        backend.link("/page.php", "/alias.php").await.unwrap();
        assert!(trees.regenerated());
        assert!(!trees.overlay.path().join("alias.php").exists());
    }

    #[tokio::test]
    async fn test_set_attr_refreshes_once() {
        let trees = Trees::new();
        let mut inner = MockFilesystemInterface::new();
        inner.expect_set_attr().times(1).returning(|_, _| Ok(sample_attr()));

        let backend = RegenBackend::new(Arc::new(inner), trees.gate());
        let attr = SetAttr { mode: Some(0o600), size: Some(0), ..Default::default() };
        backend.set_attr("/page.php", attr).await.unwrap();
        assert_eq!(trees.calls(), 1);
    }

    #[tokio::test]
    async fn test_observing_operations_refresh() {
        let trees = Trees::new();
        let mut inner = MockFilesystemInterface::new();
        inner.expect_access().returning(|_, _| Ok(()));
        inner.expect_getxattr().returning(|_, _| Ok(Vec::new()));
        inner.expect_listxattr().returning(|_| Ok(Vec::new()));
        inner.expect_read_dir().returning(|_| Ok(Vec::new()));

        let backend = RegenBackend::new(Arc::new(inner), trees.gate());
        backend.access("/page.php", libc::R_OK).await.unwrap();
        assert!(trees.regenerated());

        // fresh now, nothing more to do
        backend.getxattr("/page.php", "user.x").await.unwrap();
        backend.listxattr("/page.php").await.unwrap();
        backend.read_dir("/").await.unwrap();
        assert_eq!(trees.calls(), 1);
    }

    #[test]
    fn test_name_is_inner_name() {
        let trees = Trees::new();
        let mut inner = MockFilesystemInterface::new();
        inner.expect_name().return_const("union(a:b)".to_string());
        inner.expect_set_debug().withf(|debug| *debug).times(1).return_const(());

        let backend = RegenBackend::new(Arc::new(inner), trees.gate());
        assert_eq!(backend.name(), "union(a:b)");
        backend.set_debug(true);
    }
}
