// FUSE mount management
//
// Mount any FilesystemInterface at a directory, either on a background
// session or in the foreground until the filesystem is unmounted.

use super::FuseAdapter;
use super::adapter::{DEFAULT_ATTR_TTL, DEFAULT_ENTRY_TTL};
use super::interface::FilesystemInterface;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Mount options for FUSE filesystem
#[derive(Debug, Clone)]
pub struct MountOptions {
    /// Allow other users to access the filesystem
    pub allow_other: bool,

    /// Allow root to access the filesystem
    pub allow_root: bool,

    /// Mount as read-only
    pub read_only: bool,

    /// Filesystem name (for mtab)
    pub fsname: Option<String>,

    /// Auto-unmount on process exit
    pub auto_unmount: bool,

    /// How long the kernel may cache name lookups
    pub entry_ttl: Duration,

    /// How long the kernel may cache attributes
    pub attr_ttl: Duration,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            allow_other: false,
            allow_root: false,
            read_only: false,
            fsname: Some("regenfs".to_string()),
            auto_unmount: false,
            entry_ttl: DEFAULT_ENTRY_TTL,
            attr_ttl: DEFAULT_ATTR_TTL,
        }
    }
}

impl MountOptions {
    /// Convert to fuser mount options
    fn to_fuser_options(&self) -> Vec<fuser::MountOption> {
        let mut options = vec![fuser::MountOption::Subtype("regenfs".to_string())];

        if self.allow_other {
            options.push(fuser::MountOption::AllowOther);
        }

        if self.allow_root {
            options.push(fuser::MountOption::AllowRoot);
        }

        if self.read_only {
            options.push(fuser::MountOption::RO);
        }

        if let Some(ref fsname) = self.fsname {
            options.push(fuser::MountOption::FSName(fsname.clone()));
        }

        if self.auto_unmount {
            options.push(fuser::MountOption::AutoUnmount);
        }

        options
    }
}

fn check_mountpoint(mountpoint: &Path) -> Result<()> {
    if !mountpoint.exists() {
        anyhow::bail!("Mount point does not exist: {}", mountpoint.display());
    }

    if !mountpoint.is_dir() {
        anyhow::bail!("Mount point is not a directory: {}", mountpoint.display());
    }

    Ok(())
}

fn build_adapter(backend: Arc<dyn FilesystemInterface>, options: &MountOptions) -> Result<FuseAdapter> {
    let adapter = FuseAdapter::new(backend).context("Failed to create FUSE runtime")?;
    Ok(adapter.with_ttl(options.entry_ttl, options.attr_ttl))
}

/// Mount a filesystem in the background
///
/// # Returns
/// A session handle that keeps the filesystem mounted until dropped
pub fn mount(
    backend: Arc<dyn FilesystemInterface>,
    mountpoint: impl AsRef<Path>,
    options: MountOptions,
) -> Result<fuser::BackgroundSession> {
    let mountpoint = mountpoint.as_ref();
    check_mountpoint(mountpoint)?;

    let name = backend.name();
    let adapter = build_adapter(backend, &options)?;

    tracing::info!(backend = %name, mountpoint = %mountpoint.display(), "Mounting filesystem");

    let session = fuser::spawn_mount2(adapter, mountpoint, &options.to_fuser_options())
        .context("Failed to mount filesystem")?;

    tracing::info!("Filesystem mounted successfully");

    Ok(session)
}

/// Mount a filesystem and serve requests on the calling thread
///
/// Returns once the filesystem is unmounted. Must not be called from inside
/// a tokio runtime.
pub fn serve(
    backend: Arc<dyn FilesystemInterface>,
    mountpoint: impl AsRef<Path>,
    options: MountOptions,
) -> Result<()> {
    let mountpoint = mountpoint.as_ref();
    check_mountpoint(mountpoint)?;

    let name = backend.name();
    let adapter = build_adapter(backend, &options)?;

    tracing::info!(backend = %name, mountpoint = %mountpoint.display(), "Serving filesystem");

    fuser::mount2(adapter, mountpoint, &options.to_fuser_options())
        .context("Failed to mount filesystem")?;

    tracing::info!(mountpoint = %mountpoint.display(), "Filesystem unmounted");

    Ok(())
}

/// Unmount a FUSE filesystem
///
/// Dropping a BackgroundSession unmounts too; this covers foreground mounts
/// and mounts left behind by another process.
pub fn unmount(mountpoint: impl AsRef<Path>) -> Result<()> {
    let mountpoint = mountpoint.as_ref();

    tracing::info!("Unmounting filesystem at {}", mountpoint.display());

    #[cfg(target_os = "linux")]
    {
        use std::process::Command;

        let output = Command::new("fusermount")
            .arg("-u")
            .arg(mountpoint)
            .output()
            .context("Failed to execute fusermount")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Failed to unmount: {}", stderr);
        }
    }

    #[cfg(target_os = "macos")]
    {
        use std::process::Command;

        let output =
            Command::new("umount").arg(mountpoint).output().context("Failed to execute umount")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Failed to unmount: {}", stderr);
        }
    }

    tracing::info!("Filesystem unmounted successfully");

    Ok(())
}
