// FUSE interface implementation
//
// The operation contract shared by every layer, the regeneration wrapper,
// and the transport that mounts them as a POSIX filesystem.

pub mod adapter;
pub mod backend;
pub mod interface;
pub mod mount;

pub use adapter::FuseAdapter;
pub use backend::RegenBackend;
pub use interface::{
    DirEntry, FileAttr, FileType, FilesystemInterface, FsError, FsResult, SetAttr, StatFs,
};
pub use mount::{MountOptions, mount, serve, unmount};
