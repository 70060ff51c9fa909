use thiserror::Error;

pub type FsResult<T> = Result<T, FsError>;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("File or directory already exists: {0}")]
    AlreadyExists(String),

    #[error("Not a directory: {0}")]
    NotDirectory(String),

    #[error("Is a directory: {0}")]
    IsDirectory(String),

    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Path too long: {0} bytes (max 4096)")]
    PathTooLong(usize),

    #[error("Filename too long: {0} bytes (max 255)")]
    FilenameTooLong(usize),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FsError {
    /// Convert to POSIX errno
    ///
    /// `Io` errors keep the errno reported by the operating system so callers
    /// see exactly what the underlying tree returned.
    pub fn to_errno(&self) -> i32 {
        match self {
            FsError::PathNotFound(_) => libc::ENOENT,
            FsError::AlreadyExists(_) => libc::EEXIST,
            FsError::NotDirectory(_) => libc::ENOTDIR,
            FsError::IsDirectory(_) => libc::EISDIR,
            FsError::DirectoryNotEmpty(_) => libc::ENOTEMPTY,
            FsError::InvalidPath(_) => libc::EINVAL,
            FsError::PathTooLong(_) | FsError::FilenameTooLong(_) => libc::ENAMETOOLONG,
            FsError::PermissionDenied(_) => libc::EACCES,
            FsError::NotSupported(_) => libc::ENOSYS,
            FsError::Io(err) => match err.raw_os_error() {
                Some(errno) => errno,
                None => match err.kind() {
                    std::io::ErrorKind::NotFound => libc::ENOENT,
                    std::io::ErrorKind::PermissionDenied => libc::EACCES,
                    std::io::ErrorKind::AlreadyExists => libc::EEXIST,
                    _ => libc::EIO,
                },
            },
        }
    }
}

impl From<nix::errno::Errno> for FsError {
    fn from(errno: nix::errno::Errno) -> Self {
        FsError::Io(std::io::Error::from_raw_os_error(errno as i32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_not_found_error() {
        let err = FsError::PathNotFound("/test/path".to_string());
        assert_eq!(err.to_string(), "Path not found: /test/path");
        assert_eq!(err.to_errno(), libc::ENOENT);
    }

    #[test]
    fn test_already_exists_error() {
        let err = FsError::AlreadyExists("/test/file".to_string());
        assert_eq!(err.to_string(), "File or directory already exists: /test/file");
        assert_eq!(err.to_errno(), libc::EEXIST);
    }

    #[test]
    fn test_directory_not_empty_error() {
        let err = FsError::DirectoryNotEmpty("/dir".to_string());
        assert_eq!(err.to_string(), "Directory not empty: /dir");
        assert_eq!(err.to_errno(), libc::ENOTEMPTY);
    }

    #[test]
    fn test_name_length_errors() {
        assert_eq!(FsError::PathTooLong(5000).to_string(), "Path too long: 5000 bytes (max 4096)");
        assert_eq!(FsError::FilenameTooLong(300).to_errno(), libc::ENAMETOOLONG);
    }

    #[test]
    fn test_io_error_keeps_os_errno() {
        let err = FsError::from(std::io::Error::from_raw_os_error(libc::EROFS));
        assert_eq!(err.to_errno(), libc::EROFS);
    }

    #[test]
    fn test_io_error_without_errno_uses_kind() {
        let err = FsError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(err.to_errno(), libc::ENOENT);

        let err = FsError::from(std::io::Error::other("boom"));
        assert_eq!(err.to_errno(), libc::EIO);
    }

    #[test]
    fn test_nix_errno_conversion() {
        let err = FsError::from(nix::errno::Errno::EACCES);
        assert_eq!(err.to_errno(), libc::EACCES);
    }

    #[test]
    fn test_fserror_all_variants() {
        let errors = vec![
            FsError::PathNotFound("path".to_string()),
            FsError::AlreadyExists("file".to_string()),
            FsError::NotDirectory("file".to_string()),
            FsError::IsDirectory("dir".to_string()),
            FsError::DirectoryNotEmpty("dir".to_string()),
            FsError::InvalidPath("invalid".to_string()),
            FsError::PermissionDenied("file".to_string()),
            FsError::NotSupported("op".to_string()),
            FsError::Io(std::io::Error::from_raw_os_error(libc::EIO)),
        ];

        for err in errors {
            assert!(!format!("{}", err).is_empty());
            assert!(err.to_errno() > 0);
        }
    }
}
