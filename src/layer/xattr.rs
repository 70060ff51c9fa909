//! Thin wrappers over the `l*xattr` family. Symlinks are never followed.

use std::io;
use std::path::Path;

#[cfg(target_os = "linux")]
mod imp {
    use std::ffi::CString;
    use std::io;
    use std::os::unix::ffi::OsStrExt;
    use std::path::Path;

    fn c_string(bytes: &[u8]) -> io::Result<CString> {
        CString::new(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
    }

    pub fn get(path: &Path, name: &str) -> io::Result<Vec<u8>> {
        let c_path = c_string(path.as_os_str().as_bytes())?;
        let c_name = c_string(name.as_bytes())?;
        loop {
            // SAFETY: both strings are NUL terminated and a null buffer of
            // length zero only queries the value size.
            let size = unsafe {
                libc::lgetxattr(c_path.as_ptr(), c_name.as_ptr(), std::ptr::null_mut(), 0)
            };
            if size < 0 {
                return Err(io::Error::last_os_error());
            }
            let mut buf = vec![0u8; size as usize];
            // SAFETY: buf is valid for buf.len() bytes.
            let read = unsafe {
                libc::lgetxattr(
                    c_path.as_ptr(),
                    c_name.as_ptr(),
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                )
            };
            if read < 0 {
                let err = io::Error::last_os_error();
                // value grew between the two calls
                if err.raw_os_error() == Some(libc::ERANGE) {
                    continue;
                }
                return Err(err);
            }
            buf.truncate(read as usize);
            return Ok(buf);
        }
    }

    pub fn list(path: &Path) -> io::Result<Vec<String>> {
        let c_path = c_string(path.as_os_str().as_bytes())?;
        loop {
            // SAFETY: see `get`.
            let size = unsafe { libc::llistxattr(c_path.as_ptr(), std::ptr::null_mut(), 0) };
            if size < 0 {
                return Err(io::Error::last_os_error());
            }
            let mut buf = vec![0u8; size as usize];
            // SAFETY: buf is valid for buf.len() bytes.
            let read = unsafe {
                libc::llistxattr(c_path.as_ptr(), buf.as_mut_ptr() as *mut libc::c_char, buf.len())
            };
            if read < 0 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::ERANGE) {
                    continue;
                }
                return Err(err);
            }
            buf.truncate(read as usize);
            return Ok(buf
                .split(|b| *b == 0)
                .filter(|name| !name.is_empty())
                .map(|name| String::from_utf8_lossy(name).into_owned())
                .collect());
        }
    }

    pub fn set(path: &Path, name: &str, value: &[u8], flags: i32) -> io::Result<()> {
        let c_path = c_string(path.as_os_str().as_bytes())?;
        let c_name = c_string(name.as_bytes())?;
        // SAFETY: value is valid for value.len() bytes.
        let rc = unsafe {
            libc::lsetxattr(
                c_path.as_ptr(),
                c_name.as_ptr(),
                value.as_ptr() as *const libc::c_void,
                value.len(),
                flags,
            )
        };
        if rc < 0 { Err(io::Error::last_os_error()) } else { Ok(()) }
    }

    pub fn remove(path: &Path, name: &str) -> io::Result<()> {
        let c_path = c_string(path.as_os_str().as_bytes())?;
        let c_name = c_string(name.as_bytes())?;
        // SAFETY: both strings are NUL terminated.
        let rc = unsafe { libc::lremovexattr(c_path.as_ptr(), c_name.as_ptr()) };
        if rc < 0 { Err(io::Error::last_os_error()) } else { Ok(()) }
    }
}

#[cfg(not(target_os = "linux"))]
mod imp {
    use std::io;
    use std::path::Path;

    fn unsupported() -> io::Error {
        io::Error::from_raw_os_error(libc::ENOTSUP)
    }

    pub fn get(_path: &Path, _name: &str) -> io::Result<Vec<u8>> {
        Err(unsupported())
    }

    pub fn list(_path: &Path) -> io::Result<Vec<String>> {
        Err(unsupported())
    }

    pub fn set(_path: &Path, _name: &str, _value: &[u8], _flags: i32) -> io::Result<()> {
        Err(unsupported())
    }

    pub fn remove(_path: &Path, _name: &str) -> io::Result<()> {
        Err(unsupported())
    }
}

pub fn get(path: &Path, name: &str) -> io::Result<Vec<u8>> {
    imp::get(path, name)
}

pub fn list(path: &Path) -> io::Result<Vec<String>> {
    imp::list(path)
}

pub fn set(path: &Path, name: &str, value: &[u8], flags: i32) -> io::Result<()> {
    imp::set(path, name, value, flags)
}

pub fn remove(path: &Path, name: &str) -> io::Result<()> {
    imp::remove(path, name)
}
