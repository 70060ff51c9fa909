use crate::fs::error::{FsError, FsResult};

const MAX_PATH_LENGTH: usize = 4096;
const MAX_FILENAME_LENGTH: usize = 255;

/// Normalize a mount-relative path into `/a/b` form.
///
/// Leading slashes are optional, repeated slashes and `.` components are
/// dropped. `..` is rejected so a path can never leave the source or overlay
/// root it is joined onto.
pub fn normalize_path(path: &str) -> FsResult<String> {
    if path.is_empty() {
        return Err(FsError::InvalidPath("Empty path".to_string()));
    }

    if path.contains('\0') {
        return Err(FsError::InvalidPath("Path contains NULL character".to_string()));
    }

    if path.len() > MAX_PATH_LENGTH {
        return Err(FsError::PathTooLong(path.len()));
    }

    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty() && *s != ".").collect();

    for part in &parts {
        if *part == ".." {
            return Err(FsError::InvalidPath(format!("Parent reference in path: {}", path)));
        }
        if part.len() > MAX_FILENAME_LENGTH {
            return Err(FsError::FilenameTooLong(part.len()));
        }
    }

    Ok(format!("/{}", parts.join("/")))
}

/// Strip the leading `/` of a normalized path. The root maps to `""`.
pub fn relative(path: &str) -> &str {
    path.trim_start_matches('/')
}

pub fn split_path(path: &str) -> FsResult<(String, String)> {
    let normalized = normalize_path(path)?;

    if normalized == "/" {
        return Err(FsError::InvalidPath("Cannot split root path".to_string()));
    }

    // normalized always contains at least one slash
    let idx = normalized.rfind('/').unwrap_or(0);
    let parent = if idx == 0 { "/".to_string() } else { normalized[..idx].to_string() };
    Ok((parent, normalized[idx + 1..].to_string()))
}

/// Join a child name onto a normalized directory path.
pub fn join(parent: &str, name: &str) -> String {
    if parent == "/" { format!("/{}", name) } else { format!("{}/{}", parent, name) }
}

/// All proper ancestors of a normalized path, nearest first, excluding `/`.
pub fn ancestors(path: &str) -> Vec<&str> {
    let mut result = Vec::new();
    let mut current = path;
    while let Some(idx) = current.rfind('/') {
        if idx == 0 {
            break;
        }
        current = &current[..idx];
        result.push(current);
    }
    result
}
