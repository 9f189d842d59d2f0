//! File system helpers shared by the mirror, the manifest and the build steps.

pub mod walker;

use crate::utils::errors::{io_err, Result};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// Normalize a slash-separated path into a store key.
///
/// Leading, trailing and repeated slashes and `.` segments are dropped.
/// Returns None for empty paths and for paths containing `..`.
pub fn normalize_key(raw: &str) -> Option<String> {
    let mut parts = Vec::new();
    for part in raw.split(['/', '\\']) {
        match part {
            "" | "." => continue,
            ".." => return None,
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Convert a relative file system path into a forward-slash key.
///
/// Returns None when a component is not valid UTF-8.
pub fn path_to_key(relative: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?.to_string()),
            Component::CurDir => continue,
            _ => return None,
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Resolve a normalized key below `root`.
pub fn key_to_path(root: &Path, key: &str) -> PathBuf {
    key.split('/').fold(root.to_path_buf(), |path, part| path.join(part))
}

/// Resolve `key` below `root`, matching each segment against existing
/// entries without regard to case.
///
/// An exact match wins. Segments with no existing match keep the casing
/// given in `key`, and so does everything below them.
pub async fn resolve_key(root: &Path, key: &str) -> Result<PathBuf> {
    let mut path = root.to_path_buf();
    let mut segments = key.split('/');

    for segment in segments.by_ref() {
        let exact = path.join(segment);
        if tokio::fs::symlink_metadata(&exact).await.is_ok() {
            path = exact;
            continue;
        }
        match find_entry_ignoring_case(&path, segment).await? {
            Some(found) => path = found,
            None => {
                path = exact;
                break;
            }
        }
    }

    Ok(segments.fold(path, |path, part| path.join(part)))
}

async fn find_entry_ignoring_case(dir: &Path, name: &str) -> Result<Option<PathBuf>> {
    let is_dir = tokio::fs::metadata(dir).await.is_ok_and(|m| m.is_dir());
    if !is_dir {
        return Ok(None);
    }

    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| io_err(dir, e))?;

    let wanted = name.to_lowercase();
    while let Some(entry) = entries.next_entry().await.map_err(|e| io_err(dir, e))? {
        if entry
            .file_name()
            .to_str()
            .is_some_and(|candidate| candidate.to_lowercase() == wanted)
        {
            return Ok(Some(entry.path()));
        }
    }
    Ok(None)
}

/// Remove a file or directory tree. A missing path is not an error.
pub async fn remove_path(path: &Path) -> Result<()> {
    let metadata = match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(io_err(path, e)),
    };

    let removed = if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };

    match removed {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(path, e)),
    }
}

/// Remove a directory tree (if any) and recreate it empty.
pub async fn reset_dir(path: &Path) -> Result<()> {
    remove_path(path).await?;
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| io_err(path, e))
}

/// Write `contents` to `path`, creating parent directories as needed.
pub async fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_err(parent, e))?;
    }
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| io_err(path, e))
}
