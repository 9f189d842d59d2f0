//! Directory traversal for manifests and build output.
//!
//! Unreadable entries are skipped rather than reported: a tree that is
//! partially unreadable still yields every file that could be read.

use super::path_to_key;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Options for directory walking
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// File names skipped wherever they appear (exact match)
    pub skip_names: Vec<String>,
}

impl WalkOptions {
    /// Skip the given file names.
    pub fn skipping<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            skip_names: names.into_iter().map(Into::into).collect(),
        }
    }
}

/// A regular file discovered during walking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Full path to the file
    pub path: PathBuf,

    /// Forward-slash path relative to the walk root
    pub key: String,

    /// File size in bytes
    pub size: u64,
}

impl FileInfo {
    /// Build a FileInfo from a DirEntry.
    /// Symlinks are resolved; links to directories and broken links yield None.
    fn from_entry(entry: &DirEntry, root: &Path) -> Option<Self> {
        let path = entry.path().to_path_buf();
        let metadata = if entry.path_is_symlink() {
            std::fs::metadata(&path).ok()?
        } else {
            entry.metadata().ok()?
        };

        if !metadata.is_file() {
            return None;
        }

        let relative = path.strip_prefix(root).ok()?;
        let Some(key) = path_to_key(relative) else {
            debug!("Skipping file with a non UTF-8 name: {}", path.display());
            return None;
        };

        Some(Self {
            path,
            key,
            size: metadata.len(),
        })
    }
}

/// Walk a directory tree and collect every regular file, sorted by key.
///
/// A missing root yields an empty list.
///
/// # Example
/// ```no_run
/// use site_sync::fs::walker::{walk_files, WalkOptions};
/// use std::path::Path;
///
/// let files = walk_files(Path::new("/srv/site"), &WalkOptions::default());
/// println!("Found {} files", files.len());
/// ```
pub fn walk_files(root: &Path, options: &WalkOptions) -> Vec<FileInfo> {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !should_skip(entry, &options.skip_names));

    let mut files: Vec<FileInfo> = walker
        .filter_map(|entry| entry.ok())
        .filter(|entry| !entry.file_type().is_dir())
        .filter_map(|entry| FileInfo::from_entry(&entry, root))
        .collect();

    files.sort_by(|a, b| a.key.cmp(&b.key));
    files
}

fn should_skip(entry: &DirEntry, names: &[String]) -> bool {
    let file_name = entry.file_name().to_string_lossy();
    names.iter().any(|name| *name == file_name)
}
