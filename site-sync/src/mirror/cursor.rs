//! Persisted delta cursor for a local mirror.
//!
//! The cursor lives inside the mirror it describes, so resetting the mirror
//! also forgets the cursor.

use crate::utils::errors::{io_err, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the cursor marker inside a mirror directory.
pub const CURSOR_FILE: &str = ".site-sync-cursor";

pub struct CursorStore;

impl CursorStore {
    pub fn path(destination: &Path) -> PathBuf {
        destination.join(CURSOR_FILE)
    }

    /// Read the cursor for `destination`. Missing, unreadable or blank ⇒ None.
    pub async fn read(destination: &Path) -> Option<String> {
        let path = Self::path(destination);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let cursor = content.trim();
                (!cursor.is_empty()).then(|| cursor.to_string())
            }
            Err(e) => {
                debug!("No cursor at {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Persist `cursor`, creating `destination` if needed.
    pub async fn write(destination: &Path, cursor: &str) -> Result<()> {
        tokio::fs::create_dir_all(destination)
            .await
            .map_err(|e| io_err(destination, e))?;

        let path = Self::path(destination);
        tokio::fs::write(&path, cursor)
            .await
            .map_err(|e| io_err(&path, e))
    }

    /// Forget the cursor. Succeeds when there is none.
    pub async fn delete(destination: &Path) -> Result<()> {
        let path = Self::path(destination);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&path, e)),
        }
    }
}
