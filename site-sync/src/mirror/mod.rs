//! Pulls a remote tree into a local mirror by following the delta feed.
//!
//! A sync moves through `Initial → Fetching → Applying → Committed`, or ends
//! in `Failed`. The cursor is written only on commit and removed on failure,
//! so an interrupted sync always restarts from a full listing.

pub mod cursor;
pub mod source;

use crate::fs::{normalize_key, remove_path, reset_dir, resolve_key, write_file};
use crate::utils::{Limiter, Result, SyncError};
use cursor::{CursorStore, CURSOR_FILE};
use source::{EntryTag, SourceClient, SyncEntry};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Phase of a mirror sync, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorPhase {
    Initial,
    Fetching,
    Applying,
    Committed,
    Failed,
}

impl fmt::Display for MirrorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MirrorPhase::Initial => "initial",
            MirrorPhase::Fetching => "fetching",
            MirrorPhase::Applying => "applying",
            MirrorPhase::Committed => "committed",
            MirrorPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A change resolved against the mirror: `key` is local, `remote` is what to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedChange {
    pub key: String,
    pub remote: String,
}

/// Delta entries partitioned into the three apply groups.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ApplyPlan {
    pub folders: Vec<PlannedChange>,
    pub deletes: Vec<PlannedChange>,
    pub files: Vec<PlannedChange>,
}

impl ApplyPlan {
    /// Partition `entries` (in feed order) below the remote `root`.
    ///
    /// A later entry for the same path supersedes an earlier one, and a later
    /// delete cancels earlier entries below the deleted path. Entries
    /// outside `root`, entries that would escape the mirror, and entries that
    /// collide with the cursor marker are dropped.
    pub fn from_entries(root: &str, entries: Vec<SyncEntry>) -> Self {
        let mut latest: HashMap<String, (usize, EntryTag, PlannedChange)> = HashMap::new();

        for (index, entry) in entries.into_iter().enumerate() {
            let Some(key) = relative_key(root, &entry.path) else {
                if !is_root(root, &entry.path) {
                    warn!("Skipping entry outside the source root: {}", entry.path);
                }
                continue;
            };
            if key == CURSOR_FILE {
                warn!("Skipping entry that collides with the cursor marker: {}", entry.path);
                continue;
            }
            let change = PlannedChange {
                key,
                remote: entry.path,
            };
            let lower = change.key.to_lowercase();
            if entry.tag == EntryTag::Deleted {
                let below = format!("{}/", lower);
                latest.retain(|key, _| !key.starts_with(&below));
            }
            latest.insert(lower, (index, entry.tag, change));
        }

        let mut ordered: Vec<_> = latest.into_values().collect();
        ordered.sort_by_key(|(index, _, _)| *index);

        let mut plan = ApplyPlan::default();
        for (_, tag, change) in ordered {
            match tag {
                EntryTag::Folder => plan.folders.push(change),
                EntryTag::Deleted => plan.deletes.push(change),
                EntryTag::File => plan.files.push(change),
            }
        }

        // Parents are reset before their children.
        plan.folders.sort_by_key(|c| c.key.matches('/').count());
        plan
    }

    pub fn len(&self) -> usize {
        self.folders.len() + self.deletes.len() + self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn is_root(root: &str, path: &str) -> bool {
    normalize_key(root).map(|r| r.to_lowercase()) == normalize_key(path).map(|p| p.to_lowercase())
}

/// Path of `remote` relative to `root`. Remote paths compare case-insensitively.
fn relative_key(root: &str, remote: &str) -> Option<String> {
    let path = normalize_key(remote)?;
    let Some(root) = normalize_key(root) else {
        return Some(path);
    };

    let head = path.get(..root.len())?;
    let rest = path.get(root.len()..)?.strip_prefix('/')?;
    if !head.eq_ignore_ascii_case(&root) || rest.is_empty() {
        return None;
    }
    Some(rest.to_string())
}

/// Mirrors one remote folder into local directories.
pub struct SourceMirror {
    client: Arc<dyn SourceClient>,
    root: String,
    limiter: Limiter,
}

impl SourceMirror {
    pub fn new(client: Arc<dyn SourceClient>, root: impl Into<String>, limiter: Limiter) -> Self {
        Self {
            client,
            root: root.into(),
            limiter,
        }
    }

    /// Bring `destination` up to date and return the committed cursor.
    ///
    /// On failure the cursor is removed before the error is returned.
    pub async fn sync(&self, destination: &Path) -> Result<String> {
        match self.try_sync(destination).await {
            Ok(cursor) => {
                info!("Mirror {} {} at cursor {}", destination.display(), MirrorPhase::Committed, cursor);
                Ok(cursor)
            }
            Err(e) => {
                warn!("Mirror {} {}: {}", destination.display(), MirrorPhase::Failed, e);
                if let Err(cleanup) = CursorStore::delete(destination).await {
                    warn!("Failed to remove cursor for {}: {}", destination.display(), cleanup);
                }
                Err(e)
            }
        }
    }

    async fn try_sync(&self, destination: &Path) -> Result<String> {
        let cursor = CursorStore::read(destination).await;
        debug!(
            "Mirror {} {} (cursor: {})",
            destination.display(),
            MirrorPhase::Initial,
            cursor.as_deref().unwrap_or("none")
        );

        if cursor.is_none() {
            reset_dir(destination).await?;
        }

        let (entries, next_cursor) = match self.fetch_all(cursor.as_deref()).await {
            Ok(fetched) => fetched,
            Err(e) if cursor.is_some() => {
                let stale = match e {
                    SyncError::StaleCursor(_) => e,
                    other => SyncError::StaleCursor(other.to_string()),
                };
                warn!("{}; resetting {} for a full listing", stale, destination.display());
                reset_dir(destination).await?;
                self.fetch_all(None).await?
            }
            Err(e) => return Err(e),
        };

        let plan = ApplyPlan::from_entries(&self.root, entries);
        info!(
            "Mirror {} {}: {} folders, {} deletes, {} files",
            destination.display(),
            MirrorPhase::Applying,
            plan.folders.len(),
            plan.deletes.len(),
            plan.files.len()
        );
        self.apply(destination, &plan).await?;

        CursorStore::write(destination, &next_cursor).await?;
        Ok(next_cursor)
    }

    /// Follow the feed from `cursor` until `has_more` is false.
    async fn fetch_all(&self, cursor: Option<&str>) -> Result<(Vec<SyncEntry>, String)> {
        debug!("Mirror {} from {}", MirrorPhase::Fetching, cursor.unwrap_or("scratch"));

        let mut page = self.client.list(cursor).await?;
        let mut entries = std::mem::take(&mut page.entries);

        while page.has_more {
            page = self.client.list(Some(&page.cursor)).await?;
            entries.append(&mut page.entries);
        }

        Ok((entries, page.cursor))
    }

    async fn apply(&self, destination: &Path, plan: &ApplyPlan) -> Result<()> {
        // Deletes, then folder resets by depth; files only after both.
        self.limiter
            .try_for_each(&plan.deletes, |change| async move {
                debug!("Deleting {}", change.key);
                remove_path(&resolve_key(destination, &change.key).await?).await
            })
            .await?;

        let mut depth_start = 0;
        while depth_start < plan.folders.len() {
            let depth = plan.folders[depth_start].key.matches('/').count();
            let depth_end = plan.folders[depth_start..]
                .iter()
                .position(|c| c.key.matches('/').count() != depth)
                .map(|offset| depth_start + offset)
                .unwrap_or(plan.folders.len());

            self.limiter
                .try_for_each(&plan.folders[depth_start..depth_end], |change| async move {
                    debug!("Creating folder {}", change.key);
                    reset_dir(&resolve_key(destination, &change.key).await?).await
                })
                .await?;

            depth_start = depth_end;
        }

        self.limiter
            .try_for_each(&plan.files, |change| async move {
                let contents = self.client.fetch(&change.remote).await?;
                debug!("Writing {} ({} bytes)", change.key, contents.len());
                write_file(&resolve_key(destination, &change.key).await?, &contents).await
            })
            .await
    }
}
