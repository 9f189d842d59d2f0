//! Publishes a local tree to an object store by manifest diff.
//!
//! The store's manifest is trusted only when it matches the locally cached
//! copy of the last completed push. A mismatch means the store was changed
//! out of band or a previous push died half way, and the store is rebuilt
//! from scratch instead.

pub mod manifest;
pub mod remote_manifest;
pub mod store;

use crate::fs::key_to_path;
use crate::utils::{Limiter, Result};
use manifest::Manifest;
use remote_manifest::RemoteManifestProvider;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use store::{content_type_for, delete_batch, ObjectStore};
use tracing::{debug, info, warn};

/// Why a push fell back to a full resync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResyncReason {
    /// The store has no readable manifest (first push, or a failed one).
    NoRemoteManifest,
    /// The store's manifest differs from the cached one.
    ManifestDrift,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushMode {
    Incremental,
    FullResync(ResyncReason),
}

impl fmt::Display for PushMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushMode::Incremental => f.write_str("incremental"),
            PushMode::FullResync(ResyncReason::NoRemoteManifest) => {
                f.write_str("full resync (no remote manifest)")
            }
            PushMode::FullResync(ResyncReason::ManifestDrift) => {
                f.write_str("full resync (manifest drift)")
            }
        }
    }
}

/// Outcome of a successful push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushSummary {
    pub mode: PushMode,
    pub uploaded: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

/// Keys to touch when moving the store from `remote` to `local`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DiffPlan {
    /// In remote, not in local
    pub delete: Vec<String>,
    /// In local, not in remote
    pub upload: Vec<String>,
    /// In both, hashes differ
    pub changed: Vec<String>,
    /// In both, same hash
    pub unchanged: Vec<String>,
}

impl DiffPlan {
    pub fn between(remote: &Manifest, local: &Manifest) -> Self {
        let mut plan = DiffPlan::default();

        for path in remote.paths() {
            if !local.contains(path) {
                plan.delete.push(path.to_string());
            }
        }

        for (path, hash) in local.iter() {
            match remote.get(path) {
                None => plan.upload.push(path.to_string()),
                Some(remote_hash) if remote_hash == hash => plan.unchanged.push(path.to_string()),
                Some(_) => plan.changed.push(path.to_string()),
            }
        }

        plan
    }
}

pub struct DiffPublisher {
    store: Arc<dyn ObjectStore>,
    manifests: RemoteManifestProvider,
    limiter: Limiter,
}

impl DiffPublisher {
    pub fn new(store: Arc<dyn ObjectStore>, manifests: RemoteManifestProvider, limiter: Limiter) -> Self {
        Self {
            store,
            manifests,
            limiter,
        }
    }

    /// Make the store match `local_dir`, then record the new manifest.
    ///
    /// On failure the remote manifest is removed so the next push resyncs.
    pub async fn push(&self, local_dir: &Path) -> Result<PushSummary> {
        match self.try_push(local_dir).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                warn!("Problem publishing to {}: {}", self.store.name(), e);
                self.manifests.discard_remote().await;
                Err(e)
            }
        }
    }

    async fn try_push(&self, local_dir: &Path) -> Result<PushSummary> {
        let remote = self.manifests.fetch_remote().await;
        let local = manifest::generate(local_dir).await?;
        let cached = self.manifests.fetch_cached().await;

        let summary = match remote {
            Some(remote) if cached.as_ref() == Some(&remote) => {
                self.push_incremental(local_dir, &remote, &local).await?
            }
            Some(_) => {
                self.push_full(local_dir, &local, ResyncReason::ManifestDrift)
                    .await?
            }
            None => {
                self.push_full(local_dir, &local, ResyncReason::NoRemoteManifest)
                    .await?
            }
        };

        self.manifests.publish(&local).await?;

        info!(
            "Pushed {} to {} ({}): {} uploaded, {} deleted, {} unchanged",
            local_dir.display(),
            self.store.name(),
            summary.mode,
            summary.uploaded,
            summary.deleted,
            summary.unchanged
        );
        Ok(summary)
    }

    async fn push_incremental(
        &self,
        local_dir: &Path,
        remote: &Manifest,
        local: &Manifest,
    ) -> Result<PushSummary> {
        let plan = DiffPlan::between(remote, local);

        for path in &plan.delete {
            info!("Deleting {}", path);
        }

        let deletes = delete_batch(self.store.as_ref(), &plan.delete);
        let uploads = self.upload_all(local_dir, &plan.upload, "Uploading");
        let syncs = self.upload_all(local_dir, &plan.changed, "Syncing");
        tokio::try_join!(deletes, uploads, syncs)?;

        Ok(PushSummary {
            mode: PushMode::Incremental,
            uploaded: plan.upload.len() + plan.changed.len(),
            deleted: plan.delete.len(),
            unchanged: plan.unchanged.len(),
        })
    }

    async fn push_full(
        &self,
        local_dir: &Path,
        local: &Manifest,
        reason: ResyncReason,
    ) -> Result<PushSummary> {
        let mode = PushMode::FullResync(reason);
        info!("Publishing to {} with {}", self.store.name(), mode);

        let existing = self.store.list().await?;
        delete_batch(self.store.as_ref(), &existing).await?;

        let keys: Vec<String> = local.paths().map(str::to_string).collect();
        self.upload_all(local_dir, &keys, "Uploading").await?;

        Ok(PushSummary {
            mode,
            uploaded: keys.len(),
            deleted: existing.len(),
            unchanged: 0,
        })
    }

    async fn upload_all(&self, local_dir: &Path, keys: &[String], verb: &str) -> Result<()> {
        self.limiter
            .try_for_each(keys, |key| async move {
                debug!("{} {}", verb, key);
                let path = key_to_path(local_dir, key);
                self.store
                    .put_file(key, &path, &content_type_for(key))
                    .await
            })
            .await
    }
}
