//! The published manifest, kept both in the store and in a local cache.
//!
//! The two copies agree only after a push completes; see [`super::DiffPublisher`].

use super::manifest::Manifest;
use super::store::{delete_batch, ObjectStore};
use crate::utils::errors::{io_err, Result};
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct RemoteManifestProvider {
    store: Arc<dyn ObjectStore>,
    key: String,
    cache_path: PathBuf,
}

impl RemoteManifestProvider {
    /// The cache file is `<cache_dir>/<store name>`.
    pub fn new(store: Arc<dyn ObjectStore>, key: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Self {
        let cache_path = cache_dir.into().join(store.name());
        Self {
            store,
            key: key.into(),
            cache_path,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn cache_path(&self) -> &std::path::Path {
        &self.cache_path
    }

    /// The manifest currently in the store. Any failure reads as "none".
    pub async fn fetch_remote(&self) -> Option<Manifest> {
        match self.store.get(&self.key).await {
            Ok(Some(bytes)) => match Manifest::from_json(&bytes) {
                Ok(manifest) => Some(manifest),
                Err(e) => {
                    warn!("Remote manifest in {} is unreadable: {}", self.store.name(), e);
                    None
                }
            },
            Ok(None) => {
                info!("No remote manifest in {}", self.store.name());
                None
            }
            Err(e) => {
                info!("Remote manifest could not be fetched from {}: {}", self.store.name(), e);
                None
            }
        }
    }

    /// The manifest recorded by the last completed push. Missing or corrupt ⇒ None.
    pub async fn fetch_cached(&self) -> Option<Manifest> {
        let bytes = match tokio::fs::read(&self.cache_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("No cached manifest at {}: {}", self.cache_path.display(), e);
                return None;
            }
        };

        match Manifest::from_json(&bytes) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                warn!("Cached manifest {} is corrupt: {}", self.cache_path.display(), e);
                None
            }
        }
    }

    /// Record `manifest` in the store, then in the local cache.
    pub async fn publish(&self, manifest: &Manifest) -> Result<()> {
        let json = manifest.to_json()?;

        self.store
            .put(&self.key, Bytes::from(json.clone()), "application/json")
            .await?;

        if let Some(dir) = self.cache_path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| io_err(dir, e))?;
        }

        // Replaced atomically via a sibling temp file.
        let mut tmp = self.cache_path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| io_err(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.cache_path)
            .await
            .map_err(|e| io_err(&self.cache_path, e))?;

        info!("Published manifest of {} files to {}", manifest.len(), self.store.name());
        Ok(())
    }

    /// Best-effort removal of the remote manifest, forcing the next push to resync.
    pub async fn discard_remote(&self) {
        info!("Removing {} from {}", self.key, self.store.name());
        if let Err(e) = delete_batch(self.store.as_ref(), &[self.key.clone()]).await {
            warn!("Failed to remove {} from {}: {}", self.key, self.store.name(), e);
        }
    }
}
