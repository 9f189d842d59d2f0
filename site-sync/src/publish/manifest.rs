//! Content-addressed manifest of a directory tree.
//!
//! A manifest maps forward-slash relative paths to the lowercase hex SHA-1 of
//! the file contents. Keys are kept sorted so the JSON form is canonical.

use crate::fs::walker::{walk_files, WalkOptions};
use crate::utils::Result;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    files: BTreeMap<String, String>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, hash: impl Into<String>) {
        self.files.insert(path.into(), hash.into());
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Canonical JSON: a flat object with sorted keys.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Manifest {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            files: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Lowercase hex SHA-1 of `bytes`.
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha1::digest(bytes))
}

/// Compute the manifest of every regular file under `root`.
///
/// Directories and unreadable files are skipped; a missing root yields an
/// empty manifest.
pub fn generate_blocking(root: &Path, options: &WalkOptions) -> Manifest {
    walk_files(root, options)
        .into_iter()
        .filter_map(|file| match std::fs::read(&file.path) {
            Ok(bytes) => Some((file.key, hash_bytes(&bytes))),
            Err(e) => {
                debug!("Skipping unreadable {}: {}", file.path.display(), e);
                None
            }
        })
        .collect()
}

/// Async wrapper around [`generate_blocking`]; hashing runs on the blocking pool.
pub async fn generate(root: &Path) -> Result<Manifest> {
    let root = root.to_path_buf();
    let manifest =
        tokio::task::spawn_blocking(move || generate_blocking(&root, &WalkOptions::default()))
            .await?;
    Ok(manifest)
}
