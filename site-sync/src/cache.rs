//! Read-through cache scoped to a single deploy run.
//!
//! Entries are keyed by `(scope, key)`, where the scope is a tenant id, so
//! tenants deployed in the same run never see each other's values. The cache
//! is dropped with the run.

use crate::utils::Result;
use bytes::Bytes;
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct ScopedCache {
    entries: RwLock<HashMap<(String, String), Bytes>>,
}

impl ScopedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, scope: &str, key: &str) -> Option<Bytes> {
        self.entries
            .read()
            .await
            .get(&(scope.to_string(), key.to_string()))
            .cloned()
    }

    /// Return the cached value, or run `fetch` and cache a successful result.
    ///
    /// Failures are not cached.
    pub async fn get_or_try_fetch<F, Fut>(&self, scope: &str, key: &str, fetch: F) -> Result<Bytes>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes>>,
    {
        if let Some(value) = self.get(scope, key).await {
            return Ok(value);
        }

        let value = fetch().await?;
        self.entries
            .write()
            .await
            .insert((scope.to_string(), key.to_string()), value.clone());
        Ok(value)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
