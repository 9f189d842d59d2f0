//! Resolution of a tenant's source access token.

use crate::cache::ScopedCache;
use crate::publish::store::ObjectStore;
use crate::utils::{Result, SyncError};
use serde::{Deserialize, Serialize};

/// Where a tenant's bearer token comes from.
///
/// In TOML: `token = { env = "VAR" }`, `token = { value = "..." }` or
/// `token = { key_store = "object-key" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSource {
    Env(String),
    Value(String),
    KeyStore(String),
}

impl TokenSource {
    /// Resolve the token for `tenant_id`.
    ///
    /// Key store lookups go through `cache`, scoped to the tenant.
    pub async fn resolve(
        &self,
        tenant_id: &str,
        key_store: Option<&dyn ObjectStore>,
        cache: &ScopedCache,
    ) -> Result<String> {
        let token = match self {
            TokenSource::Value(token) => token.clone(),
            TokenSource::Env(var) => std::env::var(var).map_err(|_| {
                SyncError::Config(format!("tenant {}: environment variable {} is not set", tenant_id, var))
            })?,
            TokenSource::KeyStore(key) => {
                let store = key_store.ok_or_else(|| {
                    SyncError::Config(format!(
                        "tenant {} reads its token from the key store, but store.key_store is not set",
                        tenant_id
                    ))
                })?;

                let bytes = cache
                    .get_or_try_fetch(tenant_id, key, || async move {
                        store.get(key).await?.ok_or_else(|| {
                            SyncError::Auth(format!("no access token for tenant {} in {}", tenant_id, store.name()))
                        })
                    })
                    .await?;

                String::from_utf8(bytes.to_vec()).map_err(|_| {
                    SyncError::MalformedResponse(format!("access token for tenant {} is not UTF-8", tenant_id))
                })?
            }
        };

        let token = token.trim().to_string();
        if token.is_empty() {
            return Err(SyncError::Auth(format!("empty access token for tenant {}", tenant_id)));
        }
        Ok(token)
    }
}
