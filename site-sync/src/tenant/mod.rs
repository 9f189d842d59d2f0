//! Tenants: one source folder, one build, one destination store each.

pub mod credentials;

use crate::build::BuildStep;
use crate::utils::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use credentials::TokenSource;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    /// Unique tenant identifier (also the staging/output directory name)
    pub id: String,

    /// Name of the object store the site is published to
    pub store: String,

    pub source: SourceRef,

    /// Build steps applied after the source is mirrored into the output
    #[serde(default)]
    pub build: Vec<BuildStep>,
}

/// Where a tenant's source lives and how to authenticate to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    /// Remote folder mirrored for this tenant ("" or "/" for the account root)
    #[serde(default)]
    pub root: String,

    pub token: TokenSource,
}

/// Lookup of configured tenants by id.
#[derive(Debug, Clone, Default)]
pub struct TenantRegistry {
    tenants: HashMap<String, Tenant>,
}

impl TenantRegistry {
    pub fn new(tenants: impl IntoIterator<Item = Tenant>) -> Self {
        Self {
            tenants: tenants.into_iter().map(|t| (t.id.clone(), t)).collect(),
        }
    }

    pub fn get(&self, id: &str) -> Result<&Tenant> {
        self.tenants
            .get(id)
            .ok_or_else(|| SyncError::UnknownTenant(id.to_string()))
    }

    /// Resolve every id, failing on the first unknown one.
    pub fn resolve_all(&self, ids: &[String]) -> Result<Vec<Tenant>> {
        if ids.is_empty() {
            return Err(SyncError::UnknownTenant("no tenant id given".to_string()));
        }
        ids.iter().map(|id| self.get(id).cloned()).collect()
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }
}
