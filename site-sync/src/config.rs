//! Configuration management for site-sync.
//!
//! Loads configuration from a TOML file with `SITE_SYNC__`-prefixed
//! environment variable overrides (e.g. `SITE_SYNC__STORE__ENDPOINT`).

use crate::tenant::Tenant;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub performance: PerformanceConfig,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub tenants: Vec<Tenant>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Base URL of the delta feed / metadata API
    #[serde(default = "default_source_api_url")]
    pub api_url: String,

    /// Base URL of the file content API
    #[serde(default = "default_source_content_url")]
    pub content_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Object store endpoint (path-style addressing)
    #[serde(default = "default_store_endpoint")]
    pub endpoint: String,

    /// Key of the published manifest inside each tenant store
    #[serde(default = "default_manifest_key")]
    pub manifest_key: String,

    /// Key of the diagnostic page inside each tenant store
    #[serde(default = "default_error_key")]
    pub error_key: String,

    /// Store holding per-tenant source tokens, keyed by tenant id
    #[serde(default)]
    pub key_store: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the per-tenant source mirrors
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Root of the per-tenant build outputs
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Local copies of the last published manifests
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Upper bound on in-flight remote requests per tenant operation
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_source_api_url() -> String {
    "https://api.dropboxapi.com".to_string()
}

fn default_source_content_url() -> String {
    "https://content.dropboxapi.com".to_string()
}

fn default_store_endpoint() -> String {
    "http://localhost:9000".to_string()
}

fn default_manifest_key() -> String {
    ".site-manifest".to_string()
}

fn default_error_key() -> String {
    "_error.html".to_string()
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("/var/lib/site-sync/src")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("/var/lib/site-sync/build")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("/var/lib/site-sync/manifests")
}

fn default_max_concurrent_requests() -> usize {
    16
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api_url: default_source_api_url(),
            content_url: default_source_content_url(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: default_store_endpoint(),
            manifest_key: default_manifest_key(),
            error_key: default_error_key(),
            key_store: None,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            output_dir: default_output_dir(),
            cache_dir: default_cache_dir(),
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: default_max_concurrent_requests(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file plus environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("SITE_SYNC")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text, without environment overrides.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would make tenants collide on disk or in a store.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.performance.max_concurrent_requests == 0 {
            anyhow::bail!("performance.max_concurrent_requests must be at least 1");
        }

        let mut ids = HashSet::new();
        let mut stores = HashSet::new();
        for tenant in &self.tenants {
            if tenant.id.is_empty() || tenant.id.contains(['/', '\\']) || tenant.id == ".." {
                anyhow::bail!("invalid tenant id {:?}", tenant.id);
            }
            if tenant.store.is_empty() {
                anyhow::bail!("tenant {} has no store", tenant.id);
            }
            if !ids.insert(tenant.id.as_str()) {
                anyhow::bail!("duplicate tenant id {}", tenant.id);
            }
            if !stores.insert(tenant.store.as_str()) {
                anyhow::bail!("store {} is shared by more than one tenant", tenant.store);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildStep;
    use crate::tenant::TokenSource;

    const SAMPLE: &str = r#"
        [store]
        endpoint = "http://store.test"
        key_store = "source-keys"

        [paths]
        staging_dir = "/tmp/src"
        output_dir = "/tmp/build"
        cache_dir = "/tmp/manifests"

        [[tenants]]
        id = "43720278"
        store = "example.com"
        source = { root = "/site", token = { key_store = "43720278" } }
        build = [
            { step = "copy", from = "images", to = "images" },
            { step = "clean", path = "_code" },
        ]

        [[tenants]]
        id = "544017"
        store = "example-dev"
        source = { root = "", token = { env = "SOURCE_TOKEN" } }
    "#;

    #[test]
    fn test_parse_sample() {
        let config = Config::from_toml_str(SAMPLE).unwrap();

        assert_eq!(config.store.endpoint, "http://store.test");
        assert_eq!(config.store.manifest_key, ".site-manifest");
        assert_eq!(config.store.key_store.as_deref(), Some("source-keys"));
        assert_eq!(config.performance.max_concurrent_requests, 16);
        assert_eq!(config.tenants.len(), 2);

        let tenant = &config.tenants[0];
        assert_eq!(tenant.source.root, "/site");
        assert!(matches!(tenant.source.token, TokenSource::KeyStore(ref k) if k == "43720278"));
        assert!(matches!(tenant.build[1], BuildStep::Clean(ref o) if o.path == "_code"));
        assert!(config.tenants[1].build.is_empty());
    }

    #[test]
    fn test_defaults_when_empty() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.source.api_url, "https://api.dropboxapi.com");
        assert_eq!(config.store.error_key, "_error.html");
        assert_eq!(config.log.level, "info");
        assert!(config.tenants.is_empty());
    }

    #[test]
    fn test_duplicate_tenant_rejected() {
        let toml = r#"
            [[tenants]]
            id = "a"
            store = "one"
            source = { root = "", token = { value = "t" } }

            [[tenants]]
            id = "a"
            store = "two"
            source = { root = "", token = { value = "t" } }
        "#;
        assert!(Config::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_shared_store_rejected() {
        let toml = r#"
            [[tenants]]
            id = "a"
            store = "same"
            source = { root = "", token = { value = "t" } }

            [[tenants]]
            id = "b"
            store = "same"
            source = { root = "", token = { value = "t" } }
        "#;
        assert!(Config::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_path_like_tenant_id_rejected() {
        let toml = r#"
            [[tenants]]
            id = "../etc"
            store = "x"
            source = { root = "", token = { value = "t" } }
        "#;
        assert!(Config::from_toml_str(toml).is_err());
    }
}
