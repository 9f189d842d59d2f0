//! Runs tenants through pull → build → push and records the outcome.

use crate::build::{Builder, StepPipeline};
use crate::cache::ScopedCache;
use crate::config::Config;
use crate::mirror::source::{HttpSourceClient, SourceClient};
use crate::mirror::SourceMirror;
use crate::publish::remote_manifest::RemoteManifestProvider;
use crate::publish::store::{HttpObjectStore, ObjectStore};
use crate::publish::{DiffPublisher, PushSummary};
use crate::reporter::ErrorReporter;
use crate::tenant::{Tenant, TenantRegistry};
use crate::utils::{Limiter, Result};
use futures_util::future::join_all;
use reqwest::Client;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{error, info};

/// Builds clients for the remote services a tenant talks to.
pub trait Remotes: Send + Sync {
    fn object_store(&self, name: &str) -> Arc<dyn ObjectStore>;

    fn source(&self, token: &str, root: &str) -> Arc<dyn SourceClient>;
}

/// HTTP clients sharing one connection pool.
pub struct HttpRemotes {
    client: Client,
    api_url: String,
    content_url: String,
    store_endpoint: String,
}

impl HttpRemotes {
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("site-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_url: config.source.api_url.clone(),
            content_url: config.source.content_url.clone(),
            store_endpoint: config.store.endpoint.clone(),
        })
    }
}

impl Remotes for HttpRemotes {
    fn object_store(&self, name: &str) -> Arc<dyn ObjectStore> {
        Arc::new(HttpObjectStore::new(
            self.client.clone(),
            self.store_endpoint.clone(),
            name,
        ))
    }

    fn source(&self, token: &str, root: &str) -> Arc<dyn SourceClient> {
        Arc::new(HttpSourceClient::new(
            self.client.clone(),
            self.api_url.clone(),
            self.content_url.clone(),
            token,
            root,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    Published(PushSummary),
    /// Error chain of the failed stage
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployReport {
    pub tenant: String,
    pub outcome: DeployOutcome,
}

impl DeployReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, DeployOutcome::Published(_))
    }
}

impl fmt::Display for DeployReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            DeployOutcome::Published(summary) => write!(
                f,
                "{}: published ({}, {} uploaded, {} deleted, {} unchanged)",
                self.tenant, summary.mode, summary.uploaded, summary.deleted, summary.unchanged
            ),
            DeployOutcome::Failed(detail) => write!(f, "{}: failed: {}", self.tenant, detail),
        }
    }
}

pub struct DeployOrchestrator {
    config: Config,
    registry: TenantRegistry,
    remotes: Arc<dyn Remotes>,
    builder: Option<Arc<dyn Builder>>,
    limiter: Limiter,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DeployOrchestrator {
    pub fn new(config: Config, remotes: Arc<dyn Remotes>) -> Self {
        let registry = TenantRegistry::new(config.tenants.clone());
        let limiter = Limiter::new(config.performance.max_concurrent_requests);
        Self {
            config,
            registry,
            remotes,
            builder: None,
            limiter,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Use HTTP clients for every remote.
    pub fn from_config(config: Config) -> Result<Self> {
        let remotes = HttpRemotes::from_config(&config)?;
        Ok(Self::new(config, Arc::new(remotes)))
    }

    /// Build every tenant with `builder` instead of its configured steps.
    pub fn with_builder(mut self, builder: Arc<dyn Builder>) -> Self {
        self.builder = Some(builder);
        self
    }

    pub fn registry(&self) -> &TenantRegistry {
        &self.registry
    }

    pub fn staging_dir(&self, tenant_id: &str) -> PathBuf {
        self.config.paths.staging_dir.join(tenant_id)
    }

    pub fn output_dir(&self, tenant_id: &str) -> PathBuf {
        self.config.paths.output_dir.join(tenant_id)
    }

    /// Deploy every tenant in `ids` concurrently.
    ///
    /// Fails only when an id is unknown, before any tenant is touched.
    /// Per-tenant failures are reported in the returned list.
    pub async fn deploy(&self, ids: &[String]) -> Result<Vec<DeployReport>> {
        let tenants = self.registry.resolve_all(ids)?;
        let cache = ScopedCache::new();

        info!("Deploying {} tenant(s)", tenants.len());
        let runs = tenants.iter().map(|tenant| self.deploy_tenant(tenant, &cache));
        Ok(join_all(runs).await)
    }

    /// Mirror one tenant's source into its staging directory.
    pub async fn pull(&self, id: &str) -> Result<String> {
        let tenant = self.registry.get(id)?;
        let lock = self.tenant_lock(id).await;
        let _guard = lock.lock().await;

        self.pull_tenant(tenant, &ScopedCache::new()).await
    }

    /// Publish one tenant's output directory as it stands.
    pub async fn push(&self, id: &str) -> Result<PushSummary> {
        let tenant = self.registry.get(id)?;
        let lock = self.tenant_lock(id).await;
        let _guard = lock.lock().await;

        self.push_tenant(tenant, self.remotes.object_store(&tenant.store))
            .await
    }

    async fn tenant_lock(&self, id: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(id.to_string())
            .or_default()
            .clone()
    }

    async fn deploy_tenant(&self, tenant: &Tenant, cache: &ScopedCache) -> DeployReport {
        let lock = self.tenant_lock(&tenant.id).await;
        let _guard = lock.lock().await;

        let started = Instant::now();
        let store = self.remotes.object_store(&tenant.store);
        let reporter = ErrorReporter::new(store.clone(), self.config.store.error_key.clone());

        let outcome = match self.run_tenant(tenant, store, cache).await {
            Ok(summary) => {
                reporter.clear().await;
                info!(
                    "Deploy Succeeded for {} in {:.1}s",
                    tenant.id,
                    started.elapsed().as_secs_f64()
                );
                DeployOutcome::Published(summary)
            }
            Err(detail) => {
                error!("Deploy Failed for {}: {}", tenant.id, detail);
                reporter.set(&detail).await;
                DeployOutcome::Failed(detail)
            }
        };

        DeployReport {
            tenant: tenant.id.clone(),
            outcome,
        }
    }

    /// Returns the failed stage and its error chain on failure.
    async fn run_tenant(
        &self,
        tenant: &Tenant,
        store: Arc<dyn ObjectStore>,
        cache: &ScopedCache,
    ) -> std::result::Result<PushSummary, String> {
        let cursor = self
            .pull_tenant(tenant, cache)
            .await
            .map_err(|e| format!("fetch: {}", error_chain(&e)))?;
        info!("Fetch Succeeded for {} (cursor {})", tenant.id, cursor);

        let source = self.staging_dir(&tenant.id);
        let output = self.output_dir(&tenant.id);
        let build_result = match &self.builder {
            Some(builder) => builder.build(&source, &output).await,
            None => {
                StepPipeline::from_steps(tenant.build.iter().cloned())
                    .build(&source, &output)
                    .await
            }
        };
        build_result.map_err(|e| format!("build: {}", error_chain(&e)))?;
        info!("Build Succeeded for {}", tenant.id);

        self.push_tenant(tenant, store)
            .await
            .map_err(|e| format!("publish: {}", error_chain(&e)))
    }

    async fn pull_tenant(&self, tenant: &Tenant, cache: &ScopedCache) -> Result<String> {
        let key_store = self
            .config
            .store
            .key_store
            .as_deref()
            .map(|name| self.remotes.object_store(name));
        let token = tenant
            .source
            .token
            .resolve(&tenant.id, key_store.as_deref(), cache)
            .await?;

        let client = self.remotes.source(&token, &tenant.source.root);
        SourceMirror::new(client, tenant.source.root.clone(), self.limiter.clone())
            .sync(&self.staging_dir(&tenant.id))
            .await
    }

    async fn push_tenant(&self, tenant: &Tenant, store: Arc<dyn ObjectStore>) -> Result<PushSummary> {
        let manifests = RemoteManifestProvider::new(
            store.clone(),
            self.config.store.manifest_key.clone(),
            self.config.paths.cache_dir.clone(),
        );
        DiffPublisher::new(store, manifests, self.limiter.clone())
            .push(&self.output_dir(&tenant.id))
            .await
    }
}

/// An error and each of its sources, outermost first.
///
/// A source already printed by its parent's message is not repeated.
pub fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut out = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !out.ends_with(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        source = cause.source();
    }
    out
}
