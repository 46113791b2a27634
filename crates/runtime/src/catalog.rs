//! Local model catalog: probing the Ollama daemon and caching the result.
//!
//! A missing daemon is an ordinary condition here. Every probe failure
//! collapses into an empty [`ModelCatalog`] and is only logged.

use serde::Deserialize;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::LocalConfig;

/// Model names advertised by the local backend, in server order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelCatalog(Vec<String>);

impl ModelCatalog {
    pub fn new(names: Vec<String>) -> Self {
        Self(names)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|n| n == name)
    }

    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ModelCatalog {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Something that can list local models. Never fails.
pub trait CatalogProbe: Send + Sync {
    fn probe(&self) -> impl Future<Output = ModelCatalog> + Send;
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

/// Probes `GET <base_url>/api/tags`.
#[derive(Debug, Clone)]
pub struct OllamaProber {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl OllamaProber {
    pub fn new(base_url: impl AsRef<str>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.as_ref().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn from_config(local: &LocalConfig) -> Self {
        Self::new(&local.base_url, local.probe_timeout())
    }

    async fn fetch(&self) -> Result<ModelCatalog, String> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| format!("request to {url} failed: {e}"))?;

        if !response.status().is_success() {
            return Err(format!("{url} answered {}", response.status()));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| format!("unreadable body from {url}: {e}"))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

impl CatalogProbe for OllamaProber {
    async fn probe(&self) -> ModelCatalog {
        match self.fetch().await {
            Ok(catalog) => {
                debug!(models = catalog.len(), "probed local models");
                catalog
            }
            Err(reason) => {
                debug!(%reason, "local model backend unavailable");
                ModelCatalog::empty()
            }
        }
    }
}

struct Snapshot {
    catalog: Arc<ModelCatalog>,
    probed_at: Instant,
}

/// Last probed catalog, re-probed once it is older than `ttl`.
///
/// Concurrent refreshes may race; the last one to finish wins. The lock is
/// only held to swap or clone the snapshot, never across a probe.
pub struct CatalogCache<P> {
    prober: P,
    ttl: Duration,
    latest: RwLock<Option<Snapshot>>,
}

impl<P: CatalogProbe> CatalogCache<P> {
    pub fn new(prober: P, ttl: Duration) -> Self {
        Self {
            prober,
            ttl,
            latest: RwLock::new(None),
        }
    }

    /// The cached catalog if it is younger than the ttl, otherwise a fresh
    /// probe.
    pub async fn get(&self) -> Arc<ModelCatalog> {
        match self.fresh() {
            Some(catalog) => catalog,
            None => self.refresh().await,
        }
    }

    /// Probe now and replace the cached catalog.
    pub async fn refresh(&self) -> Arc<ModelCatalog> {
        let catalog = Arc::new(self.prober.probe().await);
        let mut latest = self.latest.write().unwrap_or_else(|e| e.into_inner());
        *latest = Some(Snapshot {
            catalog: Arc::clone(&catalog),
            probed_at: Instant::now(),
        });
        info!(models = catalog.len(), "local model catalog refreshed");
        catalog
    }

    /// The cached catalog regardless of age, without probing.
    pub fn peek(&self) -> Option<Arc<ModelCatalog>> {
        let latest = self.latest.read().unwrap_or_else(|e| e.into_inner());
        latest.as_ref().map(|s| Arc::clone(&s.catalog))
    }

    fn fresh(&self) -> Option<Arc<ModelCatalog>> {
        let latest = self.latest.read().unwrap_or_else(|e| e.into_inner());
        latest
            .as_ref()
            .filter(|s| s.probed_at.elapsed() < self.ttl)
            .map(|s| Arc::clone(&s.catalog))
    }
}
