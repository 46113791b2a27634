//! The caller-facing query surface.

use std::sync::Arc;
use tracing::{error, info};

use crate::catalog::{CatalogCache, CatalogProbe, ModelCatalog, OllamaProber};
use crate::config::Config;
use crate::invoke::{InvokeOptions, Invoker, QueryRequest};
use crate::model::{BackendFactory, ProviderFactory};
use crate::normalize::{QueryResult, normalize};
use crate::select::{BackendDescriptor, Selector};
use crate::tools::{McpLauncher, ToolLauncher};

/// Prober, selector, invoker and normalizer wired together.
pub struct QueryService<P = OllamaProber, L = McpLauncher, F = ProviderFactory> {
    catalog: CatalogCache<P>,
    selector: Selector,
    invoker: Invoker<L, F>,
}

impl QueryService {
    /// Production wiring: Ollama prober, MCP launcher, Ollama/OpenAI backends.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            CatalogCache::new(
                OllamaProber::from_config(&config.local),
                config.local.catalog_ttl(),
            ),
            Selector::from_config(config),
            Invoker::new(
                McpLauncher::from_config(&config.tool),
                ProviderFactory::from_config(config),
                InvokeOptions::from_config(config),
            ),
        )
    }
}

impl<P, L, F> QueryService<P, L, F>
where
    P: CatalogProbe,
    L: ToolLauncher,
    F: BackendFactory,
{
    pub fn new(catalog: CatalogCache<P>, selector: Selector, invoker: Invoker<L, F>) -> Self {
        Self {
            catalog,
            selector,
            invoker,
        }
    }

    /// The local catalog, re-probed if stale.
    pub async fn catalog(&self) -> Arc<ModelCatalog> {
        self.catalog.get().await
    }

    /// Force a re-probe of the local catalog.
    pub async fn refresh_catalog(&self) -> Arc<ModelCatalog> {
        self.catalog.refresh().await
    }

    /// Which backend a request for `requested_model` would use right now.
    pub async fn resolve(&self, requested_model: Option<&str>) -> BackendDescriptor {
        let catalog = self.catalog.get().await;
        self.selector.select(
            requested_model,
            &catalog,
            self.invoker.factory().has_remote_credential(),
        )
    }

    /// Run one request end to end. Never fails; failures are display text.
    pub async fn query(&self, request: &QueryRequest) -> QueryResult {
        let descriptor = self.resolve(request.requested_model.as_deref()).await;
        info!(%descriptor, "resolved backend");
        normalize(self.invoker.invoke(&descriptor, request).await)
    }

    /// Blocking form of [`QueryService::query`] returning only the text.
    ///
    /// Safe to call from inside an async runtime: the work then runs on a
    /// scoped helper thread with its own runtime.
    pub fn handle_query(&self, text: &str, requested_model: Option<&str>) -> String {
        let request = QueryRequest::new(text).with_model(requested_model);
        if tokio::runtime::Handle::try_current().is_err() {
            return self.block_on_query(&request);
        }
        std::thread::scope(|scope| {
            scope
                .spawn(|| self.block_on_query(&request))
                .join()
                .unwrap_or_else(|_| {
                    error!("query thread panicked");
                    UNAVAILABLE.to_string()
                })
        })
    }

    fn block_on_query(&self, request: &QueryRequest) -> String {
        match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime.block_on(self.query(request)).display_text,
            Err(e) => {
                error!(error = %e, "failed to start runtime for query");
                UNAVAILABLE.to_string()
            }
        }
    }
}

const UNAVAILABLE: &str = "The search service is unavailable right now.";
