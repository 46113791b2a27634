//! Backend selection.
//!
//! Precedence, first match wins:
//!
//! 1. the requested model, if the local catalog advertises it;
//! 2. the remote default, if a remote credential is present;
//! 3. the configured local default if advertised, else the first local model;
//! 4. the local fallback name, even though nothing is known to serve it.
//!
//! Selection always yields a descriptor. When rule 4 picks a model that is
//! not running, the invoker reports the connection failure.

use crate::catalog::ModelCatalog;
use crate::config::Config;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Local,
    Remote,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// The resolved `{provider, model}` pair for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDescriptor {
    provider: Provider,
    model_name: String,
}

impl BackendDescriptor {
    pub fn local(model_name: impl Into<String>) -> Self {
        Self {
            provider: Provider::Local,
            model_name: model_name.into(),
        }
    }

    pub fn remote(model_name: impl Into<String>) -> Self {
        Self {
            provider: Provider::Remote,
            model_name: model_name.into(),
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

impl std::fmt::Display for BackendDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider, self.model_name)
    }
}

/// Fixed names the precedence rules fall back to.
#[derive(Debug, Clone)]
pub struct Selector {
    remote_model: String,
    local_default: Option<String>,
    local_fallback: String,
}

impl Selector {
    pub fn new(remote_model: impl Into<String>, local_fallback: impl Into<String>) -> Self {
        Self {
            remote_model: remote_model.into(),
            local_default: None,
            local_fallback: local_fallback.into(),
        }
    }

    pub fn local_default(mut self, model: impl Into<String>) -> Self {
        self.local_default = Some(model.into());
        self
    }

    pub fn from_config(config: &Config) -> Self {
        let selector = Self::new(&config.remote.model, &config.local.fallback_model);
        match &config.local.default_model {
            Some(model) => selector.local_default(model),
            None => selector,
        }
    }

    pub fn select(
        &self,
        requested_model: Option<&str>,
        catalog: &ModelCatalog,
        has_remote_credential: bool,
    ) -> BackendDescriptor {
        let requested = requested_model.map(str::trim).filter(|m| !m.is_empty());

        if let Some(model) = requested {
            if catalog.contains(model) {
                return BackendDescriptor::local(model);
            }
            info!(requested = %model, "requested model is not served locally, falling through");
        }

        if has_remote_credential {
            return BackendDescriptor::remote(&self.remote_model);
        }

        if let Some(preferred) = self
            .local_default
            .as_deref()
            .filter(|m| catalog.contains(m))
        {
            return BackendDescriptor::local(preferred);
        }

        match catalog.first() {
            Some(first) => BackendDescriptor::local(first),
            None => BackendDescriptor::local(&self.local_fallback),
        }
    }
}
