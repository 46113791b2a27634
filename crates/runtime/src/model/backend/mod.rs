//! LLM provider backends.

mod ollama;
mod openai;

pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;

use super::{Backend, Message, ModelError, ModelRequest, ModelResponse, Part, ToolSpec};
use crate::config::Config;
use crate::select::{BackendDescriptor, Provider};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Either provider, chosen at runtime from a [`BackendDescriptor`].
pub enum ProviderBackend {
    Ollama(OllamaBackend),
    OpenAi(OpenAiBackend),
}

impl Backend for ProviderBackend {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        match self {
            Self::Ollama(backend) => backend.call(request).await,
            Self::OpenAi(backend) => backend.call(request).await,
        }
    }
}

impl std::fmt::Display for ProviderBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ollama(backend) => std::fmt::Display::fmt(backend, f),
            Self::OpenAi(backend) => std::fmt::Display::fmt(backend, f),
        }
    }
}

/// Turns a descriptor into a backend for one invocation.
pub trait BackendFactory: Send + Sync {
    type Backend: Backend;

    fn build(&self, descriptor: &BackendDescriptor) -> Result<Self::Backend, ModelError>;

    /// Whether a remote credential is available to this factory.
    fn has_remote_credential(&self) -> bool;
}

/// Builds Ollama or OpenAI backends sharing one HTTP connection pool.
#[derive(Debug, Clone)]
pub struct ProviderFactory {
    http: reqwest::Client,
    local_base_url: String,
    remote_base_url: String,
    api_key: Option<String>,
}

impl ProviderFactory {
    pub fn new(local_base_url: impl Into<String>, remote_base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            local_base_url: local_base_url.into(),
            remote_base_url: remote_base_url.into(),
            api_key: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let factory = Self::new(&config.local.base_url, &config.remote.base_url);
        match &config.remote.api_key {
            Some(key) => factory.api_key(key),
            None => factory,
        }
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.api_key = (!key.trim().is_empty()).then_some(key);
        self
    }
}

impl BackendFactory for ProviderFactory {
    type Backend = ProviderBackend;

    fn build(&self, descriptor: &BackendDescriptor) -> Result<ProviderBackend, ModelError> {
        match descriptor.provider() {
            Provider::Local => Ok(ProviderBackend::Ollama(
                OllamaBackend::new(self.http.clone(), descriptor.model_name())
                    .base_url(&self.local_base_url),
            )),
            Provider::Remote => {
                let key = self
                    .api_key
                    .as_ref()
                    .ok_or_else(|| ModelError::MissingCredential(descriptor.to_string()))?;
                Ok(ProviderBackend::OpenAi(
                    OpenAiBackend::new(self.http.clone(), key, descriptor.model_name())
                        .base_url(&self.remote_base_url),
                ))
            }
        }
    }

    fn has_remote_credential(&self) -> bool {
        self.api_key.is_some()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire types shared by the OpenAI-style function calling APIs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ApiFunction<'a>,
}

#[derive(Debug, Serialize)]
struct ApiFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

fn tools_to_api(specs: &[ToolSpec]) -> Vec<ApiTool<'_>> {
    specs
        .iter()
        .map(|spec| ApiTool {
            kind: "function",
            function: ApiFunction {
                name: &spec.name,
                description: &spec.description,
                parameters: &spec.schema,
            },
        })
        .collect()
}

/// Map tool call ids to tool names across the conversation.
///
/// Ollama correlates tool results by name rather than id.
fn tool_call_names(messages: &[Message]) -> HashMap<&str, &str> {
    messages
        .iter()
        .flat_map(|m| m.parts.iter())
        .filter_map(|part| match part {
            Part::ToolCall(call) => Some((call.id.as_str(), call.name.as_str())),
            _ => None,
        })
        .collect()
}

/// Tool arguments as the model sent them.
///
/// JSON-encoded strings are decoded. Anything undecodable is passed through
/// unchanged so the tool host can reject it back to the model.
fn parse_arguments(arguments: Value) -> Value {
    match arguments {
        Value::String(raw) if raw.trim().is_empty() => Value::Object(Default::default()),
        Value::String(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
        other => other,
    }
}

fn trim_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
