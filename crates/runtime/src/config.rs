//! Configuration loading from staysearch.toml.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_INSTRUCTIONS: &str = "You help book an apartment on Airbnb. \
Provide a list of apartments based on price per night, location, and amenities. \
Check the availability for the given dates.";

/// Top-level configuration. Every field has a default, so an empty file
/// (or no file) is valid.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub local: LocalConfig,
    pub remote: RemoteConfig,
    pub tool: ToolConfig,
    pub invoke: InvokeConfig,
}

/// Locally served models (Ollama).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    pub base_url: String,
    /// Preferred local model when nothing was requested.
    pub default_model: Option<String>,
    /// Used when no local model is advertised and no credential is set.
    pub fallback_model: String,
    pub probe_timeout_secs: u64,
    /// Catalog entries older than this are re-probed.
    pub catalog_ttl_secs: u64,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            default_model: None,
            fallback_model: "llama3.2:latest".to_string(),
            probe_timeout_secs: 5,
            catalog_ttl_secs: 30,
        }
    }
}

impl LocalConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn catalog_ttl(&self) -> Duration {
        Duration::from_secs(self.catalog_ttl_secs)
    }
}

/// Remote hosted models (OpenAI-compatible).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
        }
    }
}

/// The lodging-search MCP server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            name: "airbnb".to_string(),
            command: "npx".to_string(),
            args: vec![
                "-y".to_string(),
                "@openbnb/mcp-server-airbnb".to_string(),
                "--ignore-robots-txt".to_string(),
            ],
            request_timeout_secs: 60,
        }
    }
}

/// Limits for one tool-augmented invocation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InvokeConfig {
    pub timeout_secs: u64,
    pub max_turns: usize,
    pub max_tokens: u32,
    pub instructions: Option<String>,
}

impl Default for InvokeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            max_turns: 8,
            max_tokens: 4096,
            instructions: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Overlay environment values: `OPENAI_API_KEY` and `OLLAMA_HOST`.
    ///
    /// Takes a lookup function so callers (and tests) decide where values
    /// come from.
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.remote.api_key = Some(key);
        }
        if let Some(host) = lookup("OLLAMA_HOST").filter(|h| !h.trim().is_empty()) {
            self.local.base_url = normalize_ollama_host(&host);
        }
        self
    }

    pub fn instructions(&self) -> &str {
        self.invoke
            .instructions
            .as_deref()
            .unwrap_or(DEFAULT_INSTRUCTIONS)
    }
}

/// `OLLAMA_HOST` is commonly set as a bare `host:port`.
fn normalize_ollama_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),
}
