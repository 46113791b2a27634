//! MCP-backed tool host.

use super::{ToolError, ToolHost, ToolLauncher, ToolSession};
use crate::config::ToolConfig;
use crate::model::{ToolCall, ToolSpec};
use mcp::{Server, ServerConfig};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Tool host backed by one MCP server process.
pub struct McpToolHost {
    server: Server,
    specs: Vec<ToolSpec>,
}

impl McpToolHost {
    /// Spawn the server, run the handshake and cache its tool specs.
    ///
    /// The process is shut down again if the handshake fails.
    pub async fn spawn(config: ServerConfig) -> Result<Self, ToolError> {
        let name = config.name.clone();
        let server = Server::spawn(config)
            .await
            .map_err(|e| ToolError::Launch(e.to_string()))?;

        if let Err(e) = server.initialize().await {
            if let Err(shutdown) = server.shutdown().await {
                warn!(server = %name, error = %shutdown, "failed to stop MCP server after handshake error");
            }
            return Err(ToolError::Launch(format!("{name}: {e}")));
        }

        let specs: Vec<ToolSpec> = server.tools().await.into_iter().map(ToolSpec::from).collect();
        info!(server = %name, tools = specs.len(), "tool session ready");
        Ok(Self { server, specs })
    }
}

impl ToolHost for McpToolHost {
    fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, ToolError> {
        if !self.specs.iter().any(|spec| spec.name == call.name) {
            return Err(ToolError::NotFound(call.name.clone()));
        }

        let arguments = match &call.input {
            Value::Null => None,
            Value::Object(_) => Some(call.input.clone()),
            other => {
                return Err(ToolError::InvalidInput(format!(
                    "arguments for {} must be an object, got {other}",
                    call.name
                )));
            }
        };

        debug!(tool = %call.name, "calling tool");
        let result = self.server.call_tool(&call.name, arguments).await?;
        let text = result.text();

        // Listing servers answer with JSON documents inside text blocks.
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

impl ToolSession for McpToolHost {
    async fn close(self) {
        let name = self.server.name().to_string();
        if let Err(e) = self.server.shutdown().await {
            warn!(server = %name, error = %e, "failed to stop MCP server");
        }
    }
}

/// Launches one MCP server per invocation from a fixed config.
#[derive(Debug, Clone)]
pub struct McpLauncher {
    config: ServerConfig,
}

impl McpLauncher {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    pub fn from_config(tool: &ToolConfig) -> Self {
        Self::new(
            ServerConfig::new(&tool.name, &tool.command)
                .args(tool.args.iter().cloned())
                .request_timeout(Duration::from_secs(tool.request_timeout_secs)),
        )
    }
}

impl ToolLauncher for McpLauncher {
    type Session = McpToolHost;

    async fn launch(&self) -> Result<McpToolHost, ToolError> {
        McpToolHost::spawn(self.config.clone()).await
    }
}
