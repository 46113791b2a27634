//! MCP (Model Context Protocol) client library.
//!
//! This crate speaks newline-delimited JSON-RPC 2.0 to an MCP server running
//! as a child process on stdio.
//!
//! # Example
//!
//! ```no_run
//! use mcp::{Server, ServerConfig};
//!
//! # async fn example() -> mcp::Result<()> {
//! let config = ServerConfig::from_command_line(
//!     "airbnb",
//!     "npx -y @openbnb/mcp-server-airbnb --ignore-robots-txt",
//! )?;
//!
//! let server = Server::spawn(config).await?;
//! server.initialize().await?;
//!
//! for tool in server.tools().await {
//!     println!("Tool: {}", tool.name);
//! }
//!
//! let result = server
//!     .call_tool("airbnb_search", Some(serde_json::json!({ "location": "Paris" })))
//!     .await?;
//! println!("{}", result.text());
//!
//! server.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod protocol;
mod server;

pub use error::{Error, Result};
pub use protocol::{
    CallToolParams, CallToolResult, IncomingMessage, InitializeParams, InitializeResult,
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, ListToolsResult, PROTOCOL_VERSION,
    RequestId, ServerInfo, Tool, ToolContent,
};
pub use server::{DEFAULT_TIMEOUT, MAX_OUTPUT_SIZE, Server, ServerConfig};
