//! Tool sessions exposed to the model.

pub mod errors;
mod host;
mod mcp_host;

pub use errors::ToolError;
pub use host::{ToolHost, ToolLauncher, ToolSession};
pub use mcp_host::{McpLauncher, McpToolHost};
