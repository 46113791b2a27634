//! Tool host traits.

use crate::model::{ToolCall, ToolSpec};
use crate::tools::ToolError;
use serde_json::Value;
use std::future::Future;

/// Trait for tool execution hosts.
///
/// Implementations provide tool specifications and execute tool calls.
/// This is the boundary between the model loop and side effects.
pub trait ToolHost: Send + Sync {
    /// Get available tool specifications.
    fn specs(&self) -> &[ToolSpec];

    /// Execute a tool call.
    fn execute(&self, call: &ToolCall) -> impl Future<Output = Result<Value, ToolError>> + Send;
}

/// A tool host with a bounded lifetime, released with [`ToolSession::close`].
pub trait ToolSession: ToolHost {
    /// Tear the session down. Must not fail; problems are logged.
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Acquires a fresh tool session per invocation.
pub trait ToolLauncher: Send + Sync {
    type Session: ToolSession;

    fn launch(&self) -> impl Future<Output = Result<Self::Session, ToolError>> + Send;
}
