//! MCP error types.

use crate::protocol::JsonRpcError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("empty server command")]
    EmptyCommand,

    #[error("server I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("server not initialized")]
    NotInitialized,

    #[error("server exited unexpectedly")]
    ServerExited,

    #[error("no response from server within {0:?}")]
    Timeout(Duration),

    #[error("failed to encode or decode message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("JSON-RPC error: {0}")]
    JsonRpc(#[from] JsonRpcError),

    #[error("tool call failed: {0}")]
    ToolCallFailed(String),

    #[error("server line exceeds {max} bytes")]
    OutputTooLarge { max: usize },
}

impl Error {
    /// Whether the session can no longer be used after this error.
    ///
    /// A tool reporting `isError` or a JSON-RPC error for a single call leaves
    /// the process healthy; everything else means the channel is gone.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::ToolCallFailed(_) | Error::JsonRpc(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
