use thiserror::Error;

/// Errors that can occur while acquiring or using a tool session.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("failed to start tool server: {0}")]
    Launch(String),
    #[error("tool session lost: {0}")]
    SessionLost(String),
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("execution failed: {0}")]
    Execution(String),
}

impl ToolError {
    /// Whether the session is unusable after this error.
    ///
    /// Non-fatal errors are reported back to the model as failed tool
    /// results so it can correct itself.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Launch(_) | Self::SessionLost(_))
    }
}

impl From<mcp::Error> for ToolError {
    fn from(err: mcp::Error) -> Self {
        if err.is_fatal() {
            Self::SessionLost(err.to_string())
        } else {
            Self::Execution(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mcp_errors_split_by_fatality() {
        let failed = ToolError::from(mcp::Error::ToolCallFailed("bad dates".into()));
        assert!(matches!(failed, ToolError::Execution(_)));
        assert!(!failed.is_fatal());

        let exited = ToolError::from(mcp::Error::ServerExited);
        assert!(matches!(exited, ToolError::SessionLost(_)));
        assert!(exited.is_fatal());
    }
}
