use crate::model::ModelError;
use crate::select::{BackendDescriptor, Provider};
use crate::tools::ToolError;
use std::time::Duration;
use thiserror::Error;

/// Which kind of failure stopped an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    EmptyQuery,
    BackendUnreachable,
    ToolSessionFailed,
}

/// A failed invocation, already phrased for the user.
///
/// The message is one short sentence; transport details go to the log.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct InvocationError {
    kind: ErrorKind,
    message: String,
}

impl InvocationError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn empty_query() -> Self {
        Self::new(ErrorKind::EmptyQuery, "Please enter a search query.")
    }

    pub fn backend(descriptor: &BackendDescriptor, err: &ModelError) -> Self {
        let model = descriptor.model_name();
        let message = match (err, descriptor.provider()) {
            (ModelError::Network(_), Provider::Local) => {
                format!("Could not reach the local model service for `{model}`. Is Ollama running?")
            }
            (ModelError::Network(_), Provider::Remote) => {
                format!("Could not reach the remote model service for `{model}`.")
            }
            (ModelError::Api { status: 401 | 403, .. }, _) => {
                "The remote model service rejected the configured credential.".to_string()
            }
            (ModelError::Api { status: 404, .. }, _) => {
                format!("The model `{model}` is not available.")
            }
            (ModelError::Api { status, .. }, _) => {
                format!("The model service for `{model}` answered with HTTP {status}.")
            }
            (ModelError::InvalidResponse(_), _) => {
                format!("The model service for `{model}` returned an unreadable response.")
            }
            (ModelError::MissingCredential(_), _) => {
                "No credential is configured for the remote model service.".to_string()
            }
        };
        Self::new(ErrorKind::BackendUnreachable, message)
    }

    pub fn tool_session(err: &ToolError) -> Self {
        let message = match err {
            ToolError::Launch(_) => "The lodging search tool could not be started.",
            _ => "The lodging search tool stopped responding.",
        };
        Self::new(ErrorKind::ToolSessionFailed, message)
    }

    pub fn timed_out(limit: Duration) -> Self {
        Self::new(
            ErrorKind::ToolSessionFailed,
            format!("The search timed out after {} seconds.", limit.as_secs()),
        )
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_messages_hide_payloads() {
        let local = BackendDescriptor::local("llama3.2:latest");
        let err = InvocationError::backend(
            &local,
            &ModelError::Network("tcp connect error: Connection refused (os error 111)".into()),
        );
        assert_eq!(err.kind(), ErrorKind::BackendUnreachable);
        assert!(err.message().contains("Ollama"));
        assert!(!err.message().contains("os error"));

        let remote = BackendDescriptor::remote("gpt-4o-mini");
        let err = InvocationError::backend(
            &remote,
            &ModelError::Api {
                status: 401,
                body: r#"{"error":{"message":"Incorrect API key"}}"#.into(),
            },
        );
        assert!(err.message().contains("credential"));
        assert!(!err.message().contains("Incorrect"));
    }

    #[test]
    fn tool_and_timeout_kinds() {
        let err = InvocationError::tool_session(&ToolError::Launch("npx: not found".into()));
        assert_eq!(err.kind(), ErrorKind::ToolSessionFailed);
        assert_eq!(err.to_string(), "The lodging search tool could not be started.");

        let err = InvocationError::timed_out(Duration::from_secs(120));
        assert_eq!(err.kind(), ErrorKind::ToolSessionFailed);
        assert!(err.message().contains("120 seconds"));
    }
}
