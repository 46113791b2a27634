//! LLM protocol types and backend trait.

pub mod backend;
pub mod errors;
pub mod types;

pub use backend::{BackendFactory, OllamaBackend, OpenAiBackend, ProviderBackend, ProviderFactory};
pub use errors::ModelError;
pub use types::{
    Backend, Message, ModelRequest, ModelResponse, Part, Role, ToolCall, ToolResult, ToolSpec,
    Usage,
};
