//! OpenAI chat-completions backend.

use super::{ApiTool, parse_arguments, tools_to_api, trim_base_url};
use crate::model::{
    Backend, Message, ModelError, ModelRequest, ModelResponse, Part, Role, ToolCall, Usage,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ApiToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: ApiFunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionCall {
    name: String,
    /// JSON-encoded argument object.
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ApiToolCall>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Remote hosted model through an OpenAI-compatible API.
pub struct OpenAiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiBackend {
    pub fn new(
        client: reqwest::Client,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    pub fn base_url(mut self, base_url: &str) -> Self {
        self.base_url = trim_base_url(base_url);
        self
    }

    fn messages_to_api(messages: &[Message]) -> Vec<ApiMessage> {
        let mut out = Vec::with_capacity(messages.len());

        for msg in messages {
            let role = match msg.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            };

            let text = msg.text();
            let mut calls = Vec::new();
            for part in &msg.parts {
                if let Part::ToolCall(call) = part {
                    calls.push(ApiToolCall {
                        id: call.id.clone(),
                        kind: function_kind(),
                        function: ApiFunctionCall {
                            name: call.name.clone(),
                            arguments: call.input.to_string(),
                        },
                    });
                }
            }

            if !text.is_empty() || !calls.is_empty() {
                out.push(ApiMessage {
                    role,
                    content: (!text.is_empty()).then_some(text),
                    tool_calls: calls,
                    tool_call_id: None,
                });
            }

            for part in &msg.parts {
                if let Part::ToolResult(result) = part {
                    out.push(ApiMessage {
                        role: "tool",
                        content: Some(result.content()),
                        tool_calls: Vec::new(),
                        tool_call_id: Some(result.tool_call_id().to_string()),
                    });
                }
            }
        }
        out
    }

    fn response_to_message(message: ApiResponseMessage) -> Message {
        let mut parts = Vec::new();
        if let Some(content) = message.content.filter(|c| !c.is_empty()) {
            parts.push(Part::Text(content));
        }
        for call in message.tool_calls {
            parts.push(Part::ToolCall(ToolCall {
                id: call.id,
                name: call.function.name,
                input: parse_arguments(Value::String(call.function.arguments)),
            }));
        }
        Message {
            role: Role::Assistant,
            parts,
        }
    }
}

impl std::fmt::Display for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "openai({})", self.model)
    }
}

impl Backend for OpenAiBackend {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        let api_request = ApiRequest {
            model: &self.model,
            messages: Self::messages_to_api(request.messages),
            tools: tools_to_api(request.tools),
            max_tokens: request.max_tokens,
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!(%url, model = %self.model, tools = request.tools.len(), "calling openai");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api { status, body });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::InvalidResponse("no choices in response".into()))?;

        let usage = api_response
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(ModelResponse {
            message: Self::response_to_message(choice.message),
            usage,
        })
    }
}
