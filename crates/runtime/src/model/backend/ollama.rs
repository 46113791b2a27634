//! Ollama chat backend (`POST /api/chat`).

use super::{ApiTool, parse_arguments, tool_call_names, tools_to_api, trim_base_url};
use crate::model::{
    Backend, Message, ModelError, ModelRequest, ModelResponse, Part, Role, ToolCall, Usage,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool<'a>>,
    stream: bool,
    options: ApiOptions,
}

#[derive(Debug, Serialize)]
struct ApiOptions {
    num_predict: u32,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ApiToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

impl ApiMessage {
    fn text(role: &'static str, content: String) -> Self {
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            tool_name: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    function: ApiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    message: ApiResponseMessage,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<ApiToolCall>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Locally served model through the Ollama daemon.
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaBackend {
    pub fn new(client: reqwest::Client, model: impl Into<String>) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
        }
    }

    pub fn base_url(mut self, base_url: &str) -> Self {
        self.base_url = trim_base_url(base_url);
        self
    }

    fn messages_to_api(messages: &[Message]) -> Vec<ApiMessage> {
        let names = tool_call_names(messages);
        let mut out = Vec::with_capacity(messages.len());

        for msg in messages {
            let role = match msg.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            };

            let text = msg.text();
            let calls: Vec<ApiToolCall> = msg
                .parts
                .iter()
                .filter_map(|part| match part {
                    Part::ToolCall(call) => Some(ApiToolCall {
                        function: ApiFunctionCall {
                            name: call.name.clone(),
                            arguments: call.input.clone(),
                        },
                    }),
                    _ => None,
                })
                .collect();

            if !text.is_empty() || !calls.is_empty() {
                let mut api = ApiMessage::text(role, text);
                api.tool_calls = calls;
                out.push(api);
            }

            for part in &msg.parts {
                if let Part::ToolResult(result) = part {
                    let mut api = ApiMessage::text("tool", result.content());
                    api.tool_name = names
                        .get(result.tool_call_id())
                        .map(|name| name.to_string());
                    out.push(api);
                }
            }
        }
        out
    }

    fn response_to_message(message: ApiResponseMessage) -> Message {
        let mut parts = Vec::new();
        if !message.content.is_empty() {
            parts.push(Part::Text(message.content));
        }
        for call in message.tool_calls {
            parts.push(Part::ToolCall(ToolCall {
                id: uuid::Uuid::new_v4().to_string(),
                name: call.function.name,
                input: parse_arguments(call.function.arguments),
            }));
        }
        Message {
            role: Role::Assistant,
            parts,
        }
    }
}

impl std::fmt::Display for OllamaBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ollama({})", self.model)
    }
}

impl Backend for OllamaBackend {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        let api_request = ApiRequest {
            model: &self.model,
            messages: Self::messages_to_api(request.messages),
            tools: tools_to_api(request.tools),
            stream: false,
            options: ApiOptions {
                num_predict: request.max_tokens,
            },
        };

        let url = format!("{}/api/chat", self.base_url);
        debug!(%url, model = %self.model, tools = request.tools.len(), "calling ollama");

        let response = self
            .client
            .post(&url)
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

        let usage = Usage {
            input_tokens: api_response.prompt_eval_count,
            output_tokens: api_response.eval_count,
        };
        Ok(ModelResponse {
            message: Self::response_to_message(api_response.message),
            usage,
        })
    }
}
