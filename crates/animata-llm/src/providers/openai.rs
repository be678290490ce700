//! OpenAI adapter.
//!
//! Speaks the chat completions API. Images travel as `data:` URLs; a unified
//! tool-result message unpacks into one `role: "tool"` wire message per
//! result, which is the shape the API requires.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::LlmError;
use crate::provider::{CompletionRequest, Provider};
use crate::types::{
    ContentPart, ProviderTurn, Role, StopReason, TokenUsage, ToolCall, UnifiedMessage, UnifiedTool,
};

const API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o";

/// ~$2.50 per million tokens, the coarse budget gauge for GPT-4o.
const PRICE_PER_TOKEN: f64 = 0.000_002_5;

/// Adapter for OpenAI models.
#[derive(Debug)]
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    /// Create an adapter with the given credentials.
    #[must_use]
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout_s: u64) -> Self {
        let model = model.into();
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_s))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            model: if model.is_empty() {
                DEFAULT_MODEL.to_string()
            } else {
                model
            },
        }
    }

    fn to_api_messages(system: &str, messages: &[UnifiedMessage]) -> Vec<Value> {
        let mut out = vec![json!({ "role": "system", "content": system })];

        for message in messages {
            match message.role {
                Role::System => out.push(json!({ "role": "system", "content": flat_text(message) })),
                Role::Assistant => out.push(assistant_to_value(message)),
                Role::User => {
                    // A unified tool-result message becomes N wire messages.
                    let results: Vec<&crate::types::ToolResultPart> = message
                        .parts
                        .iter()
                        .filter_map(|part| match part {
                            ContentPart::ToolResult(result) => Some(result),
                            _ => None,
                        })
                        .collect();

                    if results.is_empty() {
                        out.push(user_to_value(message));
                    } else {
                        for result in results {
                            out.push(json!({
                                "role": "tool",
                                "tool_call_id": result.tool_call_id,
                                "content": result.content,
                            }));
                        }
                    }
                }
            }
        }

        out
    }

    fn to_api_tools(tools: &[UnifiedTool]) -> Vec<Value> {
        tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    }
                })
            })
            .collect()
    }
}

fn flat_text(message: &UnifiedMessage) -> String {
    message
        .parts
        .iter()
        .filter_map(|part| match part {
            ContentPart::Text(text) => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

fn user_to_value(message: &UnifiedMessage) -> Value {
    let has_image = message
        .parts
        .iter()
        .any(|part| matches!(part, ContentPart::Image(_)));

    if !has_image {
        return json!({ "role": "user", "content": flat_text(message) });
    }

    let parts: Vec<Value> = message
        .parts
        .iter()
        .filter_map(|part| match part {
            ContentPart::Text(text) => Some(json!({ "type": "text", "text": text })),
            ContentPart::Image(image) => Some(json!({
                "type": "image_url",
                "image_url": {
                    "url": format!("data:{};base64,{}", image.media_type, image.data)
                }
            })),
            _ => None,
        })
        .collect();

    json!({ "role": "user", "content": parts })
}

fn assistant_to_value(message: &UnifiedMessage) -> Value {
    let text = flat_text(message);
    let tool_calls: Vec<Value> = message
        .parts
        .iter()
        .filter_map(|part| match part {
            ContentPart::ToolCall(call) => Some(json!({
                "id": call.id,
                "type": "function",
                "function": {
                    "name": call.name,
                    "arguments": call.arguments.to_string(),
                }
            })),
            _ => None,
        })
        .collect();

    let mut value = json!({ "role": "assistant" });
    value["content"] = if text.is_empty() {
        Value::Null
    } else {
        Value::String(text)
    };
    if !tool_calls.is_empty() {
        value["tool_calls"] = Value::Array(tool_calls);
    }
    value
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    model: String,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    /// JSON object encoded as a string, per the API
    arguments: String,
}

#[derive(Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    fn price_per_token(&self) -> f64 {
        PRICE_PER_TOKEN
    }

    async fn complete(&self, request: CompletionRequest<'_>) -> Result<ProviderTurn, LlmError> {
        let mut body = json!({
            "model": request.model,
            "messages": Self::to_api_messages(request.system, request.messages),
            "max_completion_tokens": request.max_tokens,
        });
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(Self::to_api_tools(request.tools));
        }

        debug!(model = %request.model, "openai request");

        let response = self
            .client
            .post(API_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response
                .json::<ApiError>()
                .await
                .map(|e| e.error.message)
                .unwrap_or_else(|_| format!("HTTP {status}"));
            return Err(LlmError::Api(message));
        }

        let api: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let choice = api
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))?;

        let mut parts = Vec::new();
        if let Some(text) = choice.message.content {
            if !text.is_empty() {
                parts.push(ContentPart::Text(text));
            }
        }

        let has_calls = !choice.message.tool_calls.is_empty();
        for call in choice.message.tool_calls {
            let arguments = serde_json::from_str(&call.function.arguments)
                .unwrap_or_else(|_| json!({}));
            parts.push(ContentPart::ToolCall(ToolCall {
                id: call.id,
                name: call.function.name,
                arguments,
            }));
        }

        let stop = if has_calls {
            StopReason::ToolUse
        } else {
            match choice.finish_reason.as_deref() {
                Some("stop") => StopReason::EndTurn,
                Some("length") => StopReason::MaxTokens,
                _ => StopReason::Other,
            }
        };

        let usage = api.usage.unwrap_or_default();

        Ok(ProviderTurn {
            parts,
            stop,
            usage: TokenUsage {
                input: usage.prompt_tokens,
                output: usage.completion_tokens,
            },
            model: api.model,
        })
    }
}
