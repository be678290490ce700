//! Anthropic Claude adapter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::LlmError;
use crate::provider::{CompletionRequest, Provider};
use crate::types::{
    ContentPart, ProviderTurn, Role, StopReason, TokenUsage, ToolCall, UnifiedMessage, UnifiedTool,
};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// $3 per million tokens, the coarse budget gauge for Claude Sonnet.
const PRICE_PER_TOKEN: f64 = 0.000_003;

/// Adapter for Claude models over the Messages API.
#[derive(Debug)]
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    model: String,
}

impl AnthropicProvider {
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

    fn to_api_messages(messages: &[UnifiedMessage]) -> Vec<ApiMessage> {
        messages
            .iter()
            .filter(|msg| msg.role != Role::System)
            .map(|msg| ApiMessage {
                role: match msg.role {
                    Role::Assistant => "assistant",
                    _ => "user",
                },
                content: msg.parts.iter().map(ApiBlock::from).collect(),
            })
            .collect()
    }

    fn to_api_tools(tools: &[UnifiedTool]) -> Vec<ApiTool<'_>> {
        tools
            .iter()
            .map(|tool| ApiTool {
                name: &tool.name,
                description: &tool.description,
                input_schema: &tool.parameters,
            })
            .collect()
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool<'a>>,
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: Vec<ApiBlock>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiBlock {
    Text {
        text: String,
    },
    Image {
        source: ImageSource,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

impl From<&ContentPart> for ApiBlock {
    fn from(part: &ContentPart) -> Self {
        match part {
            ContentPart::Text(text) => Self::Text { text: text.clone() },
            ContentPart::Image(image) => Self::Image {
                source: ImageSource {
                    kind: "base64",
                    media_type: image.media_type.clone(),
                    data: image.data.clone(),
                },
            },
            ContentPart::ToolCall(call) => Self::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: call.arguments.clone(),
            },
            ContentPart::ToolResult(result) => Self::ToolResult {
                tool_use_id: result.tool_call_id.clone(),
                content: result.content.clone(),
                is_error: result.is_error,
            },
        }
    }
}

#[derive(Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: String,
    data: String,
}

#[derive(Serialize)]
struct ApiTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
    model: String,
    stop_reason: Option<String>,
    usage: ApiUsage,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize)]
struct ApiUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

fn map_stop_reason(reason: Option<&str>) -> StopReason {
    match reason {
        Some("tool_use") => StopReason::ToolUse,
        Some("end_turn") => StopReason::EndTurn,
        Some("stop_sequence") => StopReason::StopSequence,
        Some("max_tokens") => StopReason::MaxTokens,
        _ => StopReason::Other,
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    fn price_per_token(&self) -> f64 {
        PRICE_PER_TOKEN
    }

    async fn complete(&self, request: CompletionRequest<'_>) -> Result<ProviderTurn, LlmError> {
        let body = MessagesRequest {
            model: request.model,
            max_tokens: request.max_tokens,
            system: request.system,
            messages: Self::to_api_messages(request.messages),
            tools: Self::to_api_tools(request.tools),
        };

        debug!(model = %request.model, messages = body.messages.len(), "anthropic request");

        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
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

        let api: MessagesResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let parts = api
            .content
            .into_iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(ContentPart::Text(text)),
                ResponseBlock::ToolUse { id, name, input } => Some(ContentPart::ToolCall(ToolCall {
                    id,
                    name,
                    arguments: input,
                })),
                ResponseBlock::Unknown => None,
            })
            .collect();

        Ok(ProviderTurn {
            parts,
            stop: map_stop_reason(api.stop_reason.as_deref()),
            usage: TokenUsage {
                input: api.usage.input_tokens,
                output: api.usage.output_tokens,
            },
            model: api.model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ImageData, ToolResultPart};
    use serde_json::json;

    #[test]
    fn system_messages_are_excluded_from_the_array() {
        let messages = vec![
            UnifiedMessage::text(Role::System, "instructions"),
            UnifiedMessage::text(Role::User, "hello"),
            UnifiedMessage::text(Role::Assistant, "hi"),
        ];

        let api = AnthropicProvider::to_api_messages(&messages);
        assert_eq!(api.len(), 2);
        assert_eq!(api[0].role, "user");
        assert_eq!(api[1].role, "assistant");
    }

    #[test]
    fn blocks_serialize_to_anthropic_shapes() {
        let image = ApiBlock::from(&ContentPart::Image(ImageData {
            data: "aGk=".to_string(),
            media_type: "image/png".to_string(),
        }));
        let json = serde_json::to_value(&image).unwrap();
        assert_eq!(json["type"], "image");
        assert_eq!(json["source"]["type"], "base64");
        assert_eq!(json["source"]["media_type"], "image/png");

        let result = ApiBlock::from(&ContentPart::ToolResult(ToolResultPart {
            tool_call_id: "toolu_1".to_string(),
            name: "imagesorcery__detect".to_string(),
            content: "ok".to_string(),
            is_error: false,
        }));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["type"], "tool_result");
        assert_eq!(json["tool_use_id"], "toolu_1");
    }

    #[test]
    fn stop_reasons_map_to_unified_vocabulary() {
        assert_eq!(map_stop_reason(Some("tool_use")), StopReason::ToolUse);
        assert_eq!(map_stop_reason(Some("end_turn")), StopReason::EndTurn);
        assert_eq!(map_stop_reason(Some("stop_sequence")), StopReason::StopSequence);
        assert_eq!(map_stop_reason(Some("max_tokens")), StopReason::MaxTokens);
        assert_eq!(map_stop_reason(Some("pause_turn")), StopReason::Other);
        assert_eq!(map_stop_reason(None), StopReason::Other);
    }

    #[test]
    fn unknown_response_blocks_are_tolerated() {
        let json = json!({
            "content": [
                { "type": "thinking", "thinking": "...", "signature": "sig" },
                { "type": "text", "text": "answer" }
            ],
            "model": "claude-sonnet-4-20250514",
            "stop_reason": "end_turn",
            "usage": { "input_tokens": 10, "output_tokens": 5 }
        });

        let response: MessagesResponse = serde_json::from_value(json).unwrap();
        assert_eq!(response.content.len(), 2);
        assert!(matches!(response.content[0], ResponseBlock::Unknown));
    }

    #[test]
    fn empty_model_falls_back_to_default() {
        let provider = AnthropicProvider::new("key", "", 30);
        assert_eq!(provider.default_model(), DEFAULT_MODEL);
    }
}
