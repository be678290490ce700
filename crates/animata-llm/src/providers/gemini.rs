//! Google Gemini adapter.
//!
//! Speaks the `generateContent` REST API. Gemini addresses function results
//! by name rather than id, so this adapter synthesizes per-turn call ids and
//! replays results as `functionResponse` parts keyed by the function name.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::LlmError;
use crate::provider::{CompletionRequest, Provider};
use crate::types::{
    ContentPart, ProviderTurn, Role, StopReason, TokenUsage, ToolCall, UnifiedMessage, UnifiedTool,
};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// ~$1 per million tokens, the coarse budget gauge for Gemini Flash.
const PRICE_PER_TOKEN: f64 = 0.000_001;

/// Adapter for Gemini models.
#[derive(Debug)]
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiProvider {
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

    fn to_contents(messages: &[UnifiedMessage]) -> Vec<Content> {
        messages
            .iter()
            .filter(|msg| msg.role != Role::System)
            .map(|msg| Content {
                role: match msg.role {
                    Role::Assistant => "model",
                    _ => "user",
                },
                parts: msg.parts.iter().map(part_to_value).collect(),
            })
            .collect()
    }

    fn to_tools(tools: &[UnifiedTool]) -> Option<Vec<Value>> {
        if tools.is_empty() {
            return None;
        }

        let declarations: Vec<Value> = tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": convert_schema(&tool.parameters),
                })
            })
            .collect();

        Some(vec![json!({ "functionDeclarations": declarations })])
    }
}

fn part_to_value(part: &ContentPart) -> Value {
    match part {
        ContentPart::Text(text) => json!({ "text": text }),
        ContentPart::Image(image) => json!({
            "inlineData": { "mimeType": image.media_type, "data": image.data }
        }),
        ContentPart::ToolCall(call) => json!({
            "functionCall": { "name": call.name, "args": call.arguments }
        }),
        ContentPart::ToolResult(result) => {
            let response = if result.is_error {
                json!({ "error": result.content })
            } else {
                json!({ "result": result.content })
            };
            json!({
                "functionResponse": { "name": result.name, "response": response }
            })
        }
    }
}

/// JSON Schema → Gemini schema.
///
/// Gemini uses uppercase type names and a subset of JSON Schema keywords:
/// type, description, enum, items, properties, required.
fn convert_schema(schema: &Value) -> Value {
    let Some(object) = schema.as_object() else {
        return json!({ "type": "OBJECT" });
    };

    let mut out = Map::new();

    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .map_or("OBJECT", map_type);
    out.insert("type".to_string(), Value::String(kind.to_string()));

    if let Some(description) = object.get("description").and_then(Value::as_str) {
        out.insert("description".to_string(), Value::String(description.to_string()));
    }

    if let Some(values) = object.get("enum").and_then(Value::as_array) {
        let strings: Vec<Value> = values
            .iter()
            .filter(|v| v.is_string())
            .cloned()
            .collect();
        out.insert("enum".to_string(), Value::Array(strings));
    }

    if kind == "ARRAY" {
        if let Some(items) = object.get("items") {
            out.insert("items".to_string(), convert_schema(items));
        }
    }

    if kind == "OBJECT" {
        if let Some(properties) = object.get("properties").and_then(Value::as_object) {
            let converted: Map<String, Value> = properties
                .iter()
                .map(|(name, prop)| (name.clone(), convert_schema(prop)))
                .collect();
            out.insert("properties".to_string(), Value::Object(converted));
        }
        if let Some(required) = object.get("required").and_then(Value::as_array) {
            out.insert("required".to_string(), Value::Array(required.clone()));
        }
    }

    Value::Object(out)
}

fn map_type(json_type: &str) -> &'static str {
    match json_type {
        "string" => "STRING",
        "number" => "NUMBER",
        "integer" => "INTEGER",
        "boolean" => "BOOLEAN",
        "array" => "ARRAY",
        "object" => "OBJECT",
        // Unrecognized types degrade to string, the most permissive scalar.
        _ => "STRING",
    }
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Value>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata", default)]
    usage: Option<UsageMetadata>,
    #[serde(rename = "modelVersion", default)]
    model_version: Option<String>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
    #[serde(rename = "finishReason", default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Value>,
}

#[derive(Deserialize, Default)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_tokens: u64,
    #[serde(rename = "candidatesTokenCount", default)]
    candidate_tokens: u64,
}

fn parse_parts(parts: &[Value]) -> (Vec<ContentPart>, bool) {
    let mut out = Vec::new();
    let mut has_calls = false;

    for (index, part) in parts.iter().enumerate() {
        if let Some(text) = part.get("text").and_then(Value::as_str) {
            out.push(ContentPart::Text(text.to_string()));
        } else if let Some(call) = part.get("functionCall") {
            has_calls = true;
            let name = call
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            out.push(ContentPart::ToolCall(ToolCall {
                // Gemini has no call ids; synthesize a stable per-turn one.
                id: format!("{name}-{index}"),
                name,
                arguments: call.get("args").cloned().unwrap_or_else(|| json!({})),
            }));
        }
    }

    (out, has_calls)
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    fn price_per_token(&self) -> f64 {
        PRICE_PER_TOKEN
    }

    async fn complete(&self, request: CompletionRequest<'_>) -> Result<ProviderTurn, LlmError> {
        let url = format!("{API_BASE}/{}:generateContent?key={}", request.model, self.api_key);

        let mut body = json!({
            "systemInstruction": { "parts": [ { "text": request.system } ] },
            "contents": Self::to_contents(request.messages),
            "generationConfig": { "maxOutputTokens": request.max_tokens },
        });
        if let Some(tools) = Self::to_tools(request.tools) {
            body["tools"] = Value::Array(tools);
        }

        debug!(model = %request.model, "gemini request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {status}: {text}")));
        }

        let api: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let candidate = api
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("no candidates in response".to_string()))?;

        let (parts, has_calls) = parse_parts(&candidate.content.parts);

        let stop = if has_calls {
            StopReason::ToolUse
        } else {
            match candidate.finish_reason.as_deref() {
                Some("STOP") => StopReason::EndTurn,
                Some("MAX_TOKENS") => StopReason::MaxTokens,
                _ => StopReason::Other,
            }
        };

        let usage = api.usage.unwrap_or_default();

        Ok(ProviderTurn {
            parts,
            stop,
            usage: TokenUsage {
                input: usage.prompt_tokens,
                output: usage.candidate_tokens,
            },
            model: api.model_version.unwrap_or_else(|| request.model.to_string()),
        })
    }
}
