//! JSON-RPC 2.0 framing and MCP wire types.
//!
//! One request/response pair per integer id; notifications carry no id.
//! Methods used by this client: `initialize`, `notifications/initialized`,
//! `tools/list`, `tools/call`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// MCP protocol revision this client speaks.
pub const PROTOCOL_VERSION: &str = "2025-03-26";

/// Client name reported during the handshake.
pub const CLIENT_NAME: &str = "animata";

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    /// Always "2.0"
    pub jsonrpc: &'static str,
    /// Monotonic per-transport id
    pub id: i64,
    /// Method name
    pub method: String,
    /// Method parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Build a request frame.
    #[must_use]
    pub fn new(id: i64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 notification (a request without an id).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    /// Always "2.0"
    pub jsonrpc: &'static str,
    /// Method name
    pub method: String,
    /// Method parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Build a notification frame.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 response.
///
/// Frames without an id (server notifications) deserialize with `id: None`
/// and are ignored by the transports.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol marker, tolerated if absent
    #[serde(default)]
    pub jsonrpc: String,
    /// Correlation id
    #[serde(default)]
    pub id: Option<i64>,
    /// Result payload on success
    #[serde(default)]
    pub result: Option<Value>,
    /// Error payload on failure
    #[serde(default)]
    pub error: Option<RpcErrorBody>,
}

/// The `error` member of a JSON-RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorBody {
    /// Numeric error code
    pub code: i64,
    /// Human-readable message
    pub message: String,
    /// Optional detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Parameters for the `initialize` request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol revision the client speaks
    pub protocol_version: String,
    /// Client capability set
    pub capabilities: Value,
    /// Client identification
    pub client_info: ClientInfo,
}

impl InitializeParams {
    /// The handshake parameters this client always sends.
    #[must_use]
    pub fn current() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: serde_json::json!({
                "roots": { "listChanged": false }
            }),
            client_info: ClientInfo {
                name: CLIENT_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }
}

/// Client identification in the handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Client name
    pub name: String,
    /// Client version
    pub version: String,
}

/// Result of the `initialize` request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Protocol revision the server speaks
    #[serde(default)]
    pub protocol_version: String,
    /// Server capability set, kept opaque
    #[serde(default)]
    pub capabilities: Value,
    /// Server identification
    pub server_info: ServerInfo,
}

/// Server identification from the handshake.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server name
    pub name: String,
    /// Server version
    #[serde(default)]
    pub version: String,
}

/// Tool definition from an MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// Tool name, opaque to this layer
    pub name: String,
    /// Tool description
    #[serde(default)]
    pub description: String,
    /// Input schema (JSON Schema object)
    #[serde(default)]
    pub input_schema: Value,
}

/// Result of `tools/list`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    /// Tools offered by the server
    pub tools: Vec<Tool>,
    /// Pagination cursor; observed but not followed
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Parameters for `tools/call`.
#[derive(Debug, Clone, Serialize)]
pub struct CallToolParams {
    /// Tool name
    pub name: String,
    /// Tool arguments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// Result of a tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// Ordered content blocks; non-empty for well-formed results
    pub content: Vec<ContentBlock>,
    /// Whether the tool reported failure; the first text block then carries
    /// the reason
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl ToolCallResult {
    /// First text block, if any.
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
    }

    /// All text blocks concatenated.
    #[must_use]
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// A content item in a tool result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    /// Text content
    Text {
        /// The text payload
        text: String,
    },
    /// Image content (base64 encoded)
    Image {
        /// Base64 encoded image data
        data: String,
        /// MIME type (e.g., "image/png")
        #[serde(rename = "mimeType", default)]
        mime_type: String,
    },
    /// Resource reference
    Resource {
        /// URI of the resource
        uri: String,
        /// Optional inline text
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_with_id_and_version() {
        let req = JsonRpcRequest::new(7, "tools/list", Some(serde_json::json!({})));
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"id\":7"));
        assert!(json.contains("\"method\":\"tools/list\""));
    }

    #[test]
    fn notification_has_no_id() {
        let note = JsonRpcNotification::new("notifications/initialized", None);
        let json = serde_json::to_string(&note).unwrap();
        assert!(!json.contains("\"id\""));
        assert!(!json.contains("\"params\""));
    }

    #[test]
    fn tool_parses_camel_case_schema() {
        let json = r#"{
            "name": "detect",
            "description": "Detect objects",
            "inputSchema": {
                "type": "object",
                "properties": { "input_path": { "type": "string" } }
            }
        }"#;

        let tool: Tool = serde_json::from_str(json).unwrap();
        assert_eq!(tool.name, "detect");
        assert_eq!(tool.input_schema["type"], "object");
    }

    #[test]
    fn tool_result_parses_is_error() {
        let json = r#"{
            "content": [ { "type": "text", "text": "Invalid input: file not found" } ],
            "isError": true
        }"#;

        let result: ToolCallResult = serde_json::from_str(json).unwrap();
        assert!(result.is_error);
        assert_eq!(result.first_text(), Some("Invalid input: file not found"));
    }

    #[test]
    fn response_without_id_is_tolerated() {
        let json = r#"{"jsonrpc":"2.0","method":"notifications/progress","params":{}}"#;
        let resp: JsonRpcResponse = serde_json::from_str(json).unwrap();
        assert!(resp.id.is_none());
    }

    #[test]
    fn joined_text_skips_non_text_blocks() {
        let result = ToolCallResult {
            content: vec![
                ContentBlock::Text {
                    text: "a".to_string(),
                },
                ContentBlock::Resource {
                    uri: "file:///log".to_string(),
                    text: None,
                },
                ContentBlock::Text {
                    text: "b".to_string(),
                },
            ],
            is_error: false,
        };
        assert_eq!(result.joined_text(), "ab");
    }
}
