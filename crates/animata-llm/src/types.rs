//! Provider-agnostic conversation model.
//!
//! Every provider adapter translates between these types and its own wire
//! shapes; nothing outside `providers/` knows what a given model family
//! calls a tool call.

use serde_json::Value;

/// Role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Instructions
    System,
    /// Human or tool-result turn
    User,
    /// Model turn
    Assistant,
}

/// A message in a conversation.
#[derive(Debug, Clone)]
pub struct UnifiedMessage {
    /// Who sent it
    pub role: Role,
    /// Ordered content parts
    pub parts: Vec<ContentPart>,
}

impl UnifiedMessage {
    /// A plain text message.
    #[must_use]
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![ContentPart::Text(text.into())],
        }
    }

    /// A user message carrying one image followed by text.
    #[must_use]
    pub fn vision(data: impl Into<String>, media_type: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![
                ContentPart::Image(ImageData {
                    data: data.into(),
                    media_type: media_type.into(),
                }),
                ContentPart::Text(text.into()),
            ],
        }
    }

    /// An assistant message from raw parts (as returned by a provider).
    #[must_use]
    pub fn assistant(parts: Vec<ContentPart>) -> Self {
        Self {
            role: Role::Assistant,
            parts,
        }
    }

    /// The single user message carrying every tool result for one assistant
    /// turn, so result ids line up with the originating calls.
    #[must_use]
    pub fn tool_results(results: Vec<ToolResultPart>) -> Self {
        Self {
            role: Role::User,
            parts: results.into_iter().map(ContentPart::ToolResult).collect(),
        }
    }
}

/// One piece of content in a message.
#[derive(Debug, Clone)]
pub enum ContentPart {
    /// Plain text
    Text(String),
    /// Inline image
    Image(ImageData),
    /// Model-requested tool invocation
    ToolCall(ToolCall),
    /// Result of a tool invocation
    ToolResult(ToolResultPart),
}

/// An image in a message.
#[derive(Debug, Clone)]
pub struct ImageData {
    /// Base64-encoded bytes
    pub data: String,
    /// Media type (image/jpeg, image/png, image/gif, image/webp)
    pub media_type: String,
}

/// A model's request to invoke a tool.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Provider-assigned id, echoed back in the matching result
    pub id: String,
    /// Qualified tool name (e.g. `imagesorcery__detect`)
    pub name: String,
    /// Arguments as a JSON object
    pub arguments: Value,
}

/// Result of a tool invocation, addressed to its originating call.
#[derive(Debug, Clone)]
pub struct ToolResultPart {
    /// Id of the [`ToolCall`] this answers
    pub tool_call_id: String,
    /// Qualified tool name; some providers address results by name
    pub name: String,
    /// Text payload (or `Error: ...` on failure)
    pub content: String,
    /// Whether the execution failed
    pub is_error: bool,
}

/// A provider-agnostic tool definition.
#[derive(Debug, Clone)]
pub struct UnifiedTool {
    /// Qualified tool name
    pub name: String,
    /// Description, prefixed with the owning server
    pub description: String,
    /// Input parameters as a JSON Schema object
    pub parameters: Value,
}

/// Token usage for one model turn.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    /// Prompt-side tokens
    pub input: u64,
    /// Completion-side tokens
    pub output: u64,
}

impl TokenUsage {
    /// Input plus output.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.input + self.output
    }
}

/// Why a model turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The model wants tool results before continuing
    ToolUse,
    /// Normal completion
    EndTurn,
    /// A configured stop sequence fired
    StopSequence,
    /// The per-turn token ceiling cut the response short
    MaxTokens,
    /// Anything else the provider reported
    Other,
}

/// One assistant turn as reported by a provider adapter.
#[derive(Debug, Clone)]
pub struct ProviderTurn {
    /// Content parts of the turn
    pub parts: Vec<ContentPart>,
    /// Termination reason
    pub stop: StopReason,
    /// Token usage for this turn
    pub usage: TokenUsage,
    /// Model that produced the turn
    pub model: String,
}

impl ProviderTurn {
    /// All text parts concatenated.
    #[must_use]
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// The tool calls requested in this turn, in order.
    #[must_use]
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::ToolCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }
}
