//! # animata-llm
//!
//! Vision-LLM orchestration for the animata agent runtime.
//!
//! This crate provides:
//! - [`ToolAdapter`] - one flat tool namespace over N MCP clients
//! - [`Provider`] - the capability set every model family adapter satisfies
//! - [`AnthropicProvider`], [`GeminiProvider`], [`OpenAiProvider`] - the
//!   concrete adapters, selected via [`create_provider`]
//! - [`Conversation`] - the bounded tool-calling agent loop
//!
//! # Example
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//!
//! use animata_llm::{Conversation, ConversationConfig, ToolAdapter, AnthropicProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = Arc::new(ToolAdapter::new(BTreeMap::new()));
//!     let provider = Arc::new(AnthropicProvider::new("sk-...", "", 120));
//!
//!     let mut conversation =
//!         Conversation::new(provider, adapter, ConversationConfig::default());
//!     let result = conversation
//!         .execute("/abs/path/input.png", 10.0, "make a shake animation")
//!         .await?;
//!     println!("{result}");
//!     Ok(())
//! }
//! ```

mod adapter;
mod agent;
mod analysis;
mod config;
mod error;
mod prompt;
mod provider;
mod providers;
mod types;
mod vision;

pub use adapter::{qualify, split_qualified, ToolAdapter, SEPARATOR};
pub use agent::{Conversation, ConversationConfig, ConversationMetrics};
pub use analysis::{LlmAnalysis, PipelineDecision};
pub use config::{AgentMode, LlmConfig, ProviderConfig};
pub use error::{Bound, LlmError};
pub use prompt::video_generation_prompt;
pub use provider::{create_provider, CompletionRequest, Provider};
pub use providers::{AnthropicProvider, GeminiProvider, OpenAiProvider};
pub use types::{
    ContentPart, ImageData, ProviderTurn, Role, StopReason, TokenUsage, ToolCall, ToolResultPart,
    UnifiedMessage, UnifiedTool,
};
pub use vision::{detect_media_type, read_and_encode_image};
