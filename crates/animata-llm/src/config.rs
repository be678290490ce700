//! LLM configuration surface.
//!
//! Populated by whatever loads the application config; the core only reads
//! these values.

use serde::{Deserialize, Serialize};

use crate::agent::ConversationConfig;

/// How the orchestrator uses the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    /// Scripted pipeline with default planning
    #[default]
    Lightweight,
    /// Model-driven conversation loop
    FullAi,
}

/// Credentials and model selection for one provider family.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key; empty means the provider is not configured
    #[serde(default)]
    pub api_key: String,
    /// Model name (e.g. "claude-sonnet-4-20250514")
    #[serde(default)]
    pub model: String,
    /// Request timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_s: u64,
}

fn default_provider_timeout() -> u64 {
    120
}

/// Top-level LLM configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Whether any LLM involvement is enabled
    #[serde(default)]
    pub enabled: bool,
    /// Which provider family to use ("anthropic", "google", "openai")
    #[serde(default)]
    pub provider: String,
    /// Execution mode
    #[serde(default)]
    pub mode: AgentMode,
    /// Safety bounds for full-AI mode
    #[serde(default)]
    pub full_ai: ConversationConfig,

    /// Anthropic credentials
    #[serde(default)]
    pub anthropic: ProviderConfig,
    /// Google credentials
    #[serde(default)]
    pub google: ProviderConfig,
    /// OpenAI credentials
    #[serde(default)]
    pub openai: ProviderConfig,
}
