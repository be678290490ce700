//! Provider abstraction and factory.
//!
//! A [`Provider`] hides one model family's message and tool-call wire
//! shapes behind the unified conversation model. Adding a provider is
//! strictly additive: one adapter plus one factory arm.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::providers::{AnthropicProvider, GeminiProvider, OpenAiProvider};
use crate::types::{ProviderTurn, UnifiedMessage, UnifiedTool};

/// One completion request against a provider.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    /// Model to use
    pub model: &'a str,
    /// System prompt
    pub system: &'a str,
    /// Conversation so far
    pub messages: &'a [UnifiedMessage],
    /// Tool manifest offered to the model
    pub tools: &'a [UnifiedTool],
    /// Per-turn output token ceiling
    pub max_tokens: u32,
}

/// A vision-capable, tool-calling language model family.
#[async_trait]
pub trait Provider: std::fmt::Debug + Send + Sync {
    /// Provider name (e.g. "anthropic").
    fn name(&self) -> &str;

    /// Model used when the conversation config does not override it.
    fn default_model(&self) -> &str;

    /// Coarse price per token in USD, used as a budget gauge only.
    fn price_per_token(&self) -> f64;

    /// Run one model turn.
    ///
    /// # Errors
    /// Returns an error when the API call fails or the response cannot be
    /// interpreted.
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<ProviderTurn, LlmError>;
}

/// Build the configured provider.
///
/// Returns `Ok(None)` when the selected provider has no API key configured
/// (the LLM feature is effectively disabled); unknown provider names are a
/// startup error.
///
/// # Errors
/// [`LlmError::UnknownProvider`] for unrecognized or missing names.
pub fn create_provider(config: &LlmConfig) -> Result<Option<Arc<dyn Provider>>, LlmError> {
    let provider: Arc<dyn Provider> = match config.provider.as_str() {
        "anthropic" | "claude" => {
            if config.anthropic.api_key.is_empty() {
                return Ok(None);
            }
            Arc::new(AnthropicProvider::new(
                &config.anthropic.api_key,
                &config.anthropic.model,
                config.anthropic.timeout_s,
            ))
        }
        "google" | "gemini" => {
            if config.google.api_key.is_empty() {
                return Ok(None);
            }
            Arc::new(GeminiProvider::new(
                &config.google.api_key,
                &config.google.model,
                config.google.timeout_s,
            ))
        }
        "openai" => {
            if config.openai.api_key.is_empty() {
                return Ok(None);
            }
            Arc::new(OpenAiProvider::new(
                &config.openai.api_key,
                &config.openai.model,
                config.openai.timeout_s,
            ))
        }
        "" => {
            return Err(LlmError::UnknownProvider(
                "llm.provider not specified".to_string(),
            ))
        }
        other => return Err(LlmError::UnknownProvider(other.to_string())),
    };

    Ok(Some(provider))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;

    fn config(provider: &str, api_key: &str) -> LlmConfig {
        let mut config = LlmConfig::default();
        config.provider = provider.to_string();
        let creds = ProviderConfig {
            api_key: api_key.to_string(),
            model: "test-model".to_string(),
            timeout_s: 30,
        };
        config.anthropic = creds.clone();
        config.google = creds.clone();
        config.openai = creds;
        config
    }

    #[test]
    fn factory_maps_known_names() {
        for (name, expected) in [
            ("anthropic", "anthropic"),
            ("claude", "anthropic"),
            ("google", "gemini"),
            ("gemini", "gemini"),
            ("openai", "openai"),
        ] {
            let provider = create_provider(&config(name, "key")).unwrap().unwrap();
            assert_eq!(provider.name(), expected);
        }
    }

    #[test]
    fn factory_rejects_unknown_names() {
        let err = create_provider(&config("mystery", "key")).unwrap_err();
        assert!(matches!(err, LlmError::UnknownProvider(_)));

        let err = create_provider(&config("", "key")).unwrap_err();
        assert!(matches!(err, LlmError::UnknownProvider(_)));
    }

    #[test]
    fn missing_api_key_disables_provider() {
        let provider = create_provider(&config("anthropic", "")).unwrap();
        assert!(provider.is_none());
    }
}
