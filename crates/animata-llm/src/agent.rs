//! The agent loop: a bounded tool-calling conversation driving the task to
//! completion.
//!
//! The loop guarantees boundedness and safety, never a particular tool-call
//! sequence: the same image and prompt may take different paths on different
//! runs.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapter::ToolAdapter;
use crate::error::{Bound, LlmError};
use crate::prompt::video_generation_prompt;
use crate::provider::{CompletionRequest, Provider};
use crate::types::{ProviderTurn, StopReason, ToolResultPart, UnifiedMessage};
use crate::vision::read_and_encode_image;

/// Per-turn output token ceiling requested from the provider.
const TURN_MAX_TOKENS: u32 = 4096;

/// Safety bounds for one conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Maximum conversation rounds (one round = one model call plus its
    /// optional tool-result reply)
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    /// Maximum cumulative tokens across the conversation
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u64,
    /// Maximum estimated cost in USD
    #[serde(default = "default_max_cost")]
    pub max_cost_usd: f64,
    /// Wall-clock budget for the whole conversation
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Model override; the provider's default when absent
    #[serde(default)]
    pub model: Option<String>,
}

fn default_max_rounds() -> u32 {
    20
}
fn default_max_tokens() -> u64 {
    100_000
}
fn default_max_cost() -> f64 {
    0.50
}
fn default_timeout() -> u64 {
    300
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            max_tokens: default_max_tokens(),
            max_cost_usd: default_max_cost(),
            timeout_seconds: default_timeout(),
            model: None,
        }
    }
}

/// What a finished (or aborted) conversation cost.
#[derive(Debug, Clone, Default)]
pub struct ConversationMetrics {
    /// Model calls made
    pub rounds: u32,
    /// Tool invocations dispatched
    pub tool_calls: u32,
    /// Cumulative input+output tokens
    pub tokens_used: u64,
    /// Wall-clock duration in seconds
    pub duration_seconds: f64,
    /// Estimated cost in USD
    pub cost_usd: f64,
}

/// Stateful driver of one provider conversation.
///
/// Ephemeral: constructed per task, discarded after [`execute`](Self::execute)
/// returns. Metrics survive via [`metrics`](Self::metrics).
pub struct Conversation {
    provider: Arc<dyn Provider>,
    adapter: Arc<ToolAdapter>,
    config: ConversationConfig,
    cancel: CancellationToken,

    messages: Vec<UnifiedMessage>,
    rounds: u32,
    tool_calls: u32,
    tokens_used: u64,
    started: Instant,
}

impl Conversation {
    /// Create a conversation over a provider and the unified tool layer.
    #[must_use]
    pub fn new(provider: Arc<dyn Provider>, adapter: Arc<ToolAdapter>, config: ConversationConfig) -> Self {
        Self {
            provider,
            adapter,
            config,
            cancel: CancellationToken::new(),
            messages: Vec::new(),
            rounds: 0,
            tool_calls: 0,
            tokens_used: 0,
            started: Instant::now(),
        }
    }

    /// Attach an ambient cancellation token, honored before every model call
    /// and every tool call.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run the conversation to completion.
    ///
    /// Returns the model's final text. The model is called at most
    /// `max_rounds + 1` times: the extra call may only observe a terminating
    /// response, never start more tool work.
    ///
    /// # Errors
    /// [`LlmError::BudgetExceeded`] naming the bound that was hit,
    /// [`LlmError::Truncated`] / [`LlmError::NoProgress`] on abnormal model
    /// termination, [`LlmError::Cancelled`], or provider/tool failures.
    pub async fn execute(
        &mut self,
        image_path: &str,
        duration: f64,
        user_prompt: &str,
    ) -> Result<String, LlmError> {
        info!(image = %image_path, duration, "starting agent conversation");
        self.started = Instant::now();

        let (image_base64, media_type) = read_and_encode_image(image_path).await?;
        let tools = self.adapter.discover().await;
        info!(count = tools.len(), "tools available to the model");

        let system = video_generation_prompt(duration, image_path, &self.adapter.describe().await);

        let initial = if user_prompt.is_empty() {
            format!("Please generate a {duration:.1}-second animated video for this image.")
        } else {
            format!("{user_prompt}\n\nGenerate a {duration:.1}-second animated video for this image.")
        };
        self.messages
            .push(UnifiedMessage::vision(image_base64, media_type, initial));

        let model = self
            .config
            .model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string());

        loop {
            if self.cancel.is_cancelled() {
                return Err(LlmError::Cancelled);
            }

            debug!(round = self.rounds + 1, max = self.config.max_rounds, "model call");

            let turn = self
                .provider
                .complete(CompletionRequest {
                    model: &model,
                    system: &system,
                    messages: &self.messages,
                    tools: &tools,
                    max_tokens: TURN_MAX_TOKENS,
                })
                .await?;

            self.tokens_used += turn.usage.total();
            self.rounds += 1;
            debug!(
                input = turn.usage.input,
                output = turn.usage.output,
                total = self.tokens_used,
                "token usage"
            );

            self.enforce_budgets()?;

            self.messages.push(UnifiedMessage::assistant(turn.parts.clone()));

            match turn.stop {
                StopReason::ToolUse => {
                    // Refuse to start another tool round past the cap; the
                    // call that *observes* a terminating response is free.
                    if self.rounds > self.config.max_rounds {
                        return Err(LlmError::BudgetExceeded {
                            bound: Bound::Rounds,
                            detail: format!("{} rounds used, cap {}", self.rounds, self.config.max_rounds),
                        });
                    }
                    self.run_tool_round(&turn).await?;
                }
                StopReason::EndTurn | StopReason::StopSequence => {
                    info!(rounds = self.rounds, tool_calls = self.tool_calls, "conversation complete");
                    let text = turn.text();
                    return Ok(if text.is_empty() {
                        "Task completed (no text output)".to_string()
                    } else {
                        text
                    });
                }
                StopReason::MaxTokens => {
                    return Err(LlmError::Truncated { round: self.rounds });
                }
                StopReason::Other => {
                    let text = turn.text();
                    if text.is_empty() {
                        return Err(LlmError::NoProgress { round: self.rounds });
                    }
                    return Ok(text);
                }
            }
        }
    }

    /// Token, cost, wall-clock, then round checks, in that order.
    fn enforce_budgets(&self) -> Result<(), LlmError> {
        if self.tokens_used > self.config.max_tokens {
            return Err(LlmError::BudgetExceeded {
                bound: Bound::Tokens,
                detail: format!("{} tokens used, cap {}", self.tokens_used, self.config.max_tokens),
            });
        }

        let cost = self.estimated_cost();
        if cost > self.config.max_cost_usd {
            return Err(LlmError::BudgetExceeded {
                bound: Bound::Cost,
                detail: format!("${cost:.4} estimated, cap ${:.2}", self.config.max_cost_usd),
            });
        }

        let elapsed = self.started.elapsed().as_secs();
        if elapsed > self.config.timeout_seconds {
            return Err(LlmError::BudgetExceeded {
                bound: Bound::WallClock,
                detail: format!("{elapsed}s elapsed, cap {}s", self.config.timeout_seconds),
            });
        }

        // Rounds cap is enforced where continuation is decided: a run that
        // ends on this turn may use the final observation.
        Ok(())
    }

    /// Execute every tool call in the turn sequentially, then deliver all
    /// results to the model as one user message so ids line up.
    async fn run_tool_round(&mut self, turn: &ProviderTurn) -> Result<(), LlmError> {
        let mut results = Vec::new();

        for call in turn.tool_calls() {
            if self.cancel.is_cancelled() {
                return Err(LlmError::Cancelled);
            }

            self.tool_calls += 1;
            debug!(n = self.tool_calls, tool = %call.name, "tool call");

            let (content, is_error) = match self
                .adapter
                .execute(&call.name, call.arguments.clone())
                .await
            {
                Ok(text) => (text, false),
                Err(err) => {
                    // A failed tool does not abort the loop; the model gets
                    // the error payload and decides what to do next.
                    warn!(tool = %call.name, error = %err, "tool execution failed");
                    (format!("Error: {err}"), true)
                }
            };

            results.push(ToolResultPart {
                tool_call_id: call.id.clone(),
                name: call.name.clone(),
                content,
                is_error,
            });
        }

        if !results.is_empty() {
            self.messages.push(UnifiedMessage::tool_results(results));
        }
        Ok(())
    }

    fn estimated_cost(&self) -> f64 {
        self.tokens_used as f64 * self.provider.price_per_token()
    }

    /// Metrics for the conversation so far.
    #[must_use]
    pub fn metrics(&self) -> ConversationMetrics {
        ConversationMetrics {
            rounds: self.rounds,
            tool_calls: self.tool_calls,
            tokens_used: self.tokens_used,
            duration_seconds: self.started.elapsed().as_secs_f64(),
            cost_usd: self.estimated_cost(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use animata_mcp::transport::MockTransport;
    use animata_mcp::McpClient;

    use super::*;
    use crate::types::{ContentPart, ProviderTurn, Role, TokenUsage, ToolCall};

    /// Provider that replays scripted turns and records what it was sent.
    #[derive(Debug)]
    struct ScriptedProvider {
        turns: Mutex<Vec<ProviderTurn>>,
        seen: Mutex<Vec<Vec<UnifiedMessage>>>,
        price: f64,
    }

    impl ScriptedProvider {
        fn new(turns: Vec<ProviderTurn>) -> Self {
            Self {
                turns: Mutex::new(turns),
                seen: Mutex::new(Vec::new()),
                price: 0.000_003,
            }
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }

        fn last_messages(&self) -> Vec<UnifiedMessage> {
            self.seen.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }
        fn default_model(&self) -> &str {
            "scripted-model"
        }
        fn price_per_token(&self) -> f64 {
            self.price
        }

        async fn complete(&self, request: CompletionRequest<'_>) -> Result<ProviderTurn, LlmError> {
            self.seen.lock().unwrap().push(request.messages.to_vec());
            let mut turns = self.turns.lock().unwrap();
            if turns.is_empty() {
                return Err(LlmError::Api("script exhausted".to_string()));
            }
            Ok(turns.remove(0))
        }
    }

    fn text_turn(text: &str, stop: StopReason, tokens: (u64, u64)) -> ProviderTurn {
        ProviderTurn {
            parts: vec![ContentPart::Text(text.to_string())],
            stop,
            usage: TokenUsage {
                input: tokens.0,
                output: tokens.1,
            },
            model: "scripted-model".to_string(),
        }
    }

    fn tool_turn(calls: &[(&str, &str)], tokens: (u64, u64)) -> ProviderTurn {
        ProviderTurn {
            parts: calls
                .iter()
                .map(|(id, name)| {
                    ContentPart::ToolCall(ToolCall {
                        id: (*id).to_string(),
                        name: (*name).to_string(),
                        arguments: json!({}),
                    })
                })
                .collect(),
            stop: StopReason::ToolUse,
            usage: TokenUsage {
                input: tokens.0,
                output: tokens.1,
            },
            model: "scripted-model".to_string(),
        }
    }

    async fn adapter_with_tool(result_text: &str) -> Arc<ToolAdapter> {
        let mock = MockTransport::new();
        mock.script_initialize("imagesorcery").await;
        mock.set_response(
            "tools/list",
            json!({
                "tools": [
                    { "name": "detect", "description": "Detect", "inputSchema": { "type": "object" } }
                ]
            }),
        )
        .await;
        mock.set_response(
            "tools/call",
            json!({
                "content": [ { "type": "text", "text": result_text } ],
                "isError": false
            }),
        )
        .await;

        let client = McpClient::new(Box::new(mock));
        client.connect().await.unwrap();
        client.initialize().await.unwrap();

        let mut clients = BTreeMap::new();
        clients.insert("imagesorcery".to_string(), Arc::new(client));
        Arc::new(ToolAdapter::new(clients))
    }

    fn temp_image() -> tempfile::NamedTempFile {
        use std::io::Write as _;
        let mut file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        file.write_all(b"png bytes").unwrap();
        file
    }

    #[tokio::test]
    async fn ends_on_end_turn_with_final_text() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_turn(&[("call-1", "imagesorcery__detect")], (100, 50)),
            text_turn("done: /tmp/out.mp4", StopReason::EndTurn, (120, 30)),
        ]));
        let adapter = adapter_with_tool("ok").await;
        let image = temp_image();

        let mut conversation = Conversation::new(
            provider.clone(),
            adapter,
            ConversationConfig::default(),
        );
        let result = conversation
            .execute(image.path().to_str().unwrap(), 10.0, "")
            .await
            .unwrap();

        assert_eq!(result, "done: /tmp/out.mp4");

        let metrics = conversation.metrics();
        assert!(metrics.rounds >= 1);
        assert_eq!(metrics.tool_calls, 1);
        assert_eq!(metrics.tokens_used, 300);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn token_budget_aborts_before_further_calls() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_turn(&[("call-1", "imagesorcery__detect")], (6, 6)),
            text_turn("never reached", StopReason::EndTurn, (1, 1)),
        ]));
        let adapter = adapter_with_tool("ok").await;
        let image = temp_image();

        let config = ConversationConfig {
            max_rounds: 2,
            max_tokens: 10,
            max_cost_usd: 1.0,
            timeout_seconds: 60,
            model: None,
        };

        let mut conversation = Conversation::new(provider.clone(), adapter, config);
        let err = conversation
            .execute(image.path().to_str().unwrap(), 10.0, "")
            .await
            .unwrap_err();

        assert_eq!(err.exceeded_bound(), Some(Bound::Tokens));
        assert_eq!(provider.calls(), 1);
        assert_eq!(conversation.metrics().tool_calls, 0);
    }

    #[tokio::test]
    async fn round_cap_allows_one_observing_call() {
        // Every turn asks for tools; with max_rounds = 2 the third call may
        // happen but must not start another tool round.
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_turn(&[("c1", "imagesorcery__detect")], (10, 10)),
            tool_turn(&[("c2", "imagesorcery__detect")], (10, 10)),
            tool_turn(&[("c3", "imagesorcery__detect")], (10, 10)),
        ]));
        let adapter = adapter_with_tool("ok").await;
        let image = temp_image();

        let config = ConversationConfig {
            max_rounds: 2,
            ..ConversationConfig::default()
        };

        let mut conversation = Conversation::new(provider.clone(), adapter, config);
        let err = conversation
            .execute(image.path().to_str().unwrap(), 10.0, "")
            .await
            .unwrap_err();

        assert_eq!(err.exceeded_bound(), Some(Bound::Rounds));
        assert_eq!(provider.calls(), 3);
        // The third turn's tools were never invoked.
        assert_eq!(conversation.metrics().tool_calls, 2);
    }

    #[tokio::test]
    async fn tool_results_are_one_user_message_with_matching_ids() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_turn(
                &[("id-a", "imagesorcery__detect"), ("id-b", "imagesorcery__detect")],
                (10, 10),
            ),
            text_turn("done", StopReason::EndTurn, (10, 10)),
        ]));
        let adapter = adapter_with_tool("ok").await;
        let image = temp_image();

        let mut conversation =
            Conversation::new(provider.clone(), adapter, ConversationConfig::default());
        conversation
            .execute(image.path().to_str().unwrap(), 10.0, "")
            .await
            .unwrap();

        // Second call saw: initial vision msg, assistant turn, one user msg
        // holding both tool results.
        let messages = provider.last_messages();
        assert_eq!(messages.len(), 3);

        let last = &messages[2];
        assert_eq!(last.role, Role::User);
        let ids: Vec<&str> = last
            .parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::ToolResult(result) => Some(result.tool_call_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec!["id-a", "id-b"]);
    }

    #[tokio::test]
    async fn tool_failure_becomes_error_payload_for_model() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_turn(&[("c1", "ghost__tool")], (10, 10)),
            text_turn("recovered", StopReason::EndTurn, (10, 10)),
        ]));
        let adapter = adapter_with_tool("ok").await;
        let image = temp_image();

        let mut conversation =
            Conversation::new(provider.clone(), adapter, ConversationConfig::default());
        let result = conversation
            .execute(image.path().to_str().unwrap(), 10.0, "")
            .await
            .unwrap();
        assert_eq!(result, "recovered");

        let messages = provider.last_messages();
        let ContentPart::ToolResult(tool_result) = &messages[2].parts[0] else {
            panic!("expected tool result part");
        };
        assert!(tool_result.is_error);
        assert!(tool_result.content.starts_with("Error:"));
    }

    #[tokio::test]
    async fn truncation_is_fatal() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_turn(
            "partial...",
            StopReason::MaxTokens,
            (10, 10),
        )]));
        let adapter = adapter_with_tool("ok").await;
        let image = temp_image();

        let mut conversation =
            Conversation::new(provider, adapter, ConversationConfig::default());
        let err = conversation
            .execute(image.path().to_str().unwrap(), 10.0, "")
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Truncated { round: 1 }));
    }

    #[tokio::test]
    async fn other_stop_with_text_succeeds_empty_fails() {
        let adapter = adapter_with_tool("ok").await;
        let image = temp_image();

        let provider = Arc::new(ScriptedProvider::new(vec![text_turn(
            "some text",
            StopReason::Other,
            (1, 1),
        )]));
        let mut conversation =
            Conversation::new(provider, adapter.clone(), ConversationConfig::default());
        let result = conversation
            .execute(image.path().to_str().unwrap(), 10.0, "")
            .await
            .unwrap();
        assert_eq!(result, "some text");

        let provider = Arc::new(ScriptedProvider::new(vec![ProviderTurn {
            parts: vec![],
            stop: StopReason::Other,
            usage: TokenUsage { input: 1, output: 1 },
            model: "scripted-model".to_string(),
        }]));
        let mut conversation =
            Conversation::new(provider, adapter, ConversationConfig::default());
        let err = conversation
            .execute(image.path().to_str().unwrap(), 10.0, "")
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::NoProgress { .. }));
    }

    #[tokio::test]
    async fn cancellation_stops_before_next_model_call() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_turn(
            "unreachable",
            StopReason::EndTurn,
            (1, 1),
        )]));
        let adapter = adapter_with_tool("ok").await;
        let image = temp_image();

        let token = CancellationToken::new();
        token.cancel();

        let mut conversation = Conversation::new(provider.clone(), adapter, ConversationConfig::default())
            .with_cancellation(token);
        let err = conversation
            .execute(image.path().to_str().unwrap(), 10.0, "")
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::Cancelled));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn user_prompt_lands_in_initial_message() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_turn(
            "ok",
            StopReason::EndTurn,
            (1, 1),
        )]));
        let adapter = adapter_with_tool("ok").await;
        let image = temp_image();

        let mut conversation =
            Conversation::new(provider.clone(), adapter, ConversationConfig::default());
        conversation
            .execute(image.path().to_str().unwrap(), 8.0, "make a shake animation")
            .await
            .unwrap();

        let messages = provider.last_messages();
        let ContentPart::Text(text) = &messages[0].parts[1] else {
            panic!("expected text part after image");
        };
        assert!(text.starts_with("make a shake animation"));
        assert!(text.contains("8.0-second"));
    }
}
