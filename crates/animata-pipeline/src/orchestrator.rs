//! The orchestrator: routes a task to the scripted pipeline or the agent
//! loop.
//!
//! Both strategies share the same tool layer; the choice is configuration,
//! not code. The manifest belongs to the scripted path; the agent path is
//! ephemeral and reports only its final result and metrics.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use animata_llm::{AgentMode, Conversation, LlmConfig, Provider, ToolAdapter};

use crate::error::PipelineError;
use crate::input::{PipelineInput, PipelineOutputs};
use crate::pipeline::{Pipeline, StageExecutor};

/// Entry point for one image→video task.
pub struct Orchestrator<E: StageExecutor> {
    pipeline: Pipeline<E>,
    llm: LlmConfig,
    agent: Option<(Arc<dyn Provider>, Arc<ToolAdapter>)>,
    cancel: CancellationToken,
}

impl<E: StageExecutor> Orchestrator<E> {
    /// Create an orchestrator over the scripted pipeline.
    #[must_use]
    pub fn new(pipeline: Pipeline<E>, llm: LlmConfig) -> Self {
        Self {
            pipeline,
            llm,
            agent: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Enable the agent strategy with a provider and the shared tool layer.
    #[must_use]
    pub fn with_agent(mut self, provider: Arc<dyn Provider>, adapter: Arc<ToolAdapter>) -> Self {
        self.agent = Some((provider, adapter));
        self
    }

    /// Attach an ambient cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run the task, picking the strategy from configuration.
    ///
    /// Full-AI mode requires the LLM to be enabled and an agent to be
    /// attached; otherwise the scripted pipeline runs.
    ///
    /// # Errors
    /// Whatever the selected strategy surfaces; see [`PipelineError`].
    pub async fn run(
        &self,
        input: PipelineInput,
        pipeline_id: &str,
    ) -> Result<PipelineOutputs, PipelineError> {
        let full_ai = self.llm.enabled && self.llm.mode == AgentMode::FullAi;

        match (&self.agent, full_ai) {
            (Some((provider, adapter)), true) => {
                info!(pipeline = %pipeline_id, provider = %provider.name(), "running in full AI mode");
                self.run_agent(provider, adapter, &input).await
            }
            _ => self.pipeline.execute(input, pipeline_id).await,
        }
    }

    async fn run_agent(
        &self,
        provider: &Arc<dyn Provider>,
        adapter: &Arc<ToolAdapter>,
        input: &PipelineInput,
    ) -> Result<PipelineOutputs, PipelineError> {
        let mut conversation = Conversation::new(
            Arc::clone(provider),
            Arc::clone(adapter),
            self.llm.full_ai.clone(),
        )
        .with_cancellation(self.cancel.clone());

        let result = conversation
            .execute(&input.image_path, input.duration_seconds, &input.user_prompt)
            .await?;

        let metrics = conversation.metrics();
        info!(
            rounds = metrics.rounds,
            tool_calls = metrics.tool_calls,
            tokens = metrics.tokens_used,
            duration_s = metrics.duration_seconds,
            cost_usd = metrics.cost_usd,
            "agent conversation finished"
        );

        // The agent reports where it left the final artifact.
        Ok(PipelineOutputs {
            final_output_path: Some(result),
            ..PipelineOutputs::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::io::Write as _;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use animata_llm::{
        CompletionRequest, ContentPart, LlmError, ProviderTurn, StopReason, TokenUsage,
    };

    use super::*;
    use crate::config::PipelineConfig;
    use crate::manifest::Manifest;
    use crate::stage::Stage;

    /// Executor that records whether the scripted path ran.
    #[derive(Default)]
    struct RecordingExecutor {
        ran: Mutex<Vec<Stage>>,
    }

    #[async_trait]
    impl StageExecutor for &RecordingExecutor {
        async fn run(&self, stage: Stage, manifest: &mut Manifest) -> Result<(), PipelineError> {
            self.ran.lock().unwrap().push(stage);
            manifest.complete_stage(stage, None);
            Ok(())
        }
    }

    /// Provider that immediately ends the turn with a fixed answer.
    #[derive(Debug)]
    struct OneShotProvider;

    #[async_trait]
    impl Provider for OneShotProvider {
        fn name(&self) -> &str {
            "oneshot"
        }
        fn default_model(&self) -> &str {
            "oneshot-model"
        }
        fn price_per_token(&self) -> f64 {
            0.000_001
        }
        async fn complete(&self, _request: CompletionRequest<'_>) -> Result<ProviderTurn, LlmError> {
            Ok(ProviderTurn {
                parts: vec![ContentPart::Text("/tmp/out/final.mp4".to_string())],
                stop: StopReason::EndTurn,
                usage: TokenUsage { input: 10, output: 5 },
                model: "oneshot-model".to_string(),
            })
        }
    }

    fn task_input(dir: &tempfile::TempDir, image: &tempfile::NamedTempFile) -> PipelineInput {
        PipelineInput {
            image_path: image.path().to_string_lossy().into_owned(),
            duration_seconds: 10.0,
            user_prompt: "shake it".to_string(),
            output_dir: dir.path().to_string_lossy().into_owned(),
            temp_dir: dir.path().to_string_lossy().into_owned(),
        }
    }

    #[tokio::test]
    async fn lightweight_mode_runs_the_scripted_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let mut image = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        image.write_all(b"img").unwrap();

        let executor = RecordingExecutor::default();
        let pipeline = Pipeline::new(
            &executor,
            PipelineConfig {
                max_retries: 3,
                manifest_path: dir.path().join("m.json").to_string_lossy().into_owned(),
            },
        );

        let orchestrator = Orchestrator::new(pipeline, LlmConfig::default());
        orchestrator
            .run(task_input(&dir, &image), "pipeline-1")
            .await
            .unwrap();

        assert_eq!(executor.ran.lock().unwrap().len(), Stage::ORDERED.len());
    }

    #[tokio::test]
    async fn full_ai_mode_routes_to_the_agent() {
        let dir = tempfile::tempdir().unwrap();
        let mut image = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        image.write_all(b"img").unwrap();

        let executor = RecordingExecutor::default();
        let pipeline = Pipeline::new(
            &executor,
            PipelineConfig {
                max_retries: 3,
                manifest_path: dir.path().join("m.json").to_string_lossy().into_owned(),
            },
        );

        let mut llm = LlmConfig::default();
        llm.enabled = true;
        llm.mode = AgentMode::FullAi;

        let adapter = Arc::new(ToolAdapter::new(BTreeMap::new()));
        let orchestrator = Orchestrator::new(pipeline, llm)
            .with_agent(Arc::new(OneShotProvider), adapter);

        let outputs = orchestrator
            .run(task_input(&dir, &image), "pipeline-1")
            .await
            .unwrap();

        assert_eq!(outputs.final_output_path.as_deref(), Some("/tmp/out/final.mp4"));
        // The scripted stages never ran.
        assert!(executor.ran.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn full_ai_without_an_agent_falls_back_to_scripted() {
        let dir = tempfile::tempdir().unwrap();
        let mut image = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        image.write_all(b"img").unwrap();

        let executor = RecordingExecutor::default();
        let pipeline = Pipeline::new(
            &executor,
            PipelineConfig {
                max_retries: 3,
                manifest_path: dir.path().join("m.json").to_string_lossy().into_owned(),
            },
        );

        let mut llm = LlmConfig::default();
        llm.enabled = true;
        llm.mode = AgentMode::FullAi;

        let orchestrator = Orchestrator::new(pipeline, llm);
        orchestrator
            .run(task_input(&dir, &image), "pipeline-1")
            .await
            .unwrap();

        assert!(!executor.ran.lock().unwrap().is_empty());
    }
}
