//! The stage sequencer.
//!
//! Runs the planned stages strictly serially, skipping completed ones,
//! persisting the manifest after every transition, and halting on failure
//! so a later invocation with the same pipeline id resumes where it left
//! off. The stage bodies themselves are collaborators behind
//! [`StageExecutor`]; the sequencer guarantees ordering, idempotence, retry
//! accounting, and durability, never stage semantics.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use animata_llm::{LlmAnalysis, PipelineDecision};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::input::{PipelineInput, PipelineOutputs};
use crate::manifest::Manifest;
use crate::stage::{Stage, StageStatus};

/// A provider of stage bodies.
///
/// The body reads prior stages' outputs from the manifest and records its
/// own via the mutators; the sequencer persists whatever it wrote. A body
/// may also mark its stage skipped and return success.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Run one stage against the manifest.
    ///
    /// # Errors
    /// Any error fails the stage; the sequencer records it and halts.
    async fn run(&self, stage: Stage, manifest: &mut Manifest) -> Result<(), PipelineError>;
}

/// The deterministic pipeline sequencer.
pub struct Pipeline<E: StageExecutor> {
    executor: E,
    config: PipelineConfig,
    cancel: CancellationToken,
}

impl<E: StageExecutor> Pipeline<E> {
    /// Create a sequencer over a stage executor.
    #[must_use]
    pub fn new(executor: E, config: PipelineConfig) -> Self {
        Self {
            executor,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Attach an ambient cancellation token, honored at stage boundaries.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Execute (or resume) the pipeline.
    ///
    /// # Errors
    /// Validation, manifest, stage, and retry-bound failures; in every case
    /// the manifest on disk reflects the last completed transition.
    pub async fn execute(
        &self,
        input: PipelineInput,
        pipeline_id: &str,
    ) -> Result<PipelineOutputs, PipelineError> {
        self.execute_with_analysis(input, pipeline_id, None).await
    }

    /// Execute with an optional up-front analysis.
    ///
    /// The analysis (and the plan inside it) is recorded in the manifest on
    /// first run, so a resumed run replays the same plan even if a fresh
    /// analysis would now decide differently.
    ///
    /// # Errors
    /// As [`execute`](Self::execute).
    pub async fn execute_with_analysis(
        &self,
        input: PipelineInput,
        pipeline_id: &str,
        analysis: Option<LlmAnalysis>,
    ) -> Result<PipelineOutputs, PipelineError> {
        input.validate()?;

        let mut manifest = match Manifest::load(&self.config.manifest_path)? {
            Some(manifest) => {
                info!(
                    pipeline = %manifest.pipeline_id,
                    stage = %manifest.current_stage,
                    "resuming pipeline"
                );
                manifest
            }
            None => {
                info!(pipeline = %pipeline_id, "starting new pipeline");
                let mut manifest = Manifest::new(pipeline_id, input);
                manifest.llm_analysis = analysis;
                manifest
            }
        };

        // A stage left running by a crash counts as a failed attempt.
        manifest.normalize_interrupted();

        let decision = manifest
            .llm_analysis
            .as_ref()
            .map(|analysis| analysis.decision.clone())
            .unwrap_or_else(PipelineDecision::default_lightweight);

        let plan = plan_stages(&decision);
        info!(stages = plan.len(), "executing plan: {:?}", plan);

        for stage in plan {
            if self.cancel.is_cancelled() {
                manifest.save(&self.config.manifest_path)?;
                return Err(PipelineError::Cancelled);
            }

            if manifest.is_stage_completed(stage) {
                debug!(stage = %stage, "already completed, skipping");
                continue;
            }

            if !manifest.can_retry(stage, self.config.max_retries) {
                let attempts = manifest.stages[&stage].retry_count;
                return Err(PipelineError::RetriesExhausted { stage, attempts });
            }

            manifest.start_stage(stage);
            manifest.save(&self.config.manifest_path)?;
            info!(stage = %stage, "stage started");

            match self.executor.run(stage, &mut manifest).await {
                Ok(()) => {
                    // Bodies may complete or skip themselves; close out the
                    // ones that just returned.
                    if manifest.stages[&stage].status == StageStatus::Running {
                        manifest.complete_stage(stage, None);
                    }
                    manifest.save(&self.config.manifest_path)?;
                    info!(stage = %stage, "stage finished");
                }
                Err(err) => {
                    // Bodies already report as stage failures; don't nest.
                    let message = match err {
                        PipelineError::Stage { message, .. } => message,
                        other => other.to_string(),
                    };
                    manifest.fail_stage(stage, &message);
                    manifest.save(&self.config.manifest_path)?;
                    return Err(PipelineError::Stage { stage, message });
                }
            }
        }

        manifest.current_stage = Stage::Complete;
        manifest.save(&self.config.manifest_path)?;
        info!(pipeline = %manifest.pipeline_id, "pipeline complete");

        Ok(manifest.result.unwrap_or_default())
    }
}

/// Stages to run for a decision, in declared order. Compose always runs.
fn plan_stages(decision: &PipelineDecision) -> Vec<Stage> {
    let mut plan = Vec::new();
    if decision.need_segment {
        plan.push(Stage::SegmentPerson);
    }
    if decision.need_landmarks {
        plan.push(Stage::EstimateLandmarks);
    }
    if decision.enable_motion {
        plan.push(Stage::RenderMotion);
    }
    if decision.need_music {
        plan.push(Stage::SearchMusic);
    }
    plan.push(Stage::Compose);
    plan
}
