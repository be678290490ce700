//! # animata-pipeline
//!
//! The deterministic half of the animata agent runtime: a stage sequencer
//! with a durable, atomically-updated manifest, idempotent execution, and a
//! bounded retry policy, plus the orchestrator that can hand the whole task
//! to the LLM-driven agent loop instead.
//!
//! # Resumability
//!
//! Every stage transition is persisted before the next stage boundary.
//! Re-running with the same pipeline id and manifest path skips completed
//! stages, retries the failed one while the retry bound allows, and fails
//! permanently once it does not.
//!
//! # Example
//!
//! ```rust,no_run
//! use animata_pipeline::{Pipeline, PipelineConfig, PipelineInput, McpSteps};
//! # use std::sync::Arc;
//!
//! # async fn run(image: Arc<animata_mcp::McpClient>, pose: Arc<animata_mcp::McpClient>, music: Arc<animata_mcp::McpClient>) -> Result<(), Box<dyn std::error::Error>> {
//! let steps = McpSteps::new(image, pose, music);
//! let pipeline = Pipeline::new(steps, PipelineConfig::default());
//!
//! let input = PipelineInput {
//!     image_path: "/abs/in.png".into(),
//!     duration_seconds: 10.0,
//!     user_prompt: String::new(),
//!     output_dir: "output".into(),
//!     temp_dir: ".pipeline_tmp/run-1".into(),
//! };
//! let outputs = pipeline.execute(input, "run-1").await?;
//! println!("{:?}", outputs.final_output_path);
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod input;
mod manifest;
mod orchestrator;
mod pipeline;
mod stage;
mod steps;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use input::{PipelineInput, PipelineOutputs};
pub use manifest::{Manifest, StageState};
pub use orchestrator::Orchestrator;
pub use pipeline::{Pipeline, StageExecutor};
pub use stage::{Stage, StageStatus};
pub use steps::McpSteps;
