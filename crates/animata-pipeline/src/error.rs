//! Pipeline error types.

use thiserror::Error;

use crate::stage::Stage;

/// Errors that can occur running a pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Input failed validation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Manifest could not be read or written
    #[error("Manifest I/O failed: {0}")]
    ManifestIo(#[from] std::io::Error),

    /// Manifest on disk is not valid JSON
    #[error("Manifest parse failed: {0}")]
    ManifestParse(#[from] serde_json::Error),

    /// A stage body failed; retriable until the bound is hit
    #[error("Stage {stage} failed: {message}")]
    Stage {
        /// Which stage
        stage: Stage,
        /// What went wrong
        message: String,
    },

    /// A stage failed more times than the configured bound allows
    #[error("Stage {stage} exceeded max retries ({attempts})")]
    RetriesExhausted {
        /// Which stage
        stage: Stage,
        /// Attempts recorded in the manifest
        attempts: u32,
    },

    /// The agent conversation failed
    #[error("Agent conversation failed: {0}")]
    Conversation(#[from] animata_llm::LlmError),

    /// Ambient cancellation fired; the manifest was persisted first
    #[error("Pipeline cancelled")]
    Cancelled,
}
