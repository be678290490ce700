//! Pipeline configuration surface.

use serde::{Deserialize, Serialize};

fn default_max_retries() -> u32 {
    3
}

fn default_manifest_path() -> String {
    "pipeline_manifest.json".to_string()
}

/// Execution parameters for the scripted pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// How many failed attempts a stage gets before the run fails for good
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Where the manifest lives
    #[serde(default = "default_manifest_path")]
    pub manifest_path: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            manifest_path: default_manifest_path(),
        }
    }
}
