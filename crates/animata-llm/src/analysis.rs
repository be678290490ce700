//! Pipeline planning payloads.
//!
//! A decision marks which pipeline stages are worth running for a given
//! image; the analysis wraps it with provenance. Both are recorded in the
//! manifest so a resumed run replays the same plan.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Which stages to run and with what parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDecision {
    /// Whether to isolate the subject from the background
    pub need_segment: bool,
    /// Whether to estimate pose landmarks
    pub need_landmarks: bool,
    /// Whether to render motion
    pub enable_motion: bool,
    /// Whether to search for music
    pub need_music: bool,

    /// Stage-specific parameters (confidence thresholds, intensities)
    #[serde(default)]
    pub parameters: Value,

    /// Stage name → recovery action when that stage fails
    #[serde(default)]
    pub error_recovery: HashMap<String, String>,

    /// Model's description of the image content
    #[serde(default)]
    pub image_description: String,
    /// Suggested music mood
    #[serde(default)]
    pub music_mood: String,
    /// Suggested music genres
    #[serde(default)]
    pub music_genres: Vec<String>,
    /// Number of tracks to request
    #[serde(default)]
    pub music_count: u32,
}

impl PipelineDecision {
    /// The plan used when no model analysis is available: run everything
    /// with conservative defaults.
    #[must_use]
    pub fn default_lightweight() -> Self {
        Self {
            need_segment: true,
            need_landmarks: true,
            enable_motion: true,
            need_music: true,
            parameters: json!({
                "detect_confidence": 0.3,
                "landmark_confidence": 0.3,
                "motion_intensity": 1.0,
                "music_search_timeout": 30,
            }),
            error_recovery: HashMap::from([
                ("segment_person".to_string(), "use_original".to_string()),
                ("estimate_landmarks".to_string(), "skip".to_string()),
                ("render_motion".to_string(), "static_image".to_string()),
                ("search_music".to_string(), "continue_without_music".to_string()),
                ("compose".to_string(), "fail".to_string()),
            ]),
            image_description: "Default configuration - analysis skipped".to_string(),
            music_mood: "happy".to_string(),
            music_genres: vec!["pop".to_string(), "electronic".to_string()],
            music_count: 5,
        }
    }

    /// A numeric parameter by name, when present.
    #[must_use]
    pub fn parameter_f64(&self, name: &str) -> Option<f64> {
        self.parameters.get(name).and_then(Value::as_f64)
    }
}

/// A recorded model analysis: the decision plus provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmAnalysis {
    /// The plan
    pub decision: PipelineDecision,
    /// Model's reasoning, when reported
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasoning_steps: Vec<String>,
    /// Per-decision confidence, when reported
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub confidence_scores: HashMap<String, f64>,
    /// Model that produced the analysis
    #[serde(default)]
    pub model: String,
    /// Tokens spent on the analysis
    #[serde(default)]
    pub tokens_used: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_decision_runs_everything() {
        let decision = PipelineDecision::default_lightweight();
        assert!(decision.need_segment);
        assert!(decision.need_landmarks);
        assert!(decision.enable_motion);
        assert!(decision.need_music);
        assert_eq!(decision.parameter_f64("detect_confidence"), Some(0.3));
        assert_eq!(decision.parameter_f64("unknown"), None);
    }

    #[test]
    fn analysis_round_trips_through_json() {
        let analysis = LlmAnalysis {
            decision: PipelineDecision::default_lightweight(),
            reasoning_steps: vec!["portrait photo".to_string()],
            confidence_scores: HashMap::from([("need_segment".to_string(), 0.9)]),
            model: "claude-sonnet-4-20250514".to_string(),
            tokens_used: 1234,
        };

        let json = serde_json::to_string(&analysis).unwrap();
        let parsed: LlmAnalysis = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.model, analysis.model);
        assert!(parsed.decision.need_music);
        assert_eq!(parsed.confidence_scores["need_segment"], 0.9);
    }
}
