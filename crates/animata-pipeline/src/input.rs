//! Pipeline input and the result bag.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Immutable parameters for one pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineInput {
    /// Source image
    pub image_path: String,
    /// Target video duration in seconds; must be positive
    pub duration_seconds: f64,
    /// Optional user request (e.g. "make a shake animation")
    #[serde(default)]
    pub user_prompt: String,
    /// Directory for final outputs
    pub output_dir: String,
    /// Directory for intermediate files
    pub temp_dir: String,
}

impl PipelineInput {
    /// Validate the input before starting a run.
    ///
    /// # Errors
    /// Returns [`PipelineError::InvalidInput`] naming the offending field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.image_path.is_empty() {
            return Err(PipelineError::InvalidInput("image_path is required".to_string()));
        }
        if self.duration_seconds <= 0.0 {
            return Err(PipelineError::InvalidInput(
                "duration_seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Artifacts produced by the stages.
///
/// The manifest owns this bag; each stage only appends or replaces its own
/// fields. The sequencer persists it without interpreting it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineOutputs {
    /// Subject-isolated image, from segmentation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segmented_image_path: Option<String>,
    /// Raw landmarks payload, from pose estimation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landmarks_data: Option<String>,
    /// Silent motion video, from rendering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motion_video_path: Option<String>,
    /// Track descriptions, from the music search
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music_tracks: Option<Vec<String>>,
    /// The final video
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_output_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> PipelineInput {
        PipelineInput {
            image_path: "/tmp/in.png".to_string(),
            duration_seconds: 10.0,
            user_prompt: String::new(),
            output_dir: "/tmp/out".to_string(),
            temp_dir: "/tmp/work".to_string(),
        }
    }

    #[test]
    fn valid_input_passes() {
        assert!(input().validate().is_ok());
    }

    #[test]
    fn missing_image_is_rejected() {
        let mut input = input();
        input.image_path = String::new();
        assert!(matches!(
            input.validate(),
            Err(PipelineError::InvalidInput(_))
        ));
    }

    #[test]
    fn non_positive_duration_is_rejected() {
        let mut input = input();
        input.duration_seconds = 0.0;
        assert!(input.validate().is_err());

        input.duration_seconds = -3.0;
        assert!(input.validate().is_err());
    }

    #[test]
    fn empty_outputs_serialize_to_empty_object() {
        let json = serde_json::to_string(&PipelineOutputs::default()).unwrap();
        assert_eq!(json, "{}");
    }
}
