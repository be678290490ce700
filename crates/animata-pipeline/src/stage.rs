//! The closed stage enumeration and per-stage status.

use serde::{Deserialize, Serialize};

/// A stage in the deterministic pipeline.
///
/// Declaration order is the execution order; the derived `Ord` is the total
/// order the sequencer runs in. `Init` and `Complete` are markers for
/// `current_stage`, never scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Manifest created, nothing run yet
    Init,
    /// Isolate the subject from the background
    SegmentPerson,
    /// Estimate pose landmarks
    EstimateLandmarks,
    /// Render the motion video
    RenderMotion,
    /// Search the music catalog
    SearchMusic,
    /// Mux video and audio into the final output
    Compose,
    /// Terminal marker
    Complete,
}

impl Stage {
    /// The runnable stages in execution order.
    pub const ORDERED: [Stage; 5] = [
        Stage::SegmentPerson,
        Stage::EstimateLandmarks,
        Stage::RenderMotion,
        Stage::SearchMusic,
        Stage::Compose,
    ];
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::SegmentPerson => "segment_person",
            Self::EstimateLandmarks => "estimate_landmarks",
            Self::RenderMotion => "render_motion",
            Self::SearchMusic => "search_music",
            Self::Compose => "compose",
            Self::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Execution status of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Not yet attempted
    Pending,
    /// Body currently executing
    Running,
    /// Finished successfully; output recorded
    Completed,
    /// Last attempt failed; may be retried
    Failed,
    /// Deliberately not run
    Skipped,
}
