//! The durable pipeline manifest.
//!
//! One JSON document per pipeline, written atomically: serialize to a
//! sibling `.tmp`, then rename. The rename is the commit point; a crash
//! before it leaves the previous manifest intact, a crash after it is
//! durable.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use animata_llm::LlmAnalysis;

use crate::error::PipelineError;
use crate::input::{PipelineInput, PipelineOutputs};
use crate::stage::{Stage, StageStatus};

/// State of a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageState {
    /// Current status
    pub status: StageStatus,
    /// When the last attempt started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the stage completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Failed attempts so far; monotonically non-decreasing
    #[serde(default)]
    pub retry_count: u32,
    /// Message from the last failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stage-specific output, opaque to the sequencer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

impl StageState {
    fn pending() -> Self {
        Self {
            status: StageStatus::Pending,
            started_at: None,
            completed_at: None,
            retry_count: 0,
            error: None,
            output: None,
        }
    }
}

/// The pipeline's durable source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Caller-assigned pipeline id
    pub pipeline_id: String,
    /// When this manifest was created
    pub created_at: DateTime<Utc>,
    /// Refreshed on every save
    pub updated_at: DateTime<Utc>,

    /// Immutable run parameters
    pub input: PipelineInput,

    /// Recorded plan; a resumed run replays it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_analysis: Option<LlmAnalysis>,

    /// The stage currently running, or a lifecycle marker
    pub current_stage: Stage,
    /// Per-stage state
    pub stages: BTreeMap<Stage, StageState>,

    /// Artifacts produced so far
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<PipelineOutputs>,
}

impl Manifest {
    /// Create a fresh manifest for a pipeline id.
    #[must_use]
    pub fn new(pipeline_id: impl Into<String>, input: PipelineInput) -> Self {
        let now = Utc::now();
        Self {
            pipeline_id: pipeline_id.into(),
            created_at: now,
            updated_at: now,
            input,
            llm_analysis: None,
            current_stage: Stage::Init,
            stages: BTreeMap::new(),
            result: None,
        }
    }

    /// Load a manifest from disk.
    ///
    /// An absent file is not an error: it means a fresh run.
    ///
    /// # Errors
    /// I/O failures other than absence, and unparseable content.
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Self>, PipelineError> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        Ok(Some(serde_json::from_str(&data)?))
    }

    /// Persist the manifest atomically.
    ///
    /// # Errors
    /// Serialization or I/O failures; on a failed rename the temp file is
    /// removed.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<(), PipelineError> {
        self.updated_at = Utc::now();

        let path = path.as_ref();
        let data = serde_json::to_string_pretty(self)?;

        let tmp = sibling_tmp(path);
        fs::write(&tmp, data)?;

        if let Err(err) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }

        Ok(())
    }

    /// The state for a stage, created pending if absent.
    pub fn stage_state_mut(&mut self, stage: Stage) -> &mut StageState {
        self.stages.entry(stage).or_insert_with(StageState::pending)
    }

    /// Mark a stage running and make it the current stage.
    pub fn start_stage(&mut self, stage: Stage) {
        let state = self.stage_state_mut(stage);
        state.status = StageStatus::Running;
        state.started_at = Some(Utc::now());
        self.current_stage = stage;
    }

    /// Mark a stage completed, recording its output.
    pub fn complete_stage(&mut self, stage: Stage, output: Option<Value>) {
        let state = self.stage_state_mut(stage);
        state.status = StageStatus::Completed;
        state.completed_at = Some(Utc::now());
        if output.is_some() {
            state.output = output;
        }
    }

    /// Mark a stage failed and count the attempt.
    pub fn fail_stage(&mut self, stage: Stage, error: impl Into<String>) {
        let state = self.stage_state_mut(stage);
        state.status = StageStatus::Failed;
        state.error = Some(error.into());
        state.retry_count += 1;
    }

    /// Mark a stage deliberately skipped.
    pub fn skip_stage(&mut self, stage: Stage) {
        self.stage_state_mut(stage).status = StageStatus::Skipped;
    }

    /// Whether a stage already completed (idempotence check).
    #[must_use]
    pub fn is_stage_completed(&self, stage: Stage) -> bool {
        self.stages
            .get(&stage)
            .is_some_and(|state| state.status == StageStatus::Completed)
    }

    /// Whether a stage may be attempted again under the retry bound.
    #[must_use]
    pub fn can_retry(&self, stage: Stage, max_retries: u32) -> bool {
        self.stages
            .get(&stage)
            .map_or(true, |state| state.retry_count < max_retries)
    }

    /// Convert stages left `running` by a crash into counted failed
    /// attempts, so resume sees them for what they were.
    pub fn normalize_interrupted(&mut self) {
        let interrupted: Vec<Stage> = self
            .stages
            .iter()
            .filter(|(_, state)| state.status == StageStatus::Running)
            .map(|(stage, _)| *stage)
            .collect();

        for stage in interrupted {
            warn!(stage = %stage, "stage was interrupted mid-run, counting as a failed attempt");
            self.fail_stage(stage, "interrupted before completion");
        }
    }

    /// The result bag, created empty on first use.
    pub fn outputs_mut(&mut self) -> &mut PipelineOutputs {
        self.result.get_or_insert_with(PipelineOutputs::default)
    }
}

/// `manifest.json` becomes `manifest.json.tmp`, in the same directory.
fn sibling_tmp(path: &Path) -> std::path::PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    std::path::PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

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
    fn load_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Manifest::load(dir.path().join("manifest.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn load_unparseable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            Manifest::load(&path),
            Err(PipelineError::ManifestParse(_))
        ));
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");

        let mut manifest = Manifest::new("pipeline-1", input());
        manifest.start_stage(Stage::SegmentPerson);
        manifest.complete_stage(Stage::SegmentPerson, Some(json!({ "segmented_path": "/a.png" })));
        manifest.save(&path).unwrap();

        let loaded = Manifest::load(&path).unwrap().unwrap();
        assert_eq!(loaded.pipeline_id, "pipeline-1");
        assert_eq!(loaded.current_stage, Stage::SegmentPerson);
        assert!(loaded.is_stage_completed(Stage::SegmentPerson));
        assert_eq!(
            loaded.stages[&Stage::SegmentPerson].output.as_ref().unwrap()["segmented_path"],
            "/a.png"
        );
        assert!(loaded.updated_at >= loaded.created_at);
    }

    #[test]
    fn save_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");

        let mut manifest = Manifest::new("pipeline-1", input());
        manifest.save(&path).unwrap();

        assert!(path.exists());
        assert!(!sibling_tmp(&path).exists());
    }

    #[test]
    fn crash_before_rename_preserves_previous_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");

        let mut manifest = Manifest::new("pipeline-1", input());
        manifest.complete_stage(Stage::SegmentPerson, None);
        manifest.save(&path).unwrap();

        // Simulate a crash that wrote the temp file but never renamed it.
        manifest.complete_stage(Stage::EstimateLandmarks, None);
        let half_written = serde_json::to_string_pretty(&manifest).unwrap();
        fs::write(sibling_tmp(&path), half_written).unwrap();

        let loaded = Manifest::load(&path).unwrap().unwrap();
        assert!(loaded.is_stage_completed(Stage::SegmentPerson));
        assert!(!loaded.is_stage_completed(Stage::EstimateLandmarks));
    }

    #[test]
    fn fail_stage_counts_attempts_monotonically() {
        let mut manifest = Manifest::new("pipeline-1", input());

        manifest.fail_stage(Stage::RenderMotion, "ffmpeg exploded");
        assert_eq!(manifest.stages[&Stage::RenderMotion].retry_count, 1);
        assert!(manifest.can_retry(Stage::RenderMotion, 3));

        manifest.fail_stage(Stage::RenderMotion, "again");
        manifest.fail_stage(Stage::RenderMotion, "and again");
        assert_eq!(manifest.stages[&Stage::RenderMotion].retry_count, 3);
        assert!(!manifest.can_retry(Stage::RenderMotion, 3));
    }

    #[test]
    fn unknown_stage_can_always_be_tried() {
        let manifest = Manifest::new("pipeline-1", input());
        assert!(manifest.can_retry(Stage::Compose, 1));
    }

    #[test]
    fn interrupted_running_stage_becomes_failed_attempt() {
        let mut manifest = Manifest::new("pipeline-1", input());
        manifest.start_stage(Stage::RenderMotion);

        manifest.normalize_interrupted();

        let state = &manifest.stages[&Stage::RenderMotion];
        assert_eq!(state.status, StageStatus::Failed);
        assert_eq!(state.retry_count, 1);
        assert!(state.error.as_deref().unwrap().contains("interrupted"));
    }

    #[test]
    fn manifest_json_uses_wire_keys() {
        let mut manifest = Manifest::new("pipeline-7", input());
        manifest.start_stage(Stage::SegmentPerson);

        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(json["pipeline_id"], "pipeline-7");
        assert_eq!(json["current_stage"], "segment_person");
        assert_eq!(json["stages"]["segment_person"]["status"], "running");
        // RFC 3339 timestamps
        assert!(json["created_at"].as_str().unwrap().contains('T'));
    }
}
