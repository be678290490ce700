//! Domain stage bodies over the MCP servers and FFmpeg.
//!
//! These are the collaborators the sequencer drives: segmentation via the
//! image server's detect+fill, pose landmarks via the pose server, motion
//! rendering and final composition via FFmpeg, and the music catalog
//! search. Inter-stage contracts flow through the manifest's result bag.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::{debug, info, warn};

use animata_mcp::McpClient;

use crate::error::PipelineError;
use crate::manifest::Manifest;
use crate::pipeline::StageExecutor;
use crate::stage::Stage;

/// Stage bodies backed by MCP clients.
pub struct McpSteps {
    image: Arc<McpClient>,
    pose: Arc<McpClient>,
    music: Arc<McpClient>,
}

impl McpSteps {
    /// Create the stage bodies over the three tool servers.
    #[must_use]
    pub fn new(image: Arc<McpClient>, pose: Arc<McpClient>, music: Arc<McpClient>) -> Self {
        Self { image, pose, music }
    }

    fn fail(stage: Stage, message: impl Into<String>) -> PipelineError {
        PipelineError::Stage {
            stage,
            message: message.into(),
        }
    }

    fn parameter(manifest: &Manifest, name: &str, default: f64) -> f64 {
        manifest
            .llm_analysis
            .as_ref()
            .and_then(|analysis| analysis.decision.parameter_f64(name))
            .unwrap_or(default)
    }

    /// Detect the person, then fill everything else transparent.
    async fn segment_person(&self, manifest: &mut Manifest) -> Result<(), PipelineError> {
        let stage = Stage::SegmentPerson;
        let image_path = manifest.input.image_path.clone();
        let confidence = Self::parameter(manifest, "detect_confidence", 0.3);

        let detect_args = json!({
            "input_path": image_path.as_str(),
            "confidence": confidence,
            "return_geometry": true,
            "geometry_format": "polygon",
        });

        let detection = self
            .image
            .call_tool("detect", Some(detect_args))
            .await
            .map_err(|e| Self::fail(stage, format!("detect tool failed: {e}")))?;

        let text = detection
            .first_text()
            .ok_or_else(|| Self::fail(stage, "detect returned no content"))?;
        let polygon = extract_person_polygon(text).map_err(|e| Self::fail(stage, e))?;

        let output_path = Path::new(&manifest.input.temp_dir)
            .join("segmented_person.png")
            .to_string_lossy()
            .into_owned();

        let fill_args = json!({
            "input_path": image_path.as_str(),
            "areas": [ { "polygon": polygon, "opacity": 0.0 } ],
            "invert_areas": true,
            "output_path": output_path.as_str(),
        });

        let filled = self
            .image
            .call_tool("fill", Some(fill_args))
            .await
            .map_err(|e| Self::fail(stage, format!("fill tool failed: {e}")))?;

        let segmented = parse_output_path(filled.first_text(), output_path);
        info!(path = %segmented, "subject segmented");

        manifest.complete_stage(stage, Some(json!({ "segmented_path": segmented.as_str() })));
        manifest.outputs_mut().segmented_image_path = Some(segmented);
        Ok(())
    }

    /// Estimate pose keypoints on the segmented (or original) image.
    async fn estimate_landmarks(&self, manifest: &mut Manifest) -> Result<(), PipelineError> {
        let stage = Stage::EstimateLandmarks;
        let image_path = manifest
            .result
            .as_ref()
            .and_then(|outputs| outputs.segmented_image_path.clone())
            .unwrap_or_else(|| manifest.input.image_path.clone());
        let confidence = Self::parameter(manifest, "landmark_confidence", 0.3);

        let args = json!({
            "image_path": image_path,
            "model_name": "yolov8n-pose.pt",
            "confidence": confidence,
        });

        let result = self
            .pose
            .call_tool("analyze_image_from_path", Some(args))
            .await
            .map_err(|e| Self::fail(stage, format!("pose tool failed: {e}")))?;

        let landmarks = result
            .first_text()
            .ok_or_else(|| Self::fail(stage, "pose estimation returned no content"))?
            .to_string();

        manifest.complete_stage(stage, Some(json!({ "landmarks": landmarks.as_str() })));
        manifest.outputs_mut().landmarks_data = Some(landmarks);
        Ok(())
    }

    /// Render a head-shake animation with an FFmpeg rotate filter.
    async fn render_motion(&self, manifest: &mut Manifest) -> Result<(), PipelineError> {
        let stage = Stage::RenderMotion;
        let source = manifest
            .result
            .as_ref()
            .and_then(|outputs| outputs.segmented_image_path.clone())
            .unwrap_or_else(|| manifest.input.image_path.clone());
        let duration = manifest.input.duration_seconds;

        let output_path = Path::new(&manifest.input.temp_dir)
            .join("headshake_animation.mp4")
            .to_string_lossy()
            .into_owned();

        // ±10° at two full cycles over the clip.
        let rotate = "rotate=10*PI/180*sin(4*PI*t):c=none";
        let duration_arg = format!("{duration:.1}");

        run_ffmpeg(&[
            "-loop", "1",
            "-i", &source,
            "-vf", rotate,
            "-t", &duration_arg,
            "-r", "15",
            "-pix_fmt", "yuv420p",
            "-y",
            &output_path,
        ])
        .await
        .map_err(|e| Self::fail(stage, e))?;

        manifest.complete_stage(stage, Some(json!({ "video_path": output_path.as_str() })));
        manifest.outputs_mut().motion_video_path = Some(output_path);
        Ok(())
    }

    /// Search the music catalog; a failed search skips the stage rather
    /// than failing the run.
    async fn search_music(&self, manifest: &mut Manifest) -> Result<(), PipelineError> {
        let stage = Stage::SearchMusic;
        let (count, mood) = manifest
            .llm_analysis
            .as_ref()
            .map(|analysis| {
                (
                    analysis.decision.music_count.max(1),
                    analysis.decision.music_mood.clone(),
                )
            })
            .unwrap_or((5, "happy".to_string()));

        info!(count, mood = %mood, "searching music catalog");

        let result = match self
            .music
            .call_tool("SearchRecordings", Some(json!({ "first": count })))
            .await
        {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, "music search failed, continuing without music");
                manifest.skip_stage(stage);
                manifest.outputs_mut().music_tracks = Some(Vec::new());
                return Ok(());
            }
        };

        let mut output = json!({ "track_count": 0 });
        let mut tracks = Vec::new();
        if let Some(text) = result.first_text() {
            debug!(bytes = text.len(), "music search payload");
            output["data"] = Value::String(text.to_string());
            if let Some((title, _)) = first_track(text) {
                tracks.push(title);
            }
            output["track_count"] = json!(tracks.len());
        }

        manifest.complete_stage(stage, Some(output));
        manifest.outputs_mut().music_tracks = Some(tracks);
        Ok(())
    }

    /// Mux the motion video with the selected track into the final output.
    async fn compose(&self, manifest: &mut Manifest) -> Result<(), PipelineError> {
        let stage = Stage::Compose;

        let source = manifest
            .result
            .as_ref()
            .and_then(|outputs| {
                outputs
                    .motion_video_path
                    .clone()
                    .or_else(|| outputs.segmented_image_path.clone())
            })
            .unwrap_or_else(|| manifest.input.image_path.clone());

        let output_path = Path::new(&manifest.input.output_dir)
            .join("final_output.mp4")
            .to_string_lossy()
            .into_owned();

        let music_data = manifest
            .stages
            .get(&Stage::SearchMusic)
            .and_then(|state| state.output.as_ref())
            .and_then(|output| output.get("data"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let mut muxed = false;
        if let Some(data) = music_data {
            if let Some((title, url)) = first_track(&data) {
                info!(track = %title, "adding soundtrack");
                match self.download_track(&url, &manifest.input.temp_dir).await {
                    Ok(track_path) => {
                        let mux = run_ffmpeg(&[
                            "-y",
                            "-i", &source,
                            "-i", &track_path,
                            "-c:v", "copy",
                            "-c:a", "aac",
                            "-shortest",
                            "-map", "0:v:0",
                            "-map", "1:a:0",
                            &output_path,
                        ])
                        .await;

                        let _ = tokio::fs::remove_file(&track_path).await;

                        match mux {
                            Ok(()) => muxed = true,
                            Err(err) => {
                                warn!(error = %err, "mux failed, falling back to silent video");
                            }
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "track download failed, continuing without music");
                    }
                }
            }
        }

        if !muxed {
            std::fs::copy(&source, &output_path)
                .map_err(|e| Self::fail(stage, format!("failed to copy output: {e}")))?;
        }

        info!(path = %output_path, "final video composed");
        manifest.complete_stage(stage, Some(json!({ "final_path": output_path.as_str() })));
        manifest.outputs_mut().final_output_path = Some(output_path);
        Ok(())
    }

    async fn download_track(&self, url: &str, temp_dir: &str) -> Result<String, String> {
        let response = reqwest::get(url)
            .await
            .map_err(|e| format!("download failed: {e}"))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| format!("download read failed: {e}"))?;

        let path = Path::new(temp_dir)
            .join("temp_music.mp3")
            .to_string_lossy()
            .into_owned();
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| format!("failed to write track: {e}"))?;
        Ok(path)
    }
}

#[async_trait]
impl StageExecutor for McpSteps {
    async fn run(&self, stage: Stage, manifest: &mut Manifest) -> Result<(), PipelineError> {
        match stage {
            Stage::SegmentPerson => self.segment_person(manifest).await,
            Stage::EstimateLandmarks => self.estimate_landmarks(manifest).await,
            Stage::RenderMotion => self.render_motion(manifest).await,
            Stage::SearchMusic => self.search_music(manifest).await,
            Stage::Compose => self.compose(manifest).await,
            Stage::Init | Stage::Complete => Err(Self::fail(stage, "stage has no executable body")),
        }
    }
}

/// Run ffmpeg and surface its stderr on failure.
async fn run_ffmpeg(args: &[&str]) -> Result<(), String> {
    debug!(?args, "running ffmpeg");

    let output = Command::new("ffmpeg")
        .args(args)
        .output()
        .await
        .map_err(|e| format!("failed to run ffmpeg: {e}"))?;

    if output.status.success() {
        Ok(())
    } else {
        Err(format!(
            "ffmpeg exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        ))
    }
}

/// Pull the first person polygon out of a detect result.
fn extract_person_polygon(text: &str) -> Result<Value, String> {
    let parsed: Value =
        serde_json::from_str(text).map_err(|e| format!("failed to parse detection result: {e}"))?;

    let detections = parsed
        .get("detections")
        .and_then(Value::as_array)
        .filter(|detections| !detections.is_empty())
        .ok_or_else(|| "no detections found in image".to_string())?;

    detections
        .iter()
        .find(|detection| detection.get("class").and_then(Value::as_str) == Some("person"))
        .and_then(|detection| detection.get("polygon"))
        .cloned()
        .ok_or_else(|| "no person with polygon found in image".to_string())
}

/// The fill tool answers with either JSON `{"output_path": ...}` or the
/// bare path as text.
fn parse_output_path(text: Option<&str>, fallback: String) -> String {
    let Some(text) = text else {
        return fallback;
    };

    if let Ok(parsed) = serde_json::from_str::<Value>(text) {
        if let Some(path) = parsed.get("output_path").and_then(Value::as_str) {
            return path.to_string();
        }
    }

    let trimmed = text.trim();
    if trimmed.is_empty() {
        fallback
    } else {
        trimmed.to_string()
    }
}

/// First track title and preview URL from a catalog search payload.
fn first_track(data: &str) -> Option<(String, String)> {
    let parsed: Value = serde_json::from_str(data).ok()?;
    let recording = parsed
        .get("data")?
        .get("recordings")?
        .get("nodes")?
        .as_array()?
        .first()?
        .get("recording")?;

    let title = recording.get("title")?.as_str()?.to_string();
    let url = recording
        .get("audioFile")?
        .get("lqmp3Url")?
        .as_str()?
        .to_string();
    Some((title, url))
}
