//! Client for an IndexTTS server exposed through the Gradio event API.
//!
//! One synthesis is three requests: POST the arguments to
//! `gradio_api/call/gen_single` to get an event id, GET the event stream for
//! that id and take its last `data:` line, then download the produced file.
//! Local voice references are uploaded first.

use crate::error::{BookVoiceError, Result};
use crate::project::Emotion;
use crate::synth::synthesizer::{SynthesisRequest, Synthesizer};
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const EMOTION_WEIGHT: f64 = 0.7;
const MAX_TEXT_TOKENS: u32 = 400;
const MAX_MEL_TOKENS: u32 = 1500;

#[derive(Debug, Clone)]
pub struct IndexTtsClient {
    http: reqwest::Client,
    base_url: String,
    voice_dir: PathBuf,
    default_voice: String,
}

#[derive(Deserialize)]
struct EventId {
    event_id: String,
}

impl IndexTtsClient {
    pub fn new(base_url: &str, voice_dir: &Path, default_voice: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            voice_dir: voice_dir.to_path_buf(),
            default_voice: default_voice.to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Voice reference to send: the request's, or the default voice file.
    fn voice_reference(&self, voice: &str) -> String {
        if voice.is_empty() {
            self.voice_dir
                .join(&self.default_voice)
                .to_string_lossy()
                .into_owned()
        } else {
            voice.to_string()
        }
    }

    async fn upload_voice(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "voice.wav".to_string());
        let form = reqwest::multipart::Form::new().part(
            "files",
            reqwest::multipart::Part::bytes(bytes).file_name(file_name),
        );

        let response = self
            .http
            .post(format!("{}/gradio_api/upload", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| synthesis_error(format!("Voice upload failed: {e}")))?;

        if !response.status().is_success() {
            return Err(synthesis_error(format!(
                "Voice upload returned status {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| synthesis_error(format!("Failed to read upload response: {e}")))?;
        let paths: Vec<String> = serde_json::from_str(&body)
            .map_err(|e| synthesis_error(format!("Failed to parse upload response: {e}")))?;

        paths
            .into_iter()
            .next()
            .ok_or_else(|| synthesis_error("Upload returned no paths".to_string()))
    }

    async fn start_job(&self, payload: &Value) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/gradio_api/call/gen_single", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload.to_string())
            .send()
            .await
            .map_err(|e| synthesis_error(format!("POST failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| synthesis_error(format!("Failed to read POST response: {e}")))?;
        if !status.is_success() {
            return Err(synthesis_error(format!("POST returned {status}: {body}")));
        }

        let EventId { event_id } = serde_json::from_str(&body)
            .map_err(|e| synthesis_error(format!("Failed to parse event id: {e}")))?;
        if event_id.is_empty() {
            return Err(synthesis_error("No event_id returned".to_string()));
        }
        Ok(event_id)
    }

    async fn read_result(&self, event_id: &str) -> Result<String> {
        let response = self
            .http
            .get(format!(
                "{}/gradio_api/call/gen_single/{event_id}",
                self.base_url
            ))
            .send()
            .await
            .map_err(|e| synthesis_error(format!("GET stream failed: {e}")))?;

        if !response.status().is_success() {
            return Err(synthesis_error(format!(
                "Event stream returned status {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| synthesis_error(format!("Failed to read event stream: {e}")))?;
        let data = last_data_line(&body)
            .ok_or_else(|| synthesis_error("No data found in stream response".to_string()))?;
        let file = result_file(data)?;

        Ok(file_url(&self.base_url, &file))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| synthesis_error(format!("Failed to download audio from {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(synthesis_error(format!(
                "Audio download returned status {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| synthesis_error(format!("Failed to read audio body: {e}")))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait::async_trait]
impl Synthesizer for IndexTtsClient {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>> {
        let mut voice = self.voice_reference(&request.voice);
        if tokio::fs::try_exists(&voice).await.unwrap_or(false) {
            debug!(voice = %voice, "uploading local voice reference");
            voice = self.upload_voice(Path::new(&voice)).await?;
        }

        let payload = gen_single_payload(&request.text, &voice, request.emotion);
        let event_id = self.start_job(&payload).await?;
        let url = self.read_result(&event_id).await?;
        let audio = self.download(&url).await?;

        if (request.speed - 1.0).abs() > f32::EPSILON {
            match adjust_speed(&audio, request.speed).await {
                Ok(adjusted) => {
                    info!(speed = request.speed, "applied speed adjustment");
                    return Ok(adjusted);
                }
                Err(e) => {
                    warn!(
                        speed = request.speed,
                        "speed adjustment failed, keeping original audio: {e}"
                    );
                }
            }
        }

        Ok(audio)
    }

    fn name(&self) -> &str {
        "index-tts"
    }
}

fn synthesis_error(message: String) -> BookVoiceError {
    BookVoiceError::Synthesis { message }
}

/// One-hot emotion vector in the server's argument order.
pub fn emotion_vector(emotion: Emotion) -> [f64; 8] {
    let mut vector = [0.0; 8];
    vector[emotion.index()] = 1.0;
    vector
}

/// The 24 positional arguments of `gen_single`.
pub fn gen_single_payload(text: &str, voice: &str, emotion: Emotion) -> Value {
    let file = json!({ "path": voice, "meta": { "_type": "gradio.FileData" } });
    let v = emotion_vector(emotion);
    json!({
        "data": [
            "Same as the voice reference",
            file,
            text,
            file,
            EMOTION_WEIGHT,
            v[0], v[1], v[2], v[3], v[4], v[5], v[6], v[7],
            "",
            false,
            MAX_TEXT_TOKENS,
            true,
            0.8,
            30,
            0.8,
            0,
            3,
            10,
            MAX_MEL_TOKENS,
        ]
    })
}

/// Payload of the last `data: ` line of a Gradio event stream.
pub fn last_data_line(stream: &str) -> Option<&str> {
    stream
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .last()
}

/// Extract the produced file's url or path from a result data line.
///
/// Accepts a bare string, a file object, or an update wrapper around one.
pub fn result_file(data: &str) -> Result<String> {
    let list: Vec<Value> = serde_json::from_str(data)
        .map_err(|e| synthesis_error(format!("Failed to parse result data: {e}")))?;
    let first = list
        .into_iter()
        .next()
        .ok_or_else(|| synthesis_error("Empty result data".to_string()))?;

    let found = match &first {
        Value::String(path) => Some(path.clone()),
        Value::Object(_) => {
            let file = first.get("value").filter(|v| v.is_object()).unwrap_or(&first);
            file.get("url")
                .and_then(Value::as_str)
                .or_else(|| file.get("path").and_then(Value::as_str))
                .map(str::to_string)
        }
        _ => None,
    };

    found
        .filter(|f| !f.is_empty())
        .ok_or_else(|| synthesis_error(format!("Could not find audio path in result: {first}")))
}

/// Absolute download url for a result file.
pub fn file_url(base_url: &str, file: &str) -> String {
    if file.starts_with("http") {
        file.to_string()
    } else {
        format!("{base_url}/file={file}")
    }
}

/// `atempo` filter chain for `speed`; each stage stays within 0.5..=2.0.
pub fn atempo_chain(speed: f32) -> String {
    let mut filters = Vec::new();
    let mut remaining = f64::from(speed);

    while remaining > 0.0 {
        if remaining >= 2.0 {
            filters.push("atempo=2.0".to_string());
            remaining /= 2.0;
        } else if remaining <= 0.5 {
            filters.push("atempo=0.5".to_string());
            remaining /= 0.5;
        } else {
            filters.push(format!("atempo={remaining:.4}"));
            break;
        }
    }

    filters.join(",")
}

/// Time-stretch WAV audio with ffmpeg without changing pitch.
async fn adjust_speed(audio: &[u8], speed: f32) -> Result<Vec<u8>> {
    adjust_speed_in(&std::env::temp_dir(), audio, speed).await
}

/// Like [`adjust_speed`], with ffmpeg's scratch files under `root`.
async fn adjust_speed_in(root: &Path, audio: &[u8], speed: f32) -> Result<Vec<u8>> {
    if speed <= 0.0 {
        return Err(synthesis_error(format!("Invalid speed {speed}")));
    }

    // Removed with its contents when dropped.
    let scratch = tempfile::Builder::new()
        .prefix("bookvoice-speed-")
        .tempdir_in(root)?;
    let input = scratch.path().join("in.wav");
    let output = scratch.path().join("out.wav");

    let result = run_ffmpeg(audio, &input, &output, &atempo_chain(speed)).await;

    if let Err(e) = scratch.close() {
        warn!("failed to remove speed scratch directory: {e}");
    }
    result
}

async fn run_ffmpeg(audio: &[u8], input: &Path, output: &Path, filter: &str) -> Result<Vec<u8>> {
    tokio::fs::write(input, audio).await?;

    let result = tokio::process::Command::new("ffmpeg")
        .arg("-i")
        .arg(input)
        .args(["-af", filter, "-y"])
        .arg(output)
        .output()
        .await
        .map_err(|e| synthesis_error(format!("Failed to run ffmpeg: {e}")))?;

    if !result.status.success() {
        return Err(synthesis_error(format!(
            "ffmpeg failed: {}",
            String::from_utf8_lossy(&result.stderr).trim()
        )));
    }

    Ok(tokio::fs::read(output).await?)
}
