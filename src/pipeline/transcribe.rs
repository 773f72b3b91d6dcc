//! Transcription back-ends (§4.6.2): polymorphism over a capability
//! interface instead of the original's dynamic class dispatch. Each variant
//! is a thin adapter over an external collaborator (a local CLI or a remote
//! API); the actual speech-to-text model runtime is out of scope (§1).

use std::collections::HashSet;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, Mutex};

use crate::config::PipelineConfig;
use crate::errors::{AppError, PipelineError};
use crate::models::TranscribeModel;
use crate::pipeline::subtitles::Segment;

pub struct TranscribeOutcome {
    pub detected_lang: String,
    pub model_used: TranscribeModel,
}

/// `transcribe(audio_path, hinted_lang?) -> iterator<Segment> + detected_lang`
/// (§4.6.2). Segments are pushed onto `tx` as they are produced so S5/S6 can
/// start consuming before S4 finishes (§4.6.1).
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        audio_path: &Path,
        hinted_lang: Option<&str>,
        tx: mpsc::Sender<Segment>,
    ) -> Result<TranscribeOutcome, AppError>;
}

/// Process-wide cache of which local model sizes are considered "loaded".
/// Real weight residency lives inside the external CLI process; this cache
/// only remembers the engine's own warm-up/eviction decisions so the
/// downgrade path (§4.6.2) and an explicit warm-up endpoint can reason about
/// it without re-probing the subprocess.
#[derive(Clone, Default)]
pub struct ModelCache {
    resident: Arc<Mutex<HashSet<TranscribeModel>>>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn warm_up(&self, model: TranscribeModel) {
        let mut guard = self.resident.lock().await;
        if guard.insert(model) {
            tracing::info!(?model, "transcription model warmed up");
        }
    }

    pub async fn evict(&self, model: TranscribeModel) {
        let mut guard = self.resident.lock().await;
        if guard.remove(&model) {
            tracing::info!(?model, "transcription model evicted");
        }
    }

    pub async fn is_resident(&self, model: TranscribeModel) -> bool {
        self.resident.lock().await.contains(&model)
    }
}

#[derive(Deserialize)]
struct RawSegment {
    start: f64,
    end: f64,
    text: String,
    #[serde(default)]
    lang: Option<String>,
}

/// `LocalModel{size}`: shells out to the configured local speech-to-text
/// CLI, streaming its newline-delimited JSON segment output.
pub struct LocalModelTranscriber {
    pub size: TranscribeModel,
    pub bin: String,
    pub model_cache: ModelCache,
    pub max_output_bytes: usize,
}

#[async_trait]
impl Transcriber for LocalModelTranscriber {
    async fn transcribe(
        &self,
        audio_path: &Path,
        hinted_lang: Option<&str>,
        tx: mpsc::Sender<Segment>,
    ) -> Result<TranscribeOutcome, AppError> {
        self.model_cache.warm_up(self.size).await;

        let mut cmd = Command::new(&self.bin);
        cmd.arg("--model")
            .arg(model_size_tag(self.size))
            .arg("--language")
            .arg(hinted_lang.unwrap_or("auto"))
            .arg("--output-format")
            .arg("jsonl")
            .arg(audio_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = cmd.spawn().map_err(|e| transcription_error(e.to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| transcription_error("no stdout from transcription tool".into()))?;

        let mut reader = BufReader::new(stdout).lines();
        let mut detected_lang: Option<String> = None;
        let mut index = 0usize;
        let mut bytes_read = 0usize;

        while let Some(line) = reader
            .next_line()
            .await
            .map_err(|e| transcription_error(e.to_string()))?
        {
            bytes_read += line.len();
            if bytes_read > self.max_output_bytes {
                break;
            }
            let Ok(raw) = serde_json::from_str::<RawSegment>(&line) else {
                continue;
            };
            if detected_lang.is_none() {
                detected_lang = raw.lang.clone();
            }
            index += 1;
            let segment = Segment {
                index,
                start: raw.start,
                end: raw.end,
                text: raw.text,
            };
            if tx.send(segment).await.is_err() {
                break; // consumer gone; stop producing
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| transcription_error(e.to_string()))?;
        if !status.success() && index == 0 {
            return Err(transcription_error(format!(
                "transcription tool exited with {status}"
            )));
        }

        Ok(TranscribeOutcome {
            detected_lang: detected_lang
                .or_else(|| hinted_lang.map(str::to_string))
                .unwrap_or_else(|| "en".to_string()),
            model_used: self.size,
        })
    }
}

fn model_size_tag(model: TranscribeModel) -> &'static str {
    match model {
        TranscribeModel::Tiny => "tiny",
        TranscribeModel::Base => "base",
        TranscribeModel::Small => "small",
        TranscribeModel::Medium => "medium",
        TranscribeModel::Large => "large",
        TranscribeModel::RemoteApi => "remote",
    }
}

/// `RemoteApi{provider}`: posts the extracted audio to a remote
/// transcription provider and parses its JSON response. The provider is a
/// single batch call rather than a stream, so all segments arrive at once
/// and are forwarded to `tx` in order immediately.
pub struct RemoteApiTranscriber {
    pub provider: String,
    pub endpoint: String,
    pub client: reqwest::Client,
}

#[derive(Deserialize)]
struct RemoteTranscribeResponse {
    detected_lang: String,
    segments: Vec<RawSegment>,
}

#[async_trait]
impl Transcriber for RemoteApiTranscriber {
    async fn transcribe(
        &self,
        audio_path: &Path,
        hinted_lang: Option<&str>,
        tx: mpsc::Sender<Segment>,
    ) -> Result<TranscribeOutcome, AppError> {
        let bytes = tokio::fs::read(audio_path)
            .await
            .map_err(|e| transcription_error(e.to_string()))?;

        let part = reqwest::multipart::Part::bytes(bytes).file_name("audio.wav");
        let mut form = reqwest::multipart::Form::new().part("audio", part);
        if let Some(lang) = hinted_lang {
            form = form.text("hinted_lang", lang.to_string());
        }

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| transcription_error(format!("{}: {e}", self.provider)))?
            .error_for_status()
            .map_err(|e| transcription_error(format!("{}: {e}", self.provider)))?
            .json::<RemoteTranscribeResponse>()
            .await
            .map_err(|e| transcription_error(format!("{}: malformed response: {e}", self.provider)))?;

        for (i, raw) in response.segments.into_iter().enumerate() {
            let segment = Segment {
                index: i + 1,
                start: raw.start,
                end: raw.end,
                text: raw.text,
            };
            if tx.send(segment).await.is_err() {
                break;
            }
        }

        Ok(TranscribeOutcome {
            detected_lang: response.detected_lang,
            model_used: TranscribeModel::RemoteApi,
        })
    }
}

fn transcription_error(detail: String) -> AppError {
    AppError::Pipeline(PipelineError::TranscriptionError { detail })
}

/// Constructs the transcriber for a user-chosen model tag (§4.6.2 registry).
pub fn build_transcriber(
    model: TranscribeModel,
    config: &PipelineConfig,
    model_cache: ModelCache,
) -> Result<Box<dyn Transcriber>, AppError> {
    match model {
        TranscribeModel::RemoteApi => {
            let endpoint = config.remote_transcribe_endpoint.clone().ok_or_else(|| {
                transcription_error("no remote transcription endpoint configured".to_string())
            })?;
            Ok(Box::new(RemoteApiTranscriber {
                provider: "remote-api".to_string(),
                endpoint,
                client: reqwest::Client::new(),
            }))
        }
        size => Ok(Box::new(LocalModelTranscriber {
            size,
            bin: config.transcribe_tool_bin.clone(),
            model_cache,
            max_output_bytes: config.max_subprocess_output_bytes,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn model_cache_tracks_warm_up_and_eviction() {
        let cache = ModelCache::new();
        assert!(!cache.is_resident(TranscribeModel::Large).await);
        cache.warm_up(TranscribeModel::Large).await;
        assert!(cache.is_resident(TranscribeModel::Large).await);
        cache.evict(TranscribeModel::Large).await;
        assert!(!cache.is_resident(TranscribeModel::Large).await);
    }

    #[test]
    fn downgrade_chain_terminates_at_tiny() {
        let mut model = TranscribeModel::Large;
        let mut steps = 0;
        while let Some(next) = model.downgrade() {
            model = next;
            steps += 1;
            assert!(steps <= 3);
        }
        assert_eq!(model, TranscribeModel::Tiny);
    }
}
