//! Intake API (§4.1, §6): `POST /remote`, `POST /upload`, `POST
//! /download-only`. Each creates a Task Record in `Pending` state and
//! enqueues a processing job; none of them run the pipeline inline.

use std::collections::HashMap;

use axum::extract::{Multipart, State};
use axum::Json;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use url::Url;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::task::{InitialRequest, RequestKind};
use crate::models::{Progress, QueueKind, Task, TaskState, TranscribeModel, TranslationService, UserChoices, WatermarkChoice};
use crate::utils::time_range::parse_range;
use crate::web::multipart::{bad_request, drain_multipart, find_file};
use crate::web::responses::Accepted;
use crate::web::AppState;

/// Tasks default to a one-day lifetime if nothing ever lowers it; the
/// Scheduler (C8) sweeps on `expires_at`, not on artifact state, so an
/// abandoned `Pending` task is still reclaimed (§4.8c).
const TASK_RECORD_TTL_HOURS: i64 = 24;

fn validate_lang(code: &str, field: &str) -> Result<(), AppError> {
    if code.is_empty() || code == "auto" || super::metadata::is_known_language(code) {
        Ok(())
    } else {
        Err(bad_request(format!("unknown {field} '{code}'")))
    }
}

fn validate_watermark(watermark: &WatermarkChoice) -> Result<(), AppError> {
    if watermark.opacity > 100 {
        return Err(bad_request("watermark.opacity must be 0..100"));
    }
    if watermark.enabled && watermark.logo_ref.is_none() {
        return Err(bad_request("watermark.enabled requires a logo_ref or uploaded logo file"));
    }
    Ok(())
}

fn validate_time_fields(start: &Option<String>, end: &Option<String>) -> Result<(), AppError> {
    match (start, end) {
        (Some(s), Some(e)) => parse_range(s, e, None).map(|_| ()),
        (None, None) => Ok(()),
        _ => Err(bad_request("start_time and end_time must be provided together")),
    }
}

/// Rejects remote URLs outside the configured allow-list (§4.1). An empty
/// allow-list means any `http`/`https` URL is accepted.
fn validate_remote_url(url: &str, allowed_hosts: &[String]) -> Result<(), AppError> {
    let parsed = Url::parse(url).map_err(|e| bad_request(format!("invalid url: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(bad_request("url must be http or https"));
    }
    let host = parsed.host_str().ok_or_else(|| bad_request("url has no host"))?;
    if allowed_hosts.is_empty() {
        return Ok(());
    }
    if allowed_hosts.iter().any(|h| h == host || host.ends_with(&format!(".{h}"))) {
        Ok(())
    } else {
        Err(bad_request(format!("host '{host}' is not in the allowed remote hosts list")))
    }
}

fn new_task(initial_request: InitialRequest, user_choices: UserChoices) -> Task {
    let now = Utc::now();
    Task {
        task_id: Uuid::new_v4(),
        state: TaskState::Pending,
        initial_request,
        user_choices,
        source_metadata: None,
        progress: Progress::default(),
        result: None,
        error: None,
        created_at: now,
        updated_at: now,
        expires_at: now + Duration::hours(TASK_RECORD_TTL_HOURS),
        artifact_expires_at: None,
    }
}

/// §5 backpressure: "If queue depth exceeds a threshold, new submissions
/// return `503` with `Retry-After`." Checked against the `processing` queue
/// only; `/download-only` shares the same queue and is therefore subject to
/// the same ceiling, just a looser per-IP rate limit on top of it.
async fn check_queue_capacity(state: &AppState) -> Result<(), AppError> {
    let depth = state.queue_repo.depth(QueueKind::Processing).await?;
    let ceiling = state.config.pipeline.queue_depth_ceiling as i64;
    if depth >= ceiling {
        return Err(AppError::Pipeline(crate::errors::PipelineError::QueueSaturated { retry_after_s: 30 }));
    }
    Ok(())
}

async fn submit(state: &AppState, task: Task) -> Result<Accepted, AppError> {
    check_queue_capacity(state).await?;
    state.task_repo.insert(&task).await?;
    state
        .queue_repo
        .enqueue(QueueKind::Processing, task.task_id, json!({}))
        .await?;
    Ok(Accepted((&task).into()))
}

#[derive(Debug, Deserialize)]
pub struct RemoteSubmitRequest {
    url: String,
    #[serde(default)]
    source_lang: String,
    #[serde(default)]
    target_lang: String,
    transcribe_model: TranscribeModel,
    translation_service: TranslationService,
    #[serde(default)]
    burn_in: bool,
    #[serde(default)]
    watermark: WatermarkChoice,
    start_time: Option<String>,
    end_time: Option<String>,
}

/// `POST /remote`: submits a remote URL for download + processing.
pub async fn remote(
    State(state): State<AppState>,
    Json(req): Json<RemoteSubmitRequest>,
) -> Result<Accepted, AppError> {
    if !state.config.pipeline.enable_remote_download {
        return Err(bad_request("remote downloads are disabled on this deployment"));
    }
    validate_remote_url(&req.url, &state.config.pipeline.allowed_remote_hosts)?;
    validate_lang(&req.source_lang, "source_lang")?;
    validate_lang(&req.target_lang, "target_lang")?;
    validate_watermark(&req.watermark)?;
    validate_time_fields(&req.start_time, &req.end_time)?;

    let initial_request = InitialRequest {
        kind: RequestKind::RemoteUrl,
        url: Some(req.url),
        filename: None,
        start_time: req.start_time,
        end_time: req.end_time,
    };
    let user_choices = UserChoices {
        source_lang: req.source_lang,
        target_lang: req.target_lang,
        transcribe_model: req.transcribe_model,
        translation_service: req.translation_service,
        burn_in: req.burn_in,
        watermark: req.watermark,
    };

    submit(&state, new_task(initial_request, user_choices)).await
}

/// `POST /download-only`: same shape as `/remote` but skips transcription,
/// translation, and rendering entirely; the engine recognizes this through
/// `initial_request.kind` and only runs S1/S2/S9 (§4.1, §4.6).
pub async fn download_only(
    State(state): State<AppState>,
    Json(req): Json<RemoteSubmitRequest>,
) -> Result<Accepted, AppError> {
    if !state.config.pipeline.enable_remote_download {
        return Err(bad_request("remote downloads are disabled on this deployment"));
    }
    validate_remote_url(&req.url, &state.config.pipeline.allowed_remote_hosts)?;
    validate_time_fields(&req.start_time, &req.end_time)?;

    let initial_request = InitialRequest {
        kind: RequestKind::DownloadOnly,
        url: Some(req.url),
        filename: None,
        start_time: req.start_time,
        end_time: req.end_time,
    };
    let user_choices = UserChoices {
        source_lang: String::new(),
        target_lang: String::new(),
        transcribe_model: req.transcribe_model,
        translation_service: req.translation_service,
        burn_in: false,
        watermark: WatermarkChoice { enabled: false, ..WatermarkChoice::default() },
    };

    submit(&state, new_task(initial_request, user_choices)).await
}

fn field_bool(fields: &HashMap<String, String>, name: &str, default: bool) -> bool {
    fields.get(name).map(|v| v == "true" || v == "1").unwrap_or(default)
}

fn field_model(fields: &HashMap<String, String>) -> Result<TranscribeModel, AppError> {
    match fields.get("transcribe_model").map(String::as_str) {
        None | Some("") => Ok(TranscribeModel::Base),
        Some("tiny") => Ok(TranscribeModel::Tiny),
        Some("base") => Ok(TranscribeModel::Base),
        Some("small") => Ok(TranscribeModel::Small),
        Some("medium") => Ok(TranscribeModel::Medium),
        Some("large") => Ok(TranscribeModel::Large),
        Some("remote-api") => Ok(TranscribeModel::RemoteApi),
        Some(other) => Err(bad_request(format!("unknown transcribe_model '{other}'"))),
    }
}

fn field_translation_service(fields: &HashMap<String, String>) -> Result<TranslationService, AppError> {
    match fields.get("translation_service").map(String::as_str) {
        None | Some("") | Some("free") => Ok(TranslationService::Free),
        Some("paid") => Ok(TranslationService::Paid),
        Some(other) => Err(bad_request(format!("unknown translation_service '{other}'"))),
    }
}

fn field_watermark_position(value: &str) -> Result<crate::models::WatermarkPosition, AppError> {
    use crate::models::WatermarkPosition::*;
    match value {
        "top-left" => Ok(TopLeft),
        "top-right" => Ok(TopRight),
        "bottom-left" => Ok(BottomLeft),
        "bottom-right" => Ok(BottomRight),
        "center" => Ok(Center),
        other => Err(bad_request(format!("unknown watermark position '{other}'"))),
    }
}

fn field_watermark_size(value: &str) -> Result<crate::models::WatermarkSize, AppError> {
    use crate::models::WatermarkSize::*;
    match value {
        "small" => Ok(Small),
        "medium" => Ok(Medium),
        "large" => Ok(Large),
        other => Err(bad_request(format!("unknown watermark size '{other}'"))),
    }
}

/// `POST /upload`: accepts a video file (and optionally a watermark logo)
/// directly, probing it synchronously so malformed media is rejected before
/// a Task Record is even created (§4.3 "for uploads the probe runs
/// synchronously").
pub async fn upload(State(state): State<AppState>, multipart: Multipart) -> Result<Accepted, AppError> {
    let (files, fields) = drain_multipart(multipart, state.config.web.max_upload_bytes).await?;
    let file = find_file(&files, "file")?;

    let original_filename = file.filename.clone().unwrap_or_else(|| "upload".to_string());
    let ext = std::path::Path::new(&original_filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    if !state.config.pipeline.allowed_upload_extensions.iter().any(|allowed| allowed == &ext) {
        return Err(bad_request(format!("extension '{ext}' is not accepted, allowed: {:?}", state.config.pipeline.allowed_upload_extensions)));
    }
    if file.bytes.len() as u64 > state.config.pipeline.max_file_size_bytes {
        return Err(AppError::Pipeline(crate::errors::PipelineError::PayloadTooLarge {
            size: file.bytes.len() as u64,
            max_size: state.config.pipeline.max_file_size_bytes,
        }));
    }

    let source_lang = fields.get("source_lang").cloned().unwrap_or_default();
    let target_lang = fields.get("target_lang").cloned().unwrap_or_default();
    validate_lang(&source_lang, "source_lang")?;
    validate_lang(&target_lang, "target_lang")?;

    let start_time = fields.get("start_time").cloned();
    let end_time = fields.get("end_time").cloned();
    validate_time_fields(&start_time, &end_time)?;

    let defaults = WatermarkChoice::default();
    let mut watermark = WatermarkChoice {
        enabled: field_bool(&fields, "watermark_enabled", false),
        position: fields
            .get("watermark_position")
            .map(|v| field_watermark_position(v))
            .transpose()?
            .unwrap_or(defaults.position),
        size: fields
            .get("watermark_size")
            .map(|v| field_watermark_size(v))
            .transpose()?
            .unwrap_or(defaults.size),
        opacity: fields
            .get("watermark_opacity")
            .map(|v| v.parse())
            .transpose()
            .map_err(|_| bad_request("watermark_opacity must be 0..100"))?
            .unwrap_or(80),
        logo_ref: None,
    };

    if let Ok(logo) = find_file(&files, "logo") {
        let logo_ext = logo
            .filename
            .as_deref()
            .and_then(|n| std::path::Path::new(n).extension())
            .and_then(|e| e.to_str())
            .unwrap_or("png");
        let (asset, _is_new) = state
            .logo_assets
            .save_logo(&logo.bytes, logo_ext, logo.content_type.as_deref().unwrap_or("image/png"))
            .await?;
        watermark.logo_ref = Some(asset.path);
        watermark.enabled = true;
    }
    validate_watermark(&watermark)?;

    let task_id = Uuid::new_v4();
    let rel_path = state.intake.store_upload(task_id, &original_filename, &file.bytes).await?;
    let intake_path = state.intake.full_path(&rel_path)?;

    // Synchronous probe (§4.3): a malformed or unsupported upload is
    // rejected here, before any Task Record is ever written.
    let probe_result = crate::pipeline::stages::probe::probe(
        &state.config.pipeline.media_tool_bin,
        &intake_path,
        state.config.pipeline.max_subprocess_output_bytes,
    )
    .await;
    let source_metadata = match probe_result {
        Ok(metadata) => metadata,
        Err(e) => {
            state.intake.remove(&rel_path).await.ok();
            return Err(e);
        }
    };

    let initial_request = InitialRequest {
        kind: RequestKind::Upload,
        url: None,
        filename: Some(rel_path),
        start_time,
        end_time,
    };
    let user_choices = UserChoices {
        source_lang,
        target_lang,
        transcribe_model: field_model(&fields)?,
        translation_service: field_translation_service(&fields)?,
        burn_in: field_bool(&fields, "burn_in", false),
        watermark,
    };

    let mut task = new_task(initial_request, user_choices);
    task.task_id = task_id;
    task.source_metadata = Some(source_metadata);
    submit(&state, task).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_lang_accepts_empty_and_auto() {
        assert!(validate_lang("", "source_lang").is_ok());
        assert!(validate_lang("auto", "source_lang").is_ok());
    }

    #[test]
    fn validate_lang_accepts_known_codes() {
        assert!(validate_lang("en", "source_lang").is_ok());
        assert!(validate_lang("ja", "target_lang").is_ok());
    }

    #[test]
    fn validate_lang_rejects_unknown_code() {
        assert!(validate_lang("xx-not-a-lang", "source_lang").is_err());
    }

    #[test]
    fn validate_watermark_rejects_opacity_over_100() {
        let watermark = WatermarkChoice { opacity: 101, ..WatermarkChoice::default() };
        assert!(validate_watermark(&watermark).is_err());
    }

    #[test]
    fn validate_watermark_rejects_enabled_without_logo() {
        let watermark = WatermarkChoice { enabled: true, logo_ref: None, ..WatermarkChoice::default() };
        assert!(validate_watermark(&watermark).is_err());
    }

    #[test]
    fn validate_watermark_accepts_enabled_with_logo() {
        let watermark = WatermarkChoice { enabled: true, logo_ref: Some("logos/a.png".into()), ..WatermarkChoice::default() };
        assert!(validate_watermark(&watermark).is_ok());
    }

    #[test]
    fn validate_time_fields_requires_both_or_neither() {
        assert!(validate_time_fields(&None, &None).is_ok());
        assert!(validate_time_fields(&Some("00:00:01".into()), &None).is_err());
        assert!(validate_time_fields(&None, &Some("00:00:05".into())).is_err());
    }

    #[test]
    fn validate_time_fields_checks_range_ordering() {
        assert!(validate_time_fields(&Some("00:00:05".into()), &Some("00:00:01".into())).is_err());
        assert!(validate_time_fields(&Some("00:00:01".into()), &Some("00:00:05".into())).is_ok());
    }

    #[test]
    fn validate_remote_url_rejects_non_http_scheme() {
        assert!(validate_remote_url("ftp://example.com/f.mp4", &[]).is_err());
    }

    #[test]
    fn validate_remote_url_unrestricted_when_allow_list_empty() {
        assert!(validate_remote_url("https://anything.example/video.mp4", &[]).is_ok());
    }

    #[test]
    fn validate_remote_url_enforces_allow_list() {
        let allowed = vec!["example.com".to_string()];
        assert!(validate_remote_url("https://example.com/video.mp4", &allowed).is_ok());
        assert!(validate_remote_url("https://cdn.example.com/video.mp4", &allowed).is_ok());
        assert!(validate_remote_url("https://evil.test/video.mp4", &allowed).is_err());
    }

    #[test]
    fn field_bool_parses_true_and_one() {
        let mut fields = HashMap::new();
        fields.insert("watermark_enabled".to_string(), "true".to_string());
        assert!(field_bool(&fields, "watermark_enabled", false));

        fields.insert("watermark_enabled".to_string(), "1".to_string());
        assert!(field_bool(&fields, "watermark_enabled", false));

        fields.insert("watermark_enabled".to_string(), "false".to_string());
        assert!(!field_bool(&fields, "watermark_enabled", true));
    }

    #[test]
    fn field_model_defaults_to_base() {
        let fields = HashMap::new();
        assert!(matches!(field_model(&fields).unwrap(), TranscribeModel::Base));
    }

    #[test]
    fn field_model_rejects_unknown_value() {
        let mut fields = HashMap::new();
        fields.insert("transcribe_model".to_string(), "huge".to_string());
        assert!(field_model(&fields).is_err());
    }

    #[test]
    fn field_translation_service_defaults_to_free() {
        let fields = HashMap::new();
        assert!(matches!(field_translation_service(&fields).unwrap(), TranslationService::Free));
    }
}
