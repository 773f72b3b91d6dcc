//! Edit operations (§4.1): `cut`, `embed-subtitles`, `merge`, `add-logo`.
//! Synchronous, bounded, multipart-in/file-out transformations that bypass
//! the queue entirely and stream their result straight back to the caller
//! (unlike `/download*`, which only ever emits a delegation header).

use axum::extract::{Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{WatermarkChoice, WatermarkPosition, WatermarkSize};
use crate::pipeline::stages::{probe, render};
use crate::pipeline::subtitles;
use crate::utils::time_range::parse_range;
use crate::web::multipart::{bad_request, drain_multipart, find_file, source_extension, MultipartFile};
use crate::web::AppState;

struct ScratchTask {
    id: Uuid,
}

impl ScratchTask {
    async fn new(state: &AppState) -> Result<Self, AppError> {
        let id = Uuid::new_v4();
        state.workspace.create_task_dir(id).await?;
        Ok(Self { id })
    }

    async fn cleanup(&self, state: &AppState) {
        state.workspace.remove_task_dir(self.id).await.ok();
    }
}

async fn stream_file_response(state: &AppState, scratch: &ScratchTask, rel_path: &str, content_type: &str, download_name: &str) -> Result<Response, AppError> {
    let bytes = state.workspace.read(scratch.id, rel_path).await?;
    let mut response = (StatusCode::OK, bytes).into_response();
    response.headers_mut().insert(header::CONTENT_TYPE, content_type.parse().unwrap_or_else(|_| "application/octet-stream".parse().unwrap()));
    response.headers_mut().insert(
        header::CONTENT_DISPOSITION,
        format!("attachment; filename=\"{download_name}\"").parse().map_err(|e: axum::http::header::InvalidHeaderValue| AppError::internal(e.to_string()))?,
    );
    Ok(response)
}

/// `POST /cut`: trims the uploaded video to `start_time..end_time`
/// (hh:mm:ss), re-muxing without re-encoding.
pub async fn cut(State(state): State<AppState>, multipart: Multipart) -> Result<Response, AppError> {
    let (files, fields) = drain_multipart(multipart, state.config.pipeline.max_file_size_bytes).await?;
    let file = find_file(&files, "file")?;
    let start_time = fields.get("start_time").ok_or_else(|| bad_request("missing 'start_time' field"))?;
    let end_time = fields.get("end_time").ok_or_else(|| bad_request("missing 'end_time' field"))?;

    let scratch = ScratchTask::new(&state).await?;
    let result = run_cut(&state, &scratch, file, start_time, end_time).await;
    scratch.cleanup(&state).await;
    result
}

async fn run_cut(state: &AppState, scratch: &ScratchTask, file: &MultipartFile, start_time: &str, end_time: &str) -> Result<Response, AppError> {
    let source_rel = format!("source.{}", source_extension(file));
    state.workspace.write(scratch.id, &source_rel, &file.bytes).await?;
    let source_path = state.workspace.full_path(scratch.id, &source_rel)?;

    let metadata = probe::probe(&state.config.pipeline.media_tool_bin, &source_path, state.config.pipeline.max_subprocess_output_bytes).await?;
    let range = parse_range(start_time, end_time, metadata.duration_s)?;

    let output_rel = "cut.mp4";
    let output_path = state.workspace.full_path(scratch.id, output_rel)?;
    let input_str = source_path.to_string_lossy().into_owned();
    let output_str = output_path.to_string_lossy().into_owned();
    let args = [
        "-y",
        "-i",
        input_str.as_str(),
        "-ss",
        &range.start_s.to_string(),
        "-to",
        &range.end_s.to_string(),
        "-c",
        "copy",
        output_str.as_str(),
    ];
    let output = crate::pipeline::stages::run_tool(&state.config.pipeline.media_tool_bin, &args, state.config.pipeline.max_subprocess_output_bytes).await?;
    if !output.status_success || !output_path.exists() {
        return Err(AppError::Pipeline(crate::errors::PipelineError::FormatError { detail: output.stderr }));
    }

    stream_file_response(state, scratch, output_rel, "video/mp4", "cut.mp4").await
}

/// `POST /embed-subtitles`: burns the uploaded subtitle file into the
/// uploaded video's pixels.
pub async fn embed_subtitles(State(state): State<AppState>, multipart: Multipart) -> Result<Response, AppError> {
    let (files, _fields) = drain_multipart(multipart, state.config.pipeline.max_file_size_bytes).await?;
    let video = find_file(&files, "file")?;
    let subtitles_file = find_file(&files, "subtitles")?;

    let scratch = ScratchTask::new(&state).await?;
    let result = run_embed_subtitles(&state, &scratch, video, subtitles_file).await;
    scratch.cleanup(&state).await;
    result
}

async fn run_embed_subtitles(state: &AppState, scratch: &ScratchTask, video: &MultipartFile, subtitles_file: &MultipartFile) -> Result<Response, AppError> {
    let source_rel = format!("source.{}", source_extension(video));
    state.workspace.write(scratch.id, &source_rel, &video.bytes).await?;
    let source_path = state.workspace.full_path(scratch.id, &source_rel)?;

    // Round-trips through the segment parser so a malformed subtitle file
    // surfaces as a 400 before any subprocess is spawned.
    let srt_text = String::from_utf8(subtitles_file.bytes.clone()).map_err(|_| bad_request("subtitle file is not valid UTF-8"))?;
    subtitles::parse_srt(&srt_text)?;
    state.workspace.write(scratch.id, "subtitles.srt", srt_text.as_bytes()).await?;
    let subtitle_path = state.workspace.full_path(scratch.id, "subtitles.srt")?;

    let output_rel = "embedded.mp4";
    let output_path = state.workspace.full_path(scratch.id, output_rel)?;
    render::burn_in_and_watermark(
        &state.config.pipeline.media_tool_bin,
        &source_path,
        Some(&subtitle_path),
        None,
        &output_path,
        state.config.pipeline.max_subprocess_output_bytes,
    )
    .await?;

    stream_file_response(state, scratch, output_rel, "video/mp4", "embedded.mp4").await
}

/// `POST /merge`: attaches the uploaded subtitle file to the uploaded
/// video as a soft (selectable) subtitle stream rather than burning it
/// into the picture, distinguishing it from `embed-subtitles`.
pub async fn merge(State(state): State<AppState>, multipart: Multipart) -> Result<Response, AppError> {
    let (files, _fields) = drain_multipart(multipart, state.config.pipeline.max_file_size_bytes).await?;
    let video = find_file(&files, "file")?;
    let subtitles_file = find_file(&files, "subtitles")?;

    let scratch = ScratchTask::new(&state).await?;
    let result = run_merge(&state, &scratch, video, subtitles_file).await;
    scratch.cleanup(&state).await;
    result
}

async fn run_merge(state: &AppState, scratch: &ScratchTask, video: &MultipartFile, subtitles_file: &MultipartFile) -> Result<Response, AppError> {
    let source_rel = format!("source.{}", source_extension(video));
    state.workspace.write(scratch.id, &source_rel, &video.bytes).await?;
    let source_path = state.workspace.full_path(scratch.id, &source_rel)?;

    let srt_text = String::from_utf8(subtitles_file.bytes.clone()).map_err(|_| bad_request("subtitle file is not valid UTF-8"))?;
    subtitles::parse_srt(&srt_text)?;
    state.workspace.write(scratch.id, "subtitles.srt", srt_text.as_bytes()).await?;
    let subtitle_path = state.workspace.full_path(scratch.id, "subtitles.srt")?;

    let output_rel = "merged.mp4";
    let output_path = state.workspace.full_path(scratch.id, output_rel)?;
    let input_str = source_path.to_string_lossy().into_owned();
    let subtitle_str = subtitle_path.to_string_lossy().into_owned();
    let output_str = output_path.to_string_lossy().into_owned();
    let args = [
        "-y",
        "-i",
        input_str.as_str(),
        "-i",
        subtitle_str.as_str(),
        "-map",
        "0",
        "-map",
        "1",
        "-c",
        "copy",
        "-c:s",
        "mov_text",
        output_str.as_str(),
    ];
    let output = crate::pipeline::stages::run_tool(&state.config.pipeline.media_tool_bin, &args, state.config.pipeline.max_subprocess_output_bytes).await?;
    if !output.status_success || !output_path.exists() {
        return Err(AppError::Pipeline(crate::errors::PipelineError::FormatError { detail: output.stderr }));
    }

    stream_file_response(state, scratch, output_rel, "video/mp4", "merged.mp4").await
}

/// `POST /add-logo`: burns a watermark from the uploaded logo into the
/// uploaded video, deduplicating the logo the same way the pipeline does.
pub async fn add_logo(State(state): State<AppState>, multipart: Multipart) -> Result<Response, AppError> {
    let (files, fields) = drain_multipart(multipart, state.config.pipeline.max_file_size_bytes).await?;
    let video = find_file(&files, "file")?;
    let logo = find_file(&files, "logo")?;

    let position = fields
        .get("position")
        .map(|s| parse_position(s))
        .transpose()?
        .unwrap_or(WatermarkPosition::BottomRight);
    let size = fields.get("size").map(|s| parse_size(s)).transpose()?.unwrap_or(WatermarkSize::Medium);
    let opacity: u8 = fields.get("opacity").map(|s| s.parse()).transpose().map_err(|_| bad_request("opacity must be 0..100"))?.unwrap_or(80);
    if opacity > 100 {
        return Err(bad_request("opacity must be 0..100"));
    }

    let scratch = ScratchTask::new(&state).await?;
    let result = run_add_logo(&state, &scratch, video, logo, position, size, opacity).await;
    scratch.cleanup(&state).await;
    result
}

fn parse_position(s: &str) -> Result<WatermarkPosition, AppError> {
    match s {
        "top-left" => Ok(WatermarkPosition::TopLeft),
        "top-right" => Ok(WatermarkPosition::TopRight),
        "bottom-left" => Ok(WatermarkPosition::BottomLeft),
        "bottom-right" => Ok(WatermarkPosition::BottomRight),
        "center" => Ok(WatermarkPosition::Center),
        other => Err(bad_request(format!("unknown watermark position '{other}'"))),
    }
}

fn parse_size(s: &str) -> Result<WatermarkSize, AppError> {
    match s {
        "small" => Ok(WatermarkSize::Small),
        "medium" => Ok(WatermarkSize::Medium),
        "large" => Ok(WatermarkSize::Large),
        other => Err(bad_request(format!("unknown watermark size '{other}'"))),
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_add_logo(
    state: &AppState,
    scratch: &ScratchTask,
    video: &MultipartFile,
    logo: &MultipartFile,
    position: WatermarkPosition,
    size: WatermarkSize,
    opacity: u8,
) -> Result<Response, AppError> {
    let source_rel = format!("source.{}", source_extension(video));
    state.workspace.write(scratch.id, &source_rel, &video.bytes).await?;
    let source_path = state.workspace.full_path(scratch.id, &source_rel)?;

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
    let logo_path = state.logo_assets.full_path(&asset)?;

    let watermark = WatermarkChoice { enabled: true, position, size, opacity, logo_ref: Some(asset.path.clone()) };

    let output_rel = "watermarked.mp4";
    let output_path = state.workspace.full_path(scratch.id, output_rel)?;
    render::burn_in_and_watermark(
        &state.config.pipeline.media_tool_bin,
        &source_path,
        None,
        Some((logo_path.as_path(), &watermark)),
        &output_path,
        state.config.pipeline.max_subprocess_output_bytes,
    )
    .await?;

    stream_file_response(state, scratch, output_rel, "video/mp4", "watermarked.mp4").await
}

