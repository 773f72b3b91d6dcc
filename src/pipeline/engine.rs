//! Pipeline Engine (C6, §4.6): the staged state machine a worker drives a
//! single task through, S1 Acquire source ... S9 Publish + cleanup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use chrono::Utc;
use serde_json::json;
use tokio::sync::{mpsc, Semaphore};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::database::tasks::TaskRepository;
use crate::errors::{AppError, PipelineError};
use crate::logo_assets::LogoAssetService;
use crate::models::task::{ErrorCode, InitialRequest, RequestKind, ResultFiles, TaskError, TaskResult, UserChoices};
use crate::models::{ArtifactKind, Task, TaskState};
use crate::pipeline::progress::{renormalized_steps, ProgressReporter};
use crate::pipeline::stages::{acquire, extract_audio, probe, publish, render, verify};
use crate::pipeline::subtitles::{emit_srt, is_rtl, Segment};
use crate::pipeline::transcribe::{build_transcriber, ModelCache, TranscribeOutcome};
use crate::pipeline::translate::{build_translator, fallback_service, translate_with_retry, Translator};
use crate::storage::{ArtifactStore, IntakeStore, WorkspaceStore};
use crate::utils::time_range::{parse_range, TimeRange};

/// Collaborators a worker needs to drive one task to completion.
#[derive(Clone)]
pub struct PipelineDeps {
    pub config: PipelineConfig,
    pub stats_dir: PathBuf,
    pub task_repo: TaskRepository,
    pub workspace: WorkspaceStore,
    pub artifacts: ArtifactStore,
    pub intake: IntakeStore,
    pub logo_assets: LogoAssetService,
    pub model_cache: ModelCache,
}

/// Runs `task_id` to a terminal state, honoring the hard time limit (§4.6.8,
/// §5 "the supervisor ... write a terminal Failure record ... on behalf of
/// the dead worker"). Always returns `Ok` once the task is terminal; the
/// caller acks the queue entry regardless, since the Task Record is the
/// source of truth, not the queue.
pub async fn run_task(deps: &PipelineDeps, task_id: Uuid) -> Result<(), AppError> {
    let Some(task) = deps.task_repo.get(task_id).await? else {
        return Ok(());
    };
    if task.state.is_terminal() {
        return Ok(());
    }

    let soft_timeout = StdDuration::from_secs(deps.config.soft_timeout_s);
    let watchdog = tokio::spawn(async move {
        tokio::time::sleep(soft_timeout).await;
        tracing::warn!(%task_id, "soft time limit exceeded, task still running");
    });

    let hard_timeout = StdDuration::from_secs(deps.config.hard_timeout_s);
    let outcome = match tokio::time::timeout(hard_timeout, drive(deps, task)).await {
        Ok(result) => result,
        Err(_) => {
            deps.workspace.remove_task_dir(task_id).await.ok();
            if let Some(mut task) = deps.task_repo.get(task_id).await? {
                if !task.state.is_terminal() {
                    task.state = TaskState::Failure;
                    task.error = Some(TaskError {
                        code: ErrorCode::TimeoutExceeded,
                        message: "hard time limit exceeded".to_string(),
                        user_message: "Processing took too long and was stopped.".to_string(),
                        recoverable: false,
                    });
                    task.updated_at = Utc::now();
                    deps.task_repo.save(&task).await?;
                }
            }
            Ok(())
        }
    };
    watchdog.abort();
    outcome
}

fn active_stage_names(download_only: bool, skip_translate: bool, skip_render: bool) -> Vec<&'static str> {
    if download_only {
        return vec!["acquire", "probe", "publish"];
    }
    let mut stages = vec!["acquire", "probe", "extract_audio", "transcribe"];
    if !skip_translate {
        stages.push("translate");
    }
    stages.push("emit_subtitles");
    if !skip_render {
        stages.push("render");
        stages.push("verify");
    }
    stages.push("publish");
    stages
}

async fn drive(deps: &PipelineDeps, task: Task) -> Result<(), AppError> {
    let task_id = task.task_id;
    let initial_request = task.initial_request.clone();
    let user_choices = task.user_choices.clone();
    let skip_translate = user_choices.target_lang.trim().is_empty();
    let skip_render = !user_choices.burn_in && !user_choices.watermark.enabled;
    let download_only = initial_request.kind == RequestKind::DownloadOnly;

    let mut task = task;
    if task.progress.steps.is_empty() {
        task.progress.steps = renormalized_steps(&active_stage_names(download_only, skip_translate, skip_render));
    }
    let mut reporter = ProgressReporter::new(deps.task_repo.clone(), task);

    deps.workspace.create_task_dir(task_id).await?;

    let outcome = run_stages(
        deps,
        &mut reporter,
        &initial_request,
        &user_choices,
        download_only,
        skip_translate,
        skip_render,
    )
    .await;

    match outcome {
        Ok(result) => {
            reporter.task_complete(result).await?;
        }
        Err(err) => {
            let code = match &err {
                AppError::Pipeline(pe) => pe.code(),
                _ => ErrorCode::Infrastructure,
            };
            let recoverable = match &err {
                AppError::Pipeline(pe) => pe.recoverable(),
                _ => true,
            };
            reporter
                .task_fail(code, err.to_string(), user_facing_message(code), recoverable)
                .await?;
        }
    }

    deps.workspace.remove_task_dir(task_id).await.ok();
    Ok(())
}

/// The client-safe counterpart of a [`PipelineError`]'s detail string,
/// reused by the web layer so a synchronous validation failure and an
/// async worker failure describe the same code the same way.
pub fn user_facing_message(code: ErrorCode) -> String {
    match code {
        ErrorCode::BadRequest => "The request was invalid.",
        ErrorCode::UnsupportedMedia => "This file type isn't supported.",
        ErrorCode::ProbeFailed => "The media file couldn't be read.",
        ErrorCode::PayloadTooLarge => "The file is too large.",
        ErrorCode::RateLimited => "Too many requests, please try again shortly.",
        ErrorCode::DownloadFailed => "The source couldn't be downloaded.",
        ErrorCode::AudioExtractionError => "Audio couldn't be extracted from this file.",
        ErrorCode::TranscriptionError => "Transcription failed.",
        ErrorCode::TranslationError => "Translation failed.",
        ErrorCode::SubtitleEmitError => "Subtitle generation failed.",
        ErrorCode::RenderError => "Video rendering failed; subtitles are still available.",
        ErrorCode::FormatError => "The output video couldn't be finalized.",
        ErrorCode::TimeoutExceeded => "Processing took too long and was stopped.",
        ErrorCode::Infrastructure => "An internal error occurred.",
    }
    .to_string()
}

fn source_extension(initial_request: &InitialRequest) -> String {
    initial_request
        .filename
        .as_deref()
        .or(initial_request.url.as_deref())
        .and_then(|name| std::path::Path::new(name).extension())
        .and_then(|e| e.to_str())
        .unwrap_or("mp4")
        .to_lowercase()
}

#[allow(clippy::too_many_arguments)]
async fn run_stages(
    deps: &PipelineDeps,
    reporter: &mut ProgressReporter,
    initial_request: &InitialRequest,
    user_choices: &UserChoices,
    download_only: bool,
    skip_translate: bool,
    skip_render: bool,
) -> Result<TaskResult, AppError> {
    let task_id = reporter.task_id();
    let config = &deps.config;
    let mut stage_durations: Vec<(&'static str, StdDuration)> = Vec::new();

    // S1 Acquire source.
    let t0 = Instant::now();
    reporter.step_start("acquire").await?;
    let source_rel = format!("source.{}", source_extension(initial_request));
    let source_path = deps.workspace.full_path(task_id, &source_rel)?;

    match initial_request.kind {
        RequestKind::Upload => {
            let intake_rel = initial_request
                .filename
                .clone()
                .ok_or_else(|| bad_request("upload task missing stored filename"))?;
            acquire::move_upload(&deps.intake, &deps.workspace, task_id, &intake_rel, &source_rel).await?;
        }
        RequestKind::RemoteUrl | RequestKind::DownloadOnly => {
            let url = initial_request
                .url
                .clone()
                .ok_or_else(|| bad_request("remote task missing url"))?;
            let range_hint = match (&initial_request.start_time, &initial_request.end_time) {
                (Some(s), Some(e)) => Some(parse_range(s, e, None)?),
                _ => None,
            };
            download_with_retry(
                &config.download_tool_bin,
                &url,
                &source_path,
                range_hint,
                config.max_subprocess_output_bytes,
            )
            .await?;
        }
    }
    reporter.step_complete("acquire").await?;
    stage_durations.push(("acquire", t0.elapsed()));

    // S2 Probe.
    let t0 = Instant::now();
    reporter.step_start("probe").await?;
    let metadata = probe::probe(&config.media_tool_bin, &source_path, config.max_subprocess_output_bytes).await?;
    let range = match (&initial_request.start_time, &initial_request.end_time) {
        (Some(s), Some(e)) => Some(parse_range(s, e, metadata.duration_s)?),
        _ => None,
    };
    reporter.set_source_metadata(metadata.clone()).await?;
    reporter.step_complete("probe").await?;
    stage_durations.push(("probe", t0.elapsed()));

    if download_only {
        let artifact = deps
            .artifacts
            .publish(
                &deps.workspace,
                task_id,
                &source_rel,
                ArtifactKind::DownloadedSource,
                metadata.mime.as_deref().unwrap_or("application/octet-stream"),
            )
            .await?;
        reporter.step_start("publish").await?;
        let timing = publish::timing_summary(&stage_durations);
        publish::append_stats_event(&deps.stats_dir, task_id, "success", &json!(user_choices), &timing, Utc::now())
            .await
            .ok();
        reporter.step_complete("publish").await?;
        return Ok(TaskResult {
            files: ResultFiles {
                original_subs: None,
                translated_subs: None,
                subtitled_video: Some(artifact.path),
            },
            timing_summary: timing,
            chained_task_id: None,
        });
    }

    // S3 Extract audio.
    let t0 = Instant::now();
    reporter.step_start("extract_audio").await?;
    let audio_rel = "audio.wav";
    let audio_path = deps.workspace.full_path(task_id, audio_rel)?;
    extract_audio::extract(
        &config.media_tool_bin,
        &source_path,
        &audio_path,
        range,
        config.max_subprocess_output_bytes,
    )
    .await?;
    reporter.step_complete("extract_audio").await?;
    stage_durations.push(("extract_audio", t0.elapsed()));

    // S4 Transcribe (+ streaming S5 Translate overlap).
    let t0 = Instant::now();
    reporter.step_start("transcribe").await?;
    let hinted_lang = (user_choices.source_lang != "auto").then(|| user_choices.source_lang.clone());
    // When the source language is already known (not "auto") and matches the
    // requested target, S5 can be recognized as an identity translation
    // before it ever runs, sparing the backend call entirely.
    let hinted_identity = hinted_lang.as_deref() == Some(user_choices.target_lang.as_str());
    let run_translate = !skip_translate && !hinted_identity;
    let mut model = user_choices.transcribe_model;
    let (outcome, original_segments, translated_segments, translation_service_used) = loop {
        match transcribe_and_translate(deps, reporter, &audio_path, hinted_lang.as_deref(), user_choices, model, !run_translate)
            .await
        {
            Ok(result) => break result,
            Err(err) if config.allow_model_downgrade => match model.downgrade() {
                Some(smaller) => {
                    tracing::warn!(?model, ?smaller, error = %err, "transcription failed, downgrading model");
                    reporter.step_progress("transcribe", None, Some(format!("retrying with {smaller:?}"))).await?;
                    model = smaller;
                }
                None => return Err(err),
            },
            Err(err) => return Err(err),
        }
    };
    reporter.step_complete("transcribe").await?;
    stage_durations.push(("transcribe", t0.elapsed()));
    // Detection can resolve an "auto" source to the requested target only
    // after S4 finishes; either way a translation identical to the source
    // yields no translated artifact (§4.6 "Skipped iff target_lang empty or
    // equals detected source").
    let identity_detected = outcome.detected_lang == user_choices.target_lang;
    let translate_ran = run_translate && !identity_detected;
    if !skip_translate {
        reporter.step_complete("translate").await?;
        stage_durations.push(("translate", StdDuration::from_secs(0)));
    }

    // S6 Emit subtitles.
    let t0 = Instant::now();
    reporter.step_start("emit_subtitles").await?;
    let rtl = is_rtl(&user_choices.target_lang);
    let original_srt = emit_srt(&original_segments, is_rtl(&outcome.detected_lang));
    deps.workspace.write(task_id, "original.srt", original_srt.as_bytes()).await?;
    let mut translated_rel: Option<String> = None;
    if translate_ran {
        let translated_srt = emit_srt(&translated_segments, rtl);
        deps.workspace.write(task_id, "translated.srt", translated_srt.as_bytes()).await?;
        translated_rel = Some("translated.srt".to_string());
    }
    reporter.step_complete("emit_subtitles").await?;
    stage_durations.push(("emit_subtitles", t0.elapsed()));

    // Subtitle artifacts are published immediately: a later render failure
    // must not take them down with it (§4.9 "the prior subtitle files
    // remain valid artifacts and MUST be published").
    let original_artifact = deps
        .artifacts
        .publish(&deps.workspace, task_id, "original.srt", ArtifactKind::OriginalSubs, "application/x-subrip")
        .await?;
    let translated_artifact = if let Some(rel) = &translated_rel {
        Some(
            deps.artifacts
                .publish(&deps.workspace, task_id, rel, ArtifactKind::TranslatedSubs, "application/x-subrip")
                .await?,
        )
    } else {
        None
    };

    let mut subtitled_video_path: Option<String> = None;

    if !skip_render {
        // S7 Burn-in + watermark.
        let t0 = Instant::now();
        reporter.step_start("render").await?;
        let render_result = run_render(deps, task_id, &source_path, &translated_rel, user_choices).await;
        stage_durations.push(("render", t0.elapsed()));

        match render_result {
            Ok(rendered_rel) => {
                reporter.step_complete("render").await?;

                // S8 Verify container.
                let t0 = Instant::now();
                reporter.step_start("verify").await?;
                let rendered_path = deps.workspace.full_path(task_id, &rendered_rel)?;
                let rendered_probe =
                    probe::probe(&config.media_tool_bin, &rendered_path, config.max_subprocess_output_bytes).await?;
                let verified_rel = "verified.mp4";
                let verified_path = deps.workspace.full_path(task_id, verified_rel)?;
                verify::verify_and_fix(
                    &config.media_tool_bin,
                    &rendered_path,
                    &verified_path,
                    rendered_probe.codec_v.as_deref(),
                    rendered_probe.codec_a.as_deref(),
                    config.max_subprocess_output_bytes,
                )
                .await?;
                reporter.step_complete("verify").await?;
                stage_durations.push(("verify", t0.elapsed()));

                let video_artifact = deps
                    .artifacts
                    .publish(&deps.workspace, task_id, verified_rel, ArtifactKind::SubtitledVideo, "video/mp4")
                    .await?;
                subtitled_video_path = Some(video_artifact.path);
            }
            Err(err) => {
                reporter.step_error("render", &err.to_string()).await?;
                // Prior subtitle artifacts are already published; surface the
                // render failure as the task's terminal error.
                return Err(err);
            }
        }
    }

    // S9 Publish + cleanup.
    reporter.step_start("publish").await?;
    let timing = {
        let mut timing = publish::timing_summary(&stage_durations);
        if let serde_json::Value::Object(ref mut map) = timing {
            map.insert("model_used".to_string(), json!(outcome.model_used));
            if let Some(service) = translation_service_used {
                map.insert("translation_service_used".to_string(), json!(service));
            }
            map.insert("detected_lang".to_string(), json!(outcome.detected_lang));
        }
        timing
    };
    publish::append_stats_event(&deps.stats_dir, task_id, "success", &json!(user_choices), &timing, Utc::now())
        .await
        .ok();
    reporter.step_complete("publish").await?;

    Ok(TaskResult {
        files: ResultFiles {
            original_subs: Some(original_artifact.path),
            translated_subs: translated_artifact.map(|a| a.path),
            subtitled_video: subtitled_video_path,
        },
        timing_summary: timing,
        chained_task_id: None,
    })
}

fn bad_request(message: &str) -> AppError {
    AppError::Pipeline(PipelineError::BadRequest { message: message.to_string() })
}

/// Source acquisition retry policy (§4.9: "3 retries with exponential
/// backoff; terminal `Failure{DownloadFailed}` on exhaustion").
async fn download_with_retry(
    bin: &str,
    url: &str,
    dest: &std::path::Path,
    range: Option<TimeRange>,
    max_output_bytes: usize,
) -> Result<(), AppError> {
    let max_retries = 3;
    let mut attempt = 0;
    loop {
        match acquire::download(bin, url, dest, range, max_output_bytes).await {
            Ok(()) => return Ok(()),
            Err(err) if attempt < max_retries => {
                let backoff_s = 1u64 << attempt;
                let jitter_ms = fastrand::u64(0..250);
                tracing::warn!(attempt, error = %err, "source acquisition failed, retrying");
                tokio::time::sleep(StdDuration::from_millis(backoff_s * 1000 + jitter_ms)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Drives S4 Transcribe and, when active, the overlapping S5 Translate
/// fan-out (§4.6.1): segments are forwarded to translation batches as soon
/// as each batch fills, while the transcriber keeps producing.
#[allow(clippy::too_many_arguments)]
async fn transcribe_and_translate(
    deps: &PipelineDeps,
    reporter: &mut ProgressReporter,
    audio_path: &std::path::Path,
    hinted_lang: Option<&str>,
    user_choices: &UserChoices,
    model: crate::models::TranscribeModel,
    skip_translate: bool,
) -> Result<(TranscribeOutcome, Vec<Segment>, Vec<Segment>, Option<crate::models::TranslationService>), AppError> {
    let config = &deps.config;
    let transcriber = build_transcriber(model, config, deps.model_cache.clone())?;
    let (tx, mut rx) = mpsc::channel::<Segment>(64);

    let audio_path_owned = audio_path.to_path_buf();
    let transcribe_handle = tokio::spawn(async move { transcriber.transcribe(&audio_path_owned, hinted_lang, tx).await });

    let mut original_segments = Vec::new();
    let mut batch_handles: Vec<tokio::task::JoinHandle<Result<Vec<Segment>, AppError>>> = Vec::new();
    let mut current_batch: Vec<Segment> = Vec::new();
    let semaphore = Arc::new(Semaphore::new(config.translation_parallelism.max(1)));

    let primary_translator: Option<Arc<dyn Translator>> = if skip_translate {
        None
    } else {
        Some(Arc::from(build_translator(user_choices.translation_service, config)?))
    };
    let fallback_translator: Option<Arc<dyn Translator>> = if skip_translate {
        None
    } else {
        build_translator(fallback_service(user_choices.translation_service), config).ok().map(Arc::from)
    };
    let service_used = Arc::new(tokio::sync::Mutex::new(user_choices.translation_service));

    let mut received = 0usize;
    while let Some(segment) = rx.recv().await {
        original_segments.push(segment.clone());
        received += 1;
        if received % 10 == 0 {
            reporter.step_progress("transcribe", None, None).await?;
        }

        if skip_translate {
            continue;
        }
        current_batch.push(segment);
        if current_batch.len() >= config.translation_batch_size {
            let batch = std::mem::take(&mut current_batch);
            batch_handles.push(spawn_batch_translate(
                batch,
                primary_translator.clone().unwrap(),
                fallback_translator.clone(),
                service_used.clone(),
                semaphore.clone(),
                user_choices.source_lang.clone(),
                user_choices.target_lang.clone(),
                config.translation_max_retries,
                config.translation_backoff_base_s,
                config.translation_backoff_cap_s,
            ));
        }
    }
    if !current_batch.is_empty() {
        batch_handles.push(spawn_batch_translate(
            current_batch,
            primary_translator.clone().unwrap(),
            fallback_translator.clone(),
            service_used.clone(),
            semaphore.clone(),
            user_choices.source_lang.clone(),
            user_choices.target_lang.clone(),
            config.translation_max_retries,
            config.translation_backoff_base_s,
            config.translation_backoff_cap_s,
        ));
    }

    let outcome = transcribe_handle
        .await
        .map_err(|e| AppError::Pipeline(PipelineError::TranscriptionError { detail: e.to_string() }))??;

    let mut translated_segments = Vec::new();
    for handle in batch_handles {
        let batch = handle
            .await
            .map_err(|e| AppError::Pipeline(PipelineError::TranslationError { detail: e.to_string() }))??;
        translated_segments.extend(batch);
    }

    let service_used_final = if skip_translate {
        None
    } else {
        Some(*service_used.lock().await)
    };

    Ok((outcome, original_segments, translated_segments, service_used_final))
}

#[allow(clippy::too_many_arguments)]
fn spawn_batch_translate(
    batch: Vec<Segment>,
    primary: Arc<dyn Translator>,
    fallback: Option<Arc<dyn Translator>>,
    service_used: Arc<tokio::sync::Mutex<crate::models::TranslationService>>,
    semaphore: Arc<Semaphore>,
    src: String,
    tgt: String,
    max_retries: u32,
    base_s: u64,
    cap_s: u64,
) -> tokio::task::JoinHandle<Result<Vec<Segment>, AppError>> {
    tokio::spawn(async move {
        let _permit = semaphore.acquire().await.expect("semaphore not closed");
        match translate_with_retry(primary.as_ref(), &batch, &src, &tgt, max_retries, base_s, cap_s).await {
            Ok(result) => Ok(result),
            Err(primary_err) => match &fallback {
                Some(fallback) => {
                    let result = translate_with_retry(fallback.as_ref(), &batch, &src, &tgt, 0, base_s, cap_s).await?;
                    *service_used.lock().await = fallback_service(*service_used.lock().await);
                    Ok(result)
                }
                None => Err(primary_err),
            },
        }
    })
}

async fn run_render(
    deps: &PipelineDeps,
    task_id: Uuid,
    source_path: &std::path::Path,
    translated_rel: &Option<String>,
    user_choices: &UserChoices,
) -> Result<String, AppError> {
    let subtitle_rel = translated_rel.clone().unwrap_or_else(|| "original.srt".to_string());
    let subtitle_path = deps.workspace.full_path(task_id, &subtitle_rel)?;
    let subtitle_arg = user_choices.burn_in.then_some(subtitle_path.as_path());

    let logo_path: Option<PathBuf> = if user_choices.watermark.enabled {
        let logo_ref = user_choices
            .watermark
            .logo_ref
            .as_deref()
            .ok_or_else(|| bad_request("watermark enabled but no logo_ref set"))?;
        Some(deps.logo_assets.full_path_for_ref(logo_ref)?)
    } else {
        None
    };
    let watermark_arg = logo_path.as_deref().map(|path| (path, &user_choices.watermark));

    let output_rel = "rendered.mp4";
    let output_path = deps.workspace.full_path(task_id, output_rel)?;
    render::burn_in_and_watermark(
        &deps.config.media_tool_bin,
        source_path,
        subtitle_arg,
        watermark_arg,
        &output_path,
        deps.config.max_subprocess_output_bytes,
    )
    .await?;
    Ok(output_rel.to_string())
}
