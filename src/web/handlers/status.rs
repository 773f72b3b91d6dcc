//! `GET /status/{task_id}` (§4.1, §6): exempt from rate limiting.

use axum::extract::{Path, State};
use axum::http::header::ACCEPT_LANGUAGE;
use axum::http::HeaderMap;
use uuid::Uuid;

use crate::errors::AppError;
use crate::i18n;
use crate::models::ArtifactKind;
use crate::web::responses::{ResultTokens, TaskEnvelope};
use crate::web::AppState;

/// Returns the current Task Record envelope. `error.user_message` is
/// rendered in the caller's locale when an `Accept-Language` header is
/// present (§7); `error.code`/`error.message` are never localized.
///
/// When the task has published a result, a fresh download token is issued
/// per artifact on every poll (§4.1, §4.5): the client is expected to
/// present one of these to `/download-with-token/{token}`, not to guess
/// the published path. Tokens are single-use and short-lived, so an
/// unused one from an earlier poll simply expires.
pub async fn status(State(state): State<AppState>, Path(task_id): Path<Uuid>, headers: HeaderMap) -> Result<TaskEnvelope, AppError> {
    let task = state
        .task_repo
        .get(task_id)
        .await?
        .ok_or_else(|| AppError::not_found("task", task_id.to_string()))?;

    let mut envelope = TaskEnvelope::from(&task);
    if let Some(error) = envelope.error.as_mut() {
        let accept_language = headers.get(ACCEPT_LANGUAGE).and_then(|v| v.to_str().ok());
        error.user_message = i18n::localize(error.code, accept_language);
    }
    if envelope.result.is_some() {
        envelope.download_tokens = Some(issue_result_tokens(&state, task_id).await?);
    }
    Ok(envelope)
}

async fn issue_result_tokens(state: &AppState, task_id: Uuid) -> Result<ResultTokens, AppError> {
    let artifacts = state.artifacts.list_for_task(task_id).await?;
    let mut tokens = ResultTokens::default();
    for artifact in artifacts {
        let bearer = state.tokens.issue(artifact.artifact_id).await?;
        match artifact.kind {
            ArtifactKind::OriginalSubs => tokens.original_subs = Some(bearer),
            ArtifactKind::TranslatedSubs => tokens.translated_subs = Some(bearer),
            ArtifactKind::SubtitledVideo => tokens.subtitled_video = Some(bearer),
            ArtifactKind::DownloadedSource => {}
        }
    }
    Ok(tokens)
}
