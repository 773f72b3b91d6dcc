//! Download delegation (§6, §9): `/download/{filename}` and
//! `/download-with-token/{token}`. Neither handler streams the artifact's
//! bytes itself: each resolves the artifact to an absolute path and hands
//! it to the front proxy via an internal-redirect header, then closes the
//! response with an empty body. A worker process streaming a multi-hundred-
//! megabyte file would tie up a Tokio task for the whole transfer; the
//! front proxy (nginx and friends all support this convention) does it for
//! free.

use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::Artifact;
use crate::web::AppState;

/// Internal-redirect header understood by the front proxy; the path it
/// names is never reachable directly by clients.
const INTERNAL_REDIRECT_HEADER: &str = "X-Accel-Redirect";

fn delegated_response(state: &AppState, artifact: &Artifact) -> Result<Response, AppError> {
    if !artifact.has_safe_path() {
        return Err(AppError::internal("artifact path failed safety check"));
    }
    let full_path = state.artifacts.full_path(artifact)?;

    let mut response = StatusCode::OK.into_response();
    let headers = response.headers_mut();
    headers.insert(
        INTERNAL_REDIRECT_HEADER,
        HeaderValue::from_str(&full_path.to_string_lossy()).map_err(|e| AppError::internal(e.to_string()))?,
    );
    headers.insert(
        axum::http::header::CONTENT_TYPE,
        HeaderValue::from_str(&artifact.content_type).unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(axum::http::header::CONTENT_LENGTH, HeaderValue::from(artifact.size_bytes.max(0) as u64));
    *response.body_mut() = axum::body::Body::empty();
    Ok(response)
}

pub async fn download_by_path(State(state): State<AppState>, Path(filename): Path<String>) -> Result<Response, AppError> {
    let artifact = state
        .artifacts
        .get_by_path(&filename)
        .await?
        .ok_or_else(|| AppError::not_found("artifact", filename.clone()))?;

    delegated_response(&state, &artifact)
}

pub async fn download_with_token(State(state): State<AppState>, Path(token): Path<String>) -> Result<Response, AppError> {
    let artifact_id: Uuid = state.tokens.redeem(&token).await?;
    let artifact = state
        .artifacts
        .get(artifact_id)
        .await?
        .ok_or_else(|| AppError::not_found("artifact", artifact_id.to_string()))?;

    delegated_response(&state, &artifact)
}
