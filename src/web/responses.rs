//! HTTP response envelopes (§3, §6) and the `AppError -> HTTP response`
//! mapping every handler funnels through.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::errors::{AppError, PipelineError};
use crate::models::{ErrorCode, InitialRequest, Progress, SourceMetadata, Task, TaskError, TaskResult, TaskState, UserChoices};

/// Per-artifact download tokens issued fresh on every status read (§4.1,
/// §4.5). Mirrors [`crate::models::task::ResultFiles`]'s shape but carries
/// a short-lived bearer string instead of a path; the client presents one
/// of these to `/download-with-token/{token}` rather than guessing a
/// `/download/{filename}` path.
#[derive(Debug, Serialize, Default)]
pub struct ResultTokens {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_subs: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated_subs: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitled_video: Option<String>,
}

/// Shape returned by both the submit endpoints (202) and `/status/{task_id}`
/// (200): the Task Record projected for external consumption.
#[derive(Debug, Serialize)]
pub struct TaskEnvelope {
    pub task_id: Uuid,
    pub state: TaskState,
    pub progress: Progress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_tokens: Option<ResultTokens>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    pub user_choices: UserChoices,
    pub initial_request: InitialRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_metadata: Option<SourceMetadata>,
}

impl From<&Task> for TaskEnvelope {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.task_id,
            state: task.state,
            progress: task.progress.clone(),
            result: task.result.clone(),
            download_tokens: None,
            error: task.error.clone(),
            user_choices: task.user_choices.clone(),
            initial_request: task.initial_request.clone(),
            source_metadata: task.source_metadata.clone(),
        }
    }
}

impl IntoResponse for TaskEnvelope {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// A 202-Accepted wrapper so submit handlers can return the right status
/// code while reusing [`TaskEnvelope`]'s field shape.
pub struct Accepted(pub TaskEnvelope);

impl IntoResponse for Accepted {
    fn into_response(self) -> Response {
        (StatusCode::ACCEPTED, Json(self.0)).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    pub user_message: String,
    pub recoverable: bool,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

fn pipeline_status(pe: &PipelineError) -> StatusCode {
    match pe {
        PipelineError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        PipelineError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        PipelineError::Infrastructure { .. } | PipelineError::QueueSaturated { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_REQUEST,
    }
}

/// `Retry-After` is only meaningful on the two error kinds that carry a
/// concrete backoff hint (§4.1 `429`, §5 `503` backpressure); everything
/// else omits the header entirely.
fn retry_after_seconds(err: &AppError) -> Option<u64> {
    match err {
        AppError::Pipeline(PipelineError::RateLimited { retry_after_s }) => Some(*retry_after_s),
        AppError::Pipeline(PipelineError::QueueSaturated { retry_after_s }) => Some(*retry_after_s),
        _ => None,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::Pipeline(pe) => (
                pipeline_status(pe),
                ErrorBody {
                    code: pe.code(),
                    message: self.to_string(),
                    user_message: crate::pipeline::engine::user_facing_message(pe.code()),
                    recoverable: pe.recoverable(),
                },
            ),
            AppError::Validation { message } => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: ErrorCode::BadRequest,
                    message: message.clone(),
                    user_message: "The request was invalid.".to_string(),
                    recoverable: false,
                },
            ),
            AppError::NotFound { .. } => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    code: ErrorCode::BadRequest,
                    message: self.to_string(),
                    user_message: "Not found.".to_string(),
                    recoverable: false,
                },
            ),
            AppError::PermissionDenied { .. } => (
                StatusCode::FORBIDDEN,
                ErrorBody {
                    code: ErrorCode::BadRequest,
                    message: self.to_string(),
                    user_message: "Not permitted.".to_string(),
                    recoverable: false,
                },
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    code: ErrorCode::Infrastructure,
                    message: self.to_string(),
                    user_message: "An internal error occurred.".to_string(),
                    recoverable: true,
                },
            ),
        };
        let retry_after = retry_after_seconds(&self);
        let mut response = (status, Json(ErrorEnvelope { error: body })).into_response();
        if let Some(seconds) = retry_after {
            if let Ok(value) = axum::http::HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(axum::http::header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_saturated_maps_to_503_with_retry_after() {
        let err = AppError::Pipeline(PipelineError::QueueSaturated { retry_after_s: 30 });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers().get(axum::http::header::RETRY_AFTER).unwrap(), "30");
    }

    #[test]
    fn rate_limited_maps_to_429_with_retry_after() {
        let err = AppError::Pipeline(PipelineError::RateLimited { retry_after_s: 6 });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(axum::http::header::RETRY_AFTER).unwrap(), "6");
    }

    #[test]
    fn bad_request_has_no_retry_after() {
        let err = AppError::Pipeline(PipelineError::BadRequest { message: "x".to_string() });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get(axum::http::header::RETRY_AFTER).is_none());
    }
}
