//! S1 Acquire source (§4.6, weight 0.20): remote download or upload-move.

use std::path::Path;

use crate::errors::{AppError, PipelineError};
use crate::storage::{IntakeStore, WorkspaceStore};
use crate::utils::time_range::TimeRange;
use uuid::Uuid;

/// Downloads `url` into the task's workspace via the configured download
/// tool, optionally restricted to `range` (§4.6.6). Retries are the caller's
/// responsibility (§4.9: "3 retries with exponential backoff").
pub async fn download(
    bin: &str,
    url: &str,
    dest: &Path,
    range: Option<TimeRange>,
    max_output_bytes: usize,
) -> Result<(), AppError> {
    let dest_str = dest.to_string_lossy().into_owned();
    let mut args: Vec<String> = vec!["-o".to_string(), dest_str, url.to_string()];
    if let Some(range) = range {
        args.push("--download-sections".to_string());
        args.push(format!("*{}-{}", range.start_s, range.end_s));
    }
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

    let output = super::run_tool(bin, &arg_refs, max_output_bytes).await?;
    if !output.status_success || !dest.exists() {
        return Err(download_error(format!(
            "{bin} failed to acquire {url}: {}",
            output.stderr
        )));
    }
    Ok(())
}

/// Moves an uploaded file from the intake directory into the task's
/// workspace (§4.1 "stores the file in an intake directory"; §5 "workers
/// read-only from it, except to move files into their workspace").
pub async fn move_upload(
    intake: &IntakeStore,
    workspace: &WorkspaceStore,
    task_id: Uuid,
    intake_rel_path: &str,
    workspace_rel_path: &str,
) -> Result<(), AppError> {
    let bytes = tokio::fs::read(intake.full_path(intake_rel_path)?)
        .await
        .map_err(|e| download_error(format!("reading uploaded file: {e}")))?;
    workspace.write(task_id, workspace_rel_path, &bytes).await?;
    intake.remove(intake_rel_path).await?;
    Ok(())
}

fn download_error(detail: String) -> AppError {
    AppError::Pipeline(PipelineError::DownloadFailed { detail })
}
