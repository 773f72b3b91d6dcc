//! External-tool collaborators for S1-S3, S7-S9 (§4.3, §4.6.9). Each stage
//! shells out to a configured binary; stdout/stderr are captured with a size
//! cap since the tools are not trusted to bound their own output.

pub mod acquire;
pub mod extract_audio;
pub mod probe;
pub mod publish;
pub mod render;
pub mod verify;

use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::errors::{AppError, PipelineError};

pub struct ToolOutput {
    pub status_success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Runs `bin` with `args` to completion, capping captured stdout/stderr at
/// `max_output_bytes` each (§4.6.9 "captured with size caps").
pub async fn run_tool(
    bin: &str,
    args: &[&str],
    max_output_bytes: usize,
) -> Result<ToolOutput, AppError> {
    let mut child = Command::new(bin)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| infra_error(format!("failed to spawn {bin}: {e}")))?;

    let mut stdout_buf = Vec::new();
    let mut stderr_buf = Vec::new();
    if let Some(mut out) = child.stdout.take() {
        let _ = out
            .take(max_output_bytes as u64)
            .read_to_end(&mut stdout_buf)
            .await;
    }
    if let Some(mut err) = child.stderr.take() {
        let _ = err
            .take(max_output_bytes as u64)
            .read_to_end(&mut stderr_buf)
            .await;
    }

    let status = child
        .wait()
        .await
        .map_err(|e| infra_error(format!("{bin} wait failed: {e}")))?;

    Ok(ToolOutput {
        status_success: status.success(),
        stdout: String::from_utf8_lossy(&stdout_buf).into_owned(),
        stderr: String::from_utf8_lossy(&stderr_buf).into_owned(),
    })
}

fn infra_error(detail: String) -> AppError {
    AppError::Pipeline(PipelineError::Infrastructure { detail })
}
