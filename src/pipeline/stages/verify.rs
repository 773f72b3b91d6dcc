//! S8 Verify container (§4.6, weight 0.03): ensures H.264 video / AAC audio
//! in a playable container; re-encodes only when the probe shows otherwise.

use std::path::Path;

use crate::errors::{AppError, PipelineError};

fn is_compliant(codec_v: Option<&str>, codec_a: Option<&str>) -> bool {
    codec_v.map(|c| c == "h264").unwrap_or(true) && codec_a.map(|c| c == "aac").unwrap_or(true)
}

/// Re-encodes `input` to `output` if its probed codecs aren't already
/// compliant; otherwise copies the file through unchanged so callers can
/// treat `output` uniformly.
pub async fn verify_and_fix(
    bin: &str,
    input: &Path,
    output: &Path,
    probed_codec_v: Option<&str>,
    probed_codec_a: Option<&str>,
    max_output_bytes: usize,
) -> Result<(), AppError> {
    if is_compliant(probed_codec_v, probed_codec_a) {
        tokio::fs::copy(input, output)
            .await
            .map_err(|e| format_error(e.to_string()))?;
        return Ok(());
    }

    let input_str = input.to_string_lossy().into_owned();
    let output_str = output.to_string_lossy().into_owned();
    let args = [
        "-y",
        "-i",
        input_str.as_str(),
        "-c:v",
        "libx264",
        "-c:a",
        "aac",
        output_str.as_str(),
    ];

    let result = super::run_tool(bin, &args, max_output_bytes).await?;
    if !result.status_success || !output.exists() {
        return Err(format_error(result.stderr));
    }
    Ok(())
}

fn format_error(detail: String) -> AppError {
    AppError::Pipeline(PipelineError::FormatError { detail })
}
