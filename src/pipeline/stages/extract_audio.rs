//! S3 Extract audio (§4.6, weight 0.10): mono 16 kHz PCM via the media tool.

use std::path::Path;

use crate::errors::{AppError, PipelineError};
use crate::utils::time_range::TimeRange;

pub async fn extract(
    bin: &str,
    input: &Path,
    output: &Path,
    range: Option<TimeRange>,
    max_output_bytes: usize,
) -> Result<(), AppError> {
    let input_str = input.to_string_lossy().into_owned();
    let output_str = output.to_string_lossy().into_owned();

    let mut args: Vec<String> = vec!["-y".to_string(), "-i".to_string(), input_str];
    if let Some(range) = range {
        args.push("-ss".to_string());
        args.push(range.start_s.to_string());
        args.push("-to".to_string());
        args.push(range.end_s.to_string());
    }
    args.extend(
        ["-vn", "-ac", "1", "-ar", "16000", "-f", "wav"]
            .iter()
            .map(|s| s.to_string()),
    );
    args.push(output_str);

    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    let result = super::run_tool(bin, &arg_refs, max_output_bytes).await?;
    if !result.status_success || !output.exists() {
        return Err(AppError::Pipeline(PipelineError::AudioExtractionError {
            detail: result.stderr,
        }));
    }
    Ok(())
}
